use async_trait::async_trait;
use mesh_types::{PublicKey, SignatureOffloader};
use rand::RngCore;

/// A deterministic (non-cryptographic) keypair for tests. `sign`/`verify`
/// under a `DeterministicOffloader` are a blake3 MAC over the seed, not a
/// real signature scheme — good enough to exercise the signing/verification
/// call sites without pulling a real crypto crate into test code.
#[derive(Clone, Copy, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    seed: [u8; 32],
}

impl KeyPair {
    /// Builds a keypair from a small integer, so tests can write
    /// `KeyPair::from_seed(1)` / `KeyPair::from_seed(2)` for two distinct,
    /// reproducible peers.
    pub fn from_seed(seed: u8) -> Self {
        let seed = [seed; 32];
        let public_key = PublicKey(*blake3::hash(&seed).as_bytes());
        Self { public_key, seed }
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let public_key = PublicKey(*blake3::hash(&seed).as_bytes());
        Self { public_key, seed }
    }

    fn mac(&self, message: &[u8]) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(message.len() + self.seed.len());
        preimage.extend_from_slice(message);
        preimage.extend_from_slice(&self.seed);
        *blake3::hash(&preimage).as_bytes()
    }
}

/// A `SignatureOffloader` backed by a fixed set of `KeyPair`s, standing in
/// for the worker-pool-backed implementation an embedder supplies (§1 OUT
/// OF SCOPE). Holds every key it was built with as "local", so `sign`
/// always succeeds for those keys.
pub struct DeterministicOffloader {
    keys: Vec<KeyPair>,
}

impl DeterministicOffloader {
    pub fn new(keys: Vec<KeyPair>) -> Self {
        Self { keys }
    }

    pub fn single(key: KeyPair) -> Self {
        Self::new(vec![key])
    }

    fn find(&self, public_key: &PublicKey) -> Option<&KeyPair> {
        self.keys.iter().find(|k| &k.public_key == public_key)
    }
}

#[async_trait]
impl SignatureOffloader for DeterministicOffloader {
    async fn verify(&self, message: &[u8], signature: &[u8], public_key: &PublicKey) -> bool {
        match self.find(public_key) {
            Some(key) => key.mac(message).as_slice() == signature,
            None => false,
        }
    }

    async fn sign(&self, message: &[u8], public_key: &PublicKey) -> Option<Vec<u8>> {
        self.find(public_key).map(|key| key.mac(message).to_vec())
    }

    fn hash(&self, message: &[u8]) -> [u8; 32] {
        *blake3::hash(message).as_bytes()
    }

    fn local_public_keys(&self) -> Vec<PublicKey> {
        self.keys.iter().map(|k| k.public_key).collect()
    }
}
