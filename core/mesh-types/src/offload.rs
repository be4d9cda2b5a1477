use async_trait::async_trait;

use crate::ids::PublicKey;

/// Cryptographic primitives the core never implements itself (§1 OUT OF
/// SCOPE): signing, verification, and content hashing run behind this
/// worker-pool-backed contract so the main loop never blocks on them.
#[async_trait]
pub trait SignatureOffloader: Send + Sync {
    /// Verifies `signature` over `message` under `public_key`.
    async fn verify(&self, message: &[u8], signature: &[u8], public_key: &PublicKey) -> bool;

    /// Signs `message` with the secret half of `public_key`, if this
    /// offloader holds it. Returns `None` if the key is not local.
    async fn sign(&self, message: &[u8], public_key: &PublicKey) -> Option<Vec<u8>>;

    /// Hashes `message` (blake2b/blake3 depending on deployment); used for
    /// node content addresses and `refId` derivation.
    fn hash(&self, message: &[u8]) -> [u8; 32];

    /// The keys this offloader holds secrets for, in registration order. The
    /// first entry becomes a Service's `publicKey` at `init()`.
    fn local_public_keys(&self) -> Vec<PublicKey>;
}
