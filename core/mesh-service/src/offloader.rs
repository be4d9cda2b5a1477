use std::sync::Arc;

use async_trait::async_trait;
use mesh_types::{PublicKey, SignatureOffloader};

/// A `Sized` stand-in for `Arc<dyn SignatureOffloader>` so it can be used as
/// the concrete `O: SignatureOffloader` type parameter `Extender` needs
/// (trait objects aren't `Sized`, and generic params default to requiring
/// it).
#[derive(Clone)]
pub struct OffloaderHandle(pub Arc<dyn SignatureOffloader>);

#[async_trait]
impl SignatureOffloader for OffloaderHandle {
    async fn verify(&self, message: &[u8], signature: &[u8], public_key: &PublicKey) -> bool {
        self.0.verify(message, signature, public_key).await
    }

    async fn sign(&self, message: &[u8], public_key: &PublicKey) -> Option<Vec<u8>> {
        self.0.sign(message, public_key).await
    }

    fn hash(&self, message: &[u8]) -> [u8; 32] {
        self.0.hash(message)
    }

    fn local_public_keys(&self) -> Vec<PublicKey> {
        self.0.local_public_keys()
    }
}
