use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("no attached sign cert authorizes {signer:?} to sign on behalf of {owner:?}")]
    NoMatchingSignCert { owner: mesh_types::PublicKey, signer: mesh_types::PublicKey },

    #[error("signature offloader declined to sign for this key")]
    SigningFailed,

    #[error("node is not destructible")]
    NotDestructible,
}
