use thiserror::Error;

use crate::CertFamily;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("no loader in the {0:?} registry recognized this image")]
    UnrecognizedImage(CertFamily),

    #[error("certificate signature did not verify")]
    BadSignature,

    #[error("no matching sign cert for signer")]
    NoMatchingSignCert,

    #[error("no cert family registered for primary interface {0:#06x}")]
    UnknownInterface(u16),

    #[error("image too short to hold a primary interface tag")]
    Truncated,
}
