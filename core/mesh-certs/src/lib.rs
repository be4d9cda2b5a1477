//! Recursive decode/verify/validate over stacked auth, chain, friend, and
//! node-sign certs. The core knows nothing about a cert's byte encoding; it
//! only classifies images by their 2-byte primary interface tag and hands
//! recognized images to embedder-registered `CertLoader`s.

pub mod chain;
pub mod error;

pub use chain::{CertChain, CertFamily, CertLoader, DecodedCert, LockConstraint};
pub use error::CertError;
