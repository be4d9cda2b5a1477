//! The PeerProxy suite: `P2PClient` connections, and the `Forwarder`/
//! `Extender`/`AutoFetcher` proxies layered over them (§4.9).

pub mod autofetcher;
pub mod client;
pub mod error;
pub mod extender;
pub mod forwarder;
pub mod permissions;
pub mod relay;

pub use autofetcher::{AutoFetch, AutoFetcher, BlobSyncRegistry};
pub use client::{P2PClient, RequestHandler};
pub use error::PeerError;
pub use extender::Extender;
pub use forwarder::Forwarder;
pub use permissions::{ConnectionPermissions, FetchPermissions, StorePermissions};

#[cfg(test)]
mod tests;
