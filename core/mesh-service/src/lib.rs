//! The `Service` coordinator: storage/peer lifecycle, handshake callbacks,
//! and the hot-updatable config surface layered over `mesh-peer` (§4.10).

pub mod carrier;
pub mod config;
pub mod error;
pub mod handshake;
pub mod offloader;
pub mod service;
pub mod state;

pub use config::{ConnectedPeer, PeerConnectionConfig, ServiceConfig, ServiceTimers};
pub use error::ServiceError;
pub use handshake::{
    AcceptAllRegions, BoxedChannel, HandshakeFactory, HandshakeResult, Inbound, LocalStorageDriver,
    PeerInfo, RegionPolicy,
};
pub use offloader::OffloaderHandle;
pub use service::Service;
pub use state::ServiceState;

#[cfg(test)]
mod tests;
