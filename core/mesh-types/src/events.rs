use crate::ids::{NodeId1, PublicKey};

/// Replaces the string-keyed observer registries of the source with a single
/// fixed enum fanned out on a broadcast channel (see design notes: Observer
/// registries).
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceEvent {
    Start,
    Stop,
    StorageConnect,
    StorageDisconnect,
    PeerConnect { public_key: PublicKey },
    PeerDisconnect { public_key: PublicKey },
    PeerAuthCertError { public_key: PublicKey, reason: String },
    StorageAuthCertError { reason: String },
    PeerParseError { reason: String },
    Blob { node_id1: NodeId1, len: u64 },
}
