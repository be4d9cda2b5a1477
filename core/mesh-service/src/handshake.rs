use std::sync::Arc;

use async_trait::async_trait;
use mesh_storage::client::RawChannel;
use mesh_types::{MsgId, RequestEnvelope};
use serde::Deserialize;

/// Wraps a type-erased channel so it can stand in for the `R: RawChannel`
/// generic parameter everywhere the Service needs one concrete type for
/// storage created dynamically from a `HandshakeFactory` (§1 OUT OF SCOPE:
/// "Raw socket factories... supply a HandshakeFactory yielding authenticated
/// bidirectional message channels").
#[derive(Clone)]
pub struct BoxedChannel(pub Arc<dyn RawChannel>);

impl RawChannel for BoxedChannel {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        self.0.send(msg_id, envelope);
    }
}

/// An authenticated bidirectional message channel, split into its outbound
/// half (`channel`) and the inbound frames the transport layer delivers off
/// of it. `P2PClient::dispatch` is fed from `inbound` by a task this crate
/// owns; producing `inbound` is the embedder's transport's job.
pub type Inbound = tokio::sync::mpsc::UnboundedReceiver<(MsgId, RequestEnvelope)>;

/// One accepted, authenticated connection: the low-level handshake/transport
/// machinery is entirely out of scope, so this is the seam an embedder's
/// socket/Noise layer plugs into.
pub struct HandshakeResult {
    pub channel: Arc<dyn RawChannel>,
    pub inbound: Inbound,
    pub handshake_public_key: mesh_types::PublicKey,
    pub clock_diff: i64,
    pub peer_data: Vec<u8>,
}

#[async_trait]
pub trait HandshakeFactory: Send + Sync {
    /// Blocks until the next authenticated connection completes its
    /// handshake, or returns `None` when the factory is exhausted/closed.
    async fn accept(&self) -> Option<HandshakeResult>;
}

/// The direct local-storage driver seam (§4.10 `connectDatabase`): opens
/// whatever embedder-specific database driver backs local storage and
/// yields a channel representing the open connection. Schema creation,
/// query execution, and the reconnect sleep/retry loop around this call are
/// this crate's responsibility; the driver internals are not.
#[async_trait]
pub trait LocalStorageDriver: Send + Sync {
    async fn connect(&self) -> Result<(Arc<dyn RawChannel>, Inbound), String>;
}

/// Peer-supplied handshake metadata, JSON-decoded from the bytes the remote
/// sent on the handshake channel (§6.3).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_data_format: u8,
    pub serialize_format: u8,
    pub version: String,
    pub app_version: String,
    pub region: String,
    pub jurisdiction: String,
    #[serde(default)]
    pub auth_cert: Option<String>,
    pub session_timeout: u32,
}

/// Region/jurisdiction acceptance hook (§4.10 step 3: "reserved for policy
/// hook; must not throw"). The Open Question this resolves: default to
/// accepting every region/jurisdiction pair, since the core has no policy
/// datamodel of its own to judge them against.
pub trait RegionPolicy: Send + Sync {
    fn allows(&self, region: &str, jurisdiction: &str) -> bool;
}

#[derive(Default)]
pub struct AcceptAllRegions;

impl RegionPolicy for AcceptAllRegions {
    fn allows(&self, _region: &str, _jurisdiction: &str) -> bool {
        true
    }
}
