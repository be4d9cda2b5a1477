use std::sync::Arc;
use std::time::Duration;

use mesh_peer::{AutoFetch, ConnectionPermissions};
use mesh_types::PublicKey;
use serde::{Deserialize, Serialize};

use crate::handshake::{HandshakeFactory, LocalStorageDriver};

/// Per-peer-connection config: the permission set a Forwarder/Extender is
/// built with, the region/jurisdiction this link expects an AuthCert to
/// carry, and the AutoFetch subscriptions registered once the handshake
/// completes (§4.9/§4.10).
#[derive(Clone, Default)]
pub struct PeerConnectionConfig {
    pub permissions: ConnectionPermissions,
    pub require_auth_cert: bool,
    pub expected_region: String,
    pub expected_jurisdiction: String,
    pub blob_size_max_limit: i64,
}

/// Timer knobs, mirroring the teacher's `PoolConfig::default()` pattern:
/// sensible local defaults, durations carried via `humantime_serde`. Unlike
/// the rest of `ServiceConfig` these are plain data and round-trip through
/// `serde` on their own, even though the Service's embedder-supplied
/// factories and driver handles do not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceTimers {
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub purge_interval: Duration,
}

impl Default for ServiceTimers {
    fn default() -> Self {
        Self { reconnect_delay: Duration::from_secs(3), purge_interval: Duration::from_secs(60) }
    }
}

/// Everything `init()`/`start()` consume. CLI wrapping and config-file
/// loading are out of scope; this is constructed directly by the embedder.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    pub timers: ServiceTimers,
    /// Set when local storage is backed by a direct database driver rather
    /// than a remote storage connection; mutually exclusive with
    /// `storage_connections`.
    pub local_database: Option<Arc<dyn LocalStorageDriver>>,
    /// Each produces a one-shot (`maxConnections=1`) HandshakeFactory; the
    /// first successful handshake becomes local storage.
    pub storage_connections: Vec<Arc<dyn HandshakeFactory>>,
    /// Ongoing peer-connection factories, instantiated by `initPeerFactories()`.
    pub peer_factories: Vec<Arc<dyn HandshakeFactory>>,
    pub peer_connection_configs: Vec<PeerConnectionConfig>,
    pub auth_cert_image: Option<Vec<u8>>,
    pub sign_cert_images: Vec<Vec<u8>>,
    pub thread_templates: Vec<(String, mesh_thread::ThreadTemplate)>,
    /// Seeded into the hot-updatable AutoFetch registry at `init()`; further
    /// changes go through `Service::add_auto_fetch`/`remove_auto_fetch`.
    pub auto_fetch: Vec<AutoFetch>,
}

/// What a handshake callback knows about the far side once the remote's
/// AuthCert (if any) has been checked against this setting (§6.3).
#[derive(Clone, Debug, Default)]
pub struct ConnectedPeer {
    pub public_key: PublicKey,
    pub clock_diff: i64,
}
