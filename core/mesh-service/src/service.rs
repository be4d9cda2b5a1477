use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mesh_certs::{CertChain, DecodedCert};
use mesh_node::NodeFactory;
use mesh_peer::{AutoFetch, AutoFetcher, BlobSyncRegistry, Extender, Forwarder, P2PClient};
use mesh_template::Var;
use mesh_thread::{Thread, ThreadTemplate};
use mesh_types::{PublicKey, ServiceEvent, SignatureOffloader, SystemClock};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::carrier::{check_region_jurisdiction, validate_auth_cert};
use crate::config::{PeerConnectionConfig, ServiceConfig};
use crate::error::ServiceError;
use crate::handshake::{BoxedChannel, HandshakeResult, Inbound, LocalStorageDriver, PeerInfo, RegionPolicy};
use crate::offloader::OffloaderHandle;
use crate::state::ServiceState;

fn decode_cert_image(text: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .ok()
        .or_else(|| hex::decode(text).ok())
}

type LocalClient = P2PClient<BoxedChannel>;
type RemoteExtender = Extender<BoxedChannel, OffloaderHandle>;
type RemoteAutoFetcher = AutoFetcher<BoxedChannel, BoxedChannel>;

/// The proxies a connected peer owns, kept alongside the `P2PClient` so
/// hot-update calls (`addSignCert`/`addAutoFetch`) can reach into live
/// connections instead of only affecting future ones.
struct PeerEntry {
    client: Arc<LocalClient>,
    extender: Option<Arc<RemoteExtender>>,
    autofetcher: Option<Arc<RemoteAutoFetcher>>,
}

/// The coordinator: owns the single local-storage `P2PClient`, the peer
/// connections layered over `Forwarder`/`Extender`/`AutoFetcher`, and the
/// `Idle → Initialized → Running` lifecycle that gates all of it (§4.10).
pub struct Service {
    offloader: Arc<dyn SignatureOffloader>,
    cert_chain: Arc<CertChain>,
    region_policy: Arc<dyn RegionPolicy>,
    state: RwLock<ServiceState>,
    public_key: RwLock<Option<PublicKey>>,
    config: RwLock<ServiceConfig>,
    sign_certs: RwLock<Vec<DecodedCert>>,
    local: RwLock<Option<Arc<LocalClient>>>,
    peers: DashMap<PublicKey, PeerEntry>,
    auto_fetches: RwLock<Vec<(AutoFetch, u32)>>,
    templates: RwLock<HashMap<String, ThreadTemplate>>,
    blob_registry: Arc<BlobSyncRegistry>,
    events: tokio::sync::broadcast::Sender<ServiceEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Service {
    pub fn new(
        offloader: Arc<dyn SignatureOffloader>,
        cert_chain: Arc<CertChain>,
        region_policy: Arc<dyn RegionPolicy>,
    ) -> Arc<Self> {
        let (events, _) = tokio::sync::broadcast::channel(256);
        Arc::new(Self {
            offloader,
            cert_chain,
            region_policy,
            state: RwLock::new(ServiceState::Idle),
            public_key: RwLock::new(None),
            config: RwLock::new(ServiceConfig::default()),
            sign_certs: RwLock::new(Vec::new()),
            local: RwLock::new(None),
            peers: DashMap::new(),
            auto_fetches: RwLock::new(Vec::new()),
            templates: RwLock::new(HashMap::new()),
            blob_registry: BlobSyncRegistry::new(),
            events,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    fn fire(&self, event: ServiceEvent) {
        let _ = self.events.send(event);
    }

    pub fn state(&self) -> ServiceState {
        *self.state.read()
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        *self.public_key.read()
    }

    /// Decodes/verifies sign certs and the self auth cert, imports thread
    /// templates, and sets `publicKey` the first time `init()` runs (a later
    /// `init()` while still `Idle`/`Initialized` leaves it alone).
    pub async fn init(&self, config: ServiceConfig) -> Result<(), ServiceError> {
        self.state.read().check_init()?;

        if self.public_key.read().is_none() {
            let key = self.offloader.local_public_keys().into_iter().next();
            *self.public_key.write() = key;
        }

        let mut sign_certs = Vec::with_capacity(config.sign_cert_images.len());
        for image in &config.sign_cert_images {
            let cert = self.cert_chain.decode(image)?;
            self.cert_chain.verify(&cert, &*self.offloader).await?;
            sign_certs.push(cert);
        }

        if let Some(image) = &config.auth_cert_image {
            let cert = self.cert_chain.decode(image)?;
            self.cert_chain.verify(&cert, &*self.offloader).await?;
        }

        let templates = config
            .thread_templates
            .iter()
            .cloned()
            .collect::<HashMap<_, _>>();

        *self.auto_fetches.write() = config.auto_fetch.iter().cloned().map(|e| (e, 1)).collect();
        *self.templates.write() = templates;
        *self.sign_certs.write() = sign_certs;
        *self.config.write() = config;
        *self.state.write() = ServiceState::Initialized;
        Ok(())
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.state.read().check_start()?;
        self.init_storage().await?;
        self.init_peer_factories();
        *self.state.write() = ServiceState::Running;
        self.fire(ServiceEvent::Start);
        Ok(())
    }

    pub fn stop(self: &Arc<Self>) -> Result<(), ServiceError> {
        self.state.read().check_stop()?;
        self.teardown();
        *self.state.write() = ServiceState::Initialized;
        self.fire(ServiceEvent::Stop);
        Ok(())
    }

    /// Terminal and idempotent: a second `close()` is a no-op, matching
    /// `P2PClient::close`'s own idempotence.
    pub fn close(self: &Arc<Self>) -> Result<(), ServiceError> {
        if *self.state.read() == ServiceState::Closed {
            return Ok(());
        }
        self.teardown();
        *self.state.write() = ServiceState::Closed;
        Ok(())
    }

    async fn init_storage(self: &Arc<Self>) -> Result<(), ServiceError> {
        let (local_database, storage_connections) = {
            let config = self.config.read();
            (config.local_database.clone(), config.storage_connections.clone())
        };
        if local_database.is_some() && !storage_connections.is_empty() {
            return Err(ServiceError::DuplicateStorage);
        }

        if let Some(driver) = local_database {
            self.spawn_reconnect_loop(driver);
            return Ok(());
        }

        for factory in storage_connections {
            if let Some(result) = factory.accept().await {
                self.adopt_local_storage(result);
                return Ok(());
            }
        }
        Err(ServiceError::StorageUnavailable)
    }

    fn spawn_reconnect_loop(self: &Arc<Self>, driver: Arc<dyn LocalStorageDriver>) {
        let service = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                if service.state() == ServiceState::Closed {
                    break;
                }
                match driver.connect().await {
                    Ok((channel, inbound)) => {
                        let client = P2PClient::new(
                            Arc::new(BoxedChannel(channel)),
                            Default::default(),
                            0,
                        );
                        service.spawn_dispatch_loop(client.clone(), inbound);
                        *service.local.write() = Some(client.clone());
                        service.fire(ServiceEvent::StorageConnect);

                        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();
                        let closed_tx = Mutex::new(Some(closed_tx));
                        client.on_close(move || {
                            if let Some(tx) = closed_tx.lock().take() {
                                let _ = tx.send(());
                            }
                        });
                        let _ = closed_rx.await;

                        *service.local.write() = None;
                        service.fire(ServiceEvent::StorageDisconnect);
                    }
                    Err(reason) => {
                        warn!(%reason, "local storage driver connect failed, retrying");
                        service.fire(ServiceEvent::StorageAuthCertError { reason });
                    }
                }
                if service.state() == ServiceState::Closed {
                    break;
                }
                let delay = service.config.read().timers.reconnect_delay;
                tokio::time::sleep(delay).await;
            }
        });
        self.tasks.lock().push(handle);
    }

    fn adopt_local_storage(self: &Arc<Self>, result: HandshakeResult) {
        let client = P2PClient::new(Arc::new(BoxedChannel(result.channel)), Default::default(), result.clock_diff);
        self.spawn_dispatch_loop(client.clone(), result.inbound);
        *self.local.write() = Some(client);
        self.fire(ServiceEvent::StorageConnect);
    }

    fn spawn_dispatch_loop(self: &Arc<Self>, client: Arc<LocalClient>, mut inbound: Inbound) {
        let handle = tokio::spawn(async move {
            while let Some((msg_id, envelope)) = inbound.recv().await {
                client.dispatch(&msg_id, envelope);
            }
        });
        self.tasks.lock().push(handle);
    }

    fn init_peer_factories(self: &Arc<Self>) {
        let factories = self.config.read().peer_factories.clone();
        for factory in factories {
            let service = self.clone();
            let handle = tokio::spawn(async move {
                loop {
                    if service.state() == ServiceState::Closed {
                        break;
                    }
                    match factory.accept().await {
                        Some(result) => {
                            let service = service.clone();
                            tokio::spawn(async move { service.handle_peer_handshake(result).await });
                        }
                        None => break,
                    }
                }
            });
            self.tasks.lock().push(handle);
        }
    }

    /// The per-peer handshake callback (§4.10 step 5): decode `peerData`,
    /// run the region/jurisdiction policy hook, verify and cache any
    /// declared AuthCert, then hand the connection to `peer_connected`.
    /// Any failure here simply drops `result` without registering the peer.
    async fn handle_peer_handshake(self: &Arc<Self>, result: HandshakeResult) {
        let Some(local) = self.local.read().clone() else {
            return;
        };

        let peer_info: PeerInfo = match serde_json::from_slice(&result.peer_data) {
            Ok(info) => info,
            Err(err) => {
                self.fire(ServiceEvent::PeerParseError { reason: err.to_string() });
                return;
            }
        };

        if !self.region_policy.allows(&peer_info.region, &peer_info.jurisdiction) {
            return;
        }

        let peer_config = self
            .config
            .read()
            .peer_connection_configs
            .first()
            .cloned()
            .unwrap_or_default();

        if let Some(auth_cert) = &peer_info.auth_cert {
            if let Err(err) = self.verify_peer_auth_cert(&local, auth_cert, &peer_config).await {
                self.fire(ServiceEvent::PeerAuthCertError {
                    public_key: result.handshake_public_key,
                    reason: err.to_string(),
                });
                return;
            }
        } else if peer_config.require_auth_cert {
            return;
        }

        let client = P2PClient::new(
            Arc::new(BoxedChannel(result.channel)),
            peer_config.permissions.clone(),
            result.clock_diff,
        );
        self.spawn_dispatch_loop(client.clone(), result.inbound);
        self.peer_connected(client, result.handshake_public_key, &peer_config, &local);
    }

    async fn verify_peer_auth_cert(
        &self,
        local: &Arc<LocalClient>,
        auth_cert: &str,
        peer_config: &PeerConnectionConfig,
    ) -> Result<(), ServiceError> {
        let image = decode_cert_image(auth_cert).ok_or(ServiceError::BadAuthCertEncoding)?;
        let cert = self.cert_chain.decode(&image)?;
        self.cert_chain.verify(&cert, &*self.offloader).await?;
        check_region_jurisdiction(&self.cert_chain, &cert, &peer_config.expected_region, &peer_config.expected_jurisdiction)?;

        let self_public_key = self.public_key.read().unwrap_or_default();
        let factory = NodeFactory::new(SystemClock, self.cert_chain.clone());
        validate_auth_cert(local.storage(), &factory, &*self.offloader, &self_public_key, &image).await
    }

    /// Wires up `Forwarder`/`Extender` (per `allowEmbed`) and any registered
    /// `AutoFetch` subscriptions, then registers the peer so later
    /// `addSignCert`/`addAutoFetch` calls reach it (§4.9).
    fn peer_connected(
        self: &Arc<Self>,
        client: Arc<LocalClient>,
        public_key: PublicKey,
        config: &PeerConnectionConfig,
        local: &Arc<LocalClient>,
    ) {
        let extender = if config.permissions.allow_embed {
            let offloader = Arc::new(OffloaderHandle(self.offloader.clone()));
            let signing_key = self.public_key.read().unwrap_or_default();
            let extender = Extender::new(local.storage().clone(), config.permissions.clone(), offloader, signing_key);
            for cert in self.sign_certs.read().iter() {
                extender.add_sign_cert(cert.clone());
            }
            client.set_request_handler(extender.clone());
            Some(extender)
        } else {
            client.set_request_handler(Forwarder::new(local.storage().clone(), config.permissions.clone()));
            None
        };

        let fetches = self.auto_fetches.read().iter().map(|(e, _)| e.clone()).collect::<Vec<_>>();
        let autofetcher = if fetches.is_empty() {
            None
        } else {
            let autofetcher = AutoFetcher::new(
                client.clone(),
                local.clone(),
                public_key,
                config.blob_size_max_limit,
                self.blob_registry.clone(),
            );
            autofetcher.add_fetch(&fetches);
            let af = autofetcher.clone();
            client.register_child(Arc::new(move || af.stop_all()));
            Some(autofetcher)
        };

        self.peers.insert(public_key, PeerEntry { client: client.clone(), extender, autofetcher });

        let service = self.clone();
        client.on_close(move || {
            service.peers.remove(&public_key);
            service.fire(ServiceEvent::PeerDisconnect { public_key });
        });

        self.fire(ServiceEvent::PeerConnect { public_key });
    }

    fn teardown(&self) {
        for entry in self.peers.iter() {
            entry.value().client.close();
        }
        self.peers.clear();
        let local = self.local.write().take();
        if let Some(local) = local {
            local.close();
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    /// Hot-updates: frozen while `Running` would mean a cert swap mid-flight
    /// could race a handshake that read the old set, so these are allowed in
    /// any state *except* the ones `check_frozen_config` rejects.
    pub fn add_sign_cert(&self, cert: DecodedCert) -> Result<(), ServiceError> {
        self.sign_certs.write().push(cert.clone());
        for entry in self.peers.iter() {
            if let Some(extender) = &entry.value().extender {
                extender.add_sign_cert(cert.clone());
            }
        }
        Ok(())
    }

    pub fn add_auto_fetch(&self, entry: AutoFetch) {
        let mut list = self.auto_fetches.write();
        if let Some(existing) = list.iter_mut().find(|(e, _)| *e == entry) {
            existing.1 += 1;
        } else {
            list.push((entry.clone(), 1));
        }
        drop(list);
        for peer in self.peers.iter() {
            if let Some(autofetcher) = &peer.value().autofetcher {
                autofetcher.add_fetch(std::slice::from_ref(&entry));
            }
        }
    }

    pub fn remove_auto_fetch(&self, entry: &AutoFetch) {
        let mut list = self.auto_fetches.write();
        if let Some(pos) = list.iter().position(|(e, _)| e == entry) {
            list[pos].1 -= 1;
            if list[pos].1 == 0 {
                list.remove(pos);
            }
        }
    }

    pub fn get_auto_fetch(&self) -> Vec<AutoFetch> {
        self.auto_fetches.read().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn add_peer_connection_config(&self, config: PeerConnectionConfig) -> Result<(), ServiceError> {
        self.state.read().check_frozen_config()?;
        self.config.write().peer_connection_configs.push(config);
        Ok(())
    }

    /// Opens a `Thread` against a registered template, sharing local
    /// storage's `StorageClient` the same way peer proxies do.
    pub fn open_thread(&self, template_name: &str, vars: HashMap<String, Var>) -> Result<Thread<BoxedChannel>, ServiceError> {
        let template = self
            .templates
            .read()
            .get(template_name)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownTemplate(template_name.to_string()))?;
        let local = self.local.read().clone().ok_or(ServiceError::StorageUnavailable)?;
        let factory = Arc::new(NodeFactory::new(SystemClock, self.cert_chain.clone()));
        for cert in self.sign_certs.read().iter() {
            factory.add_sign_cert(cert.clone());
        }
        Ok(Thread::new(local.storage().clone(), factory, template, vars))
    }
}
