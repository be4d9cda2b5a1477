use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use async_trait::async_trait;
use mesh_certs::CertChain;
use mesh_node::NodeFactory;
use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{
    FetchCRDT, FetchQuery, FetchResult, MsgId, PublicKey, RequestEnvelope, ServiceEvent, Status,
    StoreResponse, SystemClock,
};
use parking_lot::Mutex;
use serde_json::json;

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::handshake::{AcceptAllRegions, HandshakeFactory, HandshakeResult, Inbound};
use crate::service::Service;
use crate::state::ServiceState;

struct StubOffloader;

#[async_trait]
impl mesh_types::SignatureOffloader for StubOffloader {
    async fn verify(&self, _message: &[u8], _signature: &[u8], _public_key: &PublicKey) -> bool {
        true
    }

    async fn sign(&self, _message: &[u8], _public_key: &PublicKey) -> Option<Vec<u8>> {
        Some(b"sig".to_vec())
    }

    fn hash(&self, message: &[u8]) -> [u8; 32] {
        *blake3::hash(message).as_bytes()
    }

    fn local_public_keys(&self) -> Vec<PublicKey> {
        vec![PublicKey::from([7u8; 32])]
    }
}

struct RecordingChannel {
    sent: Mutex<Vec<(MsgId, RequestEnvelope)>>,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self { sent: Mutex::new(Vec::new()) })
    }
}

impl RawChannel for RecordingChannel {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        self.sent.lock().push((msg_id.clone(), envelope));
    }
}

async fn wait_for_sent(transport: &RecordingChannel, n: usize) {
    for _ in 0..200 {
        if transport.sent.lock().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {n} sent envelope(s), saw {}", transport.sent.lock().len());
}

fn dead_inbound() -> Inbound {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    drop(tx);
    rx
}

/// Hands back one `HandshakeResult` and then reports exhaustion, like a
/// transport factory configured for a single expected connection.
struct OneShotFactory(Mutex<Option<HandshakeResult>>);

impl OneShotFactory {
    fn new(result: HandshakeResult) -> Self {
        Self(Mutex::new(Some(result)))
    }
}

#[async_trait]
impl HandshakeFactory for OneShotFactory {
    async fn accept(&self) -> Option<HandshakeResult> {
        self.0.lock().take()
    }
}

fn new_service() -> Arc<Service> {
    Service::new(Arc::new(StubOffloader), Arc::new(CertChain::new()), Arc::new(AcceptAllRegions))
}

#[tokio::test]
async fn start_before_init_is_rejected() {
    let service = new_service();
    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::NotInitialized));
}

#[tokio::test]
async fn start_without_any_storage_config_fails() {
    let service = new_service();
    service.init(ServiceConfig::default()).await.unwrap();
    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::StorageUnavailable));
}

#[tokio::test]
async fn init_start_stop_close_walks_the_full_lifecycle() {
    let service = new_service();
    assert_eq!(service.state(), ServiceState::Idle);

    let storage_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: PublicKey::from([9u8; 32]),
        clock_diff: 0,
        peer_data: Vec::new(),
    };
    let config = ServiceConfig {
        storage_connections: vec![Arc::new(OneShotFactory::new(storage_result))],
        ..Default::default()
    };

    service.init(config).await.unwrap();
    assert_eq!(service.state(), ServiceState::Initialized);

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);

    // already running: neither init nor a second start is allowed
    assert!(matches!(service.init(ServiceConfig::default()).await.unwrap_err(), ServiceError::Running));
    assert!(matches!(service.start().await.unwrap_err(), ServiceError::Running));

    service.stop().unwrap();
    assert_eq!(service.state(), ServiceState::Initialized);

    service.close().unwrap();
    assert_eq!(service.state(), ServiceState::Closed);
    service.close().unwrap(); // idempotent
    assert!(matches!(service.init(ServiceConfig::default()).await.unwrap_err(), ServiceError::Closed));
}

#[tokio::test]
async fn public_key_is_assigned_once_and_survives_reinit() {
    let service = new_service();
    service.init(ServiceConfig::default()).await.unwrap();
    let first = service.public_key();
    assert_eq!(first, Some(PublicKey::from([7u8; 32])));

    service.init(ServiceConfig::default()).await.unwrap();
    assert_eq!(service.public_key(), first);
}

#[tokio::test]
async fn start_rejects_both_a_local_database_and_storage_connections() {
    struct NeverConnects;
    #[async_trait]
    impl crate::handshake::LocalStorageDriver for NeverConnects {
        async fn connect(&self) -> Result<(Arc<dyn RawChannel>, Inbound), String> {
            Err("should not be reached".to_string())
        }
    }

    let service = new_service();
    let storage_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: PublicKey::from([9u8; 32]),
        clock_diff: 0,
        peer_data: Vec::new(),
    };
    let config = ServiceConfig {
        local_database: Some(Arc::new(NeverConnects)),
        storage_connections: vec![Arc::new(OneShotFactory::new(storage_result))],
        ..Default::default()
    };
    service.init(config).await.unwrap();

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateStorage));
}

#[tokio::test]
async fn peer_handshake_without_an_auth_cert_requirement_registers_and_fires_connect() {
    let service = new_service();

    let storage_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: PublicKey::from([9u8; 32]),
        clock_diff: 0,
        peer_data: Vec::new(),
    };

    let peer_public_key = PublicKey::from([1u8; 32]);
    let peer_data = json!({
        "peerDataFormat": 1,
        "serializeFormat": 1,
        "version": "1",
        "appVersion": "1",
        "region": "us",
        "jurisdiction": "us-ca",
        "sessionTimeout": 30,
    })
    .to_string()
    .into_bytes();
    let peer_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: peer_public_key,
        clock_diff: 0,
        peer_data,
    };

    let config = ServiceConfig {
        storage_connections: vec![Arc::new(OneShotFactory::new(storage_result))],
        peer_factories: vec![Arc::new(OneShotFactory::new(peer_result))],
        ..Default::default()
    };

    service.init(config).await.unwrap();
    let mut events = service.subscribe();
    service.start().await.unwrap();

    let mut saw_connect = false;
    for _ in 0..40 {
        match tokio::time::timeout(Duration::from_millis(25), events.recv()).await {
            Ok(Ok(ServiceEvent::PeerConnect { public_key })) => {
                assert_eq!(public_key, peer_public_key);
                saw_connect = true;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(saw_connect, "expected a PeerConnect event for the handshaking peer");
}

#[tokio::test]
async fn peer_handshake_rejected_by_the_region_policy_never_registers() {
    struct RejectEverything;
    impl crate::handshake::RegionPolicy for RejectEverything {
        fn allows(&self, _region: &str, _jurisdiction: &str) -> bool {
            false
        }
    }

    let service = Service::new(Arc::new(StubOffloader), Arc::new(CertChain::new()), Arc::new(RejectEverything));

    let storage_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: PublicKey::from([9u8; 32]),
        clock_diff: 0,
        peer_data: Vec::new(),
    };
    let peer_data = json!({
        "peerDataFormat": 1,
        "serializeFormat": 1,
        "version": "1",
        "appVersion": "1",
        "region": "eu",
        "jurisdiction": "eu-de",
        "sessionTimeout": 30,
    })
    .to_string()
    .into_bytes();
    let peer_result = HandshakeResult {
        channel: RecordingChannel::new(),
        inbound: dead_inbound(),
        handshake_public_key: PublicKey::from([2u8; 32]),
        clock_diff: 0,
        peer_data,
    };

    let config = ServiceConfig {
        storage_connections: vec![Arc::new(OneShotFactory::new(storage_result))],
        peer_factories: vec![Arc::new(OneShotFactory::new(peer_result))],
        ..Default::default()
    };
    service.init(config).await.unwrap();
    let mut events = service.subscribe();
    service.start().await.unwrap();

    let mut saw_connect = false;
    for _ in 0..10 {
        match tokio::time::timeout(Duration::from_millis(25), events.recv()).await {
            Ok(Ok(ServiceEvent::PeerConnect { .. })) => saw_connect = true,
            Ok(Ok(_)) => continue,
            _ => break,
        }
    }
    assert!(!saw_connect, "a rejected region/jurisdiction must never reach peerConnected");
}

#[tokio::test]
async fn add_auto_fetch_is_refcounted_so_a_double_add_needs_a_double_remove() {
    let service = new_service();
    let entry = mesh_peer::AutoFetch {
        query: FetchQuery::default(),
        crdt: FetchCRDT::default(),
        reverse: false,
        remote_public_key: None,
    };

    service.add_auto_fetch(entry.clone());
    service.add_auto_fetch(entry.clone());
    service.remove_auto_fetch(&entry);
    assert_eq!(service.get_auto_fetch(), vec![entry.clone()]);

    service.remove_auto_fetch(&entry);
    assert!(service.get_auto_fetch().is_empty());
}

#[tokio::test]
async fn validate_auth_cert_stores_then_finds_a_carrier_node_on_the_retry_fetch() {
    let transport = RecordingChannel::new();
    let storage = Arc::new(StorageClient::new(transport.clone()));
    let offloader = StubOffloader;
    let self_key = PublicKey::from([3u8; 32]);
    let factory = NodeFactory::new(SystemClock, Arc::new(CertChain::new()));
    let image = b"auth-cert-image".to_vec();

    let storage_for_task = storage.clone();
    let image_for_task = image.clone();
    let task = tokio::spawn(async move {
        crate::carrier::validate_auth_cert(&storage_for_task, &factory, &offloader, &self_key, &image_for_task).await
    });

    wait_for_sent(&transport, 1).await;
    let (msg_id, _) = transport.sent.lock()[0].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::FetchResponse(empty_fetch_response()));

    wait_for_sent(&transport, 2).await;
    let (msg_id, _) = transport.sent.lock()[1].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::StoreResponse(StoreResponse { status: Status::Result, ..Default::default() }));

    wait_for_sent(&transport, 3).await;
    let (msg_id, _) = transport.sent.lock()[2].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::FetchResponse(hit_fetch_response()));

    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn validate_auth_cert_fails_when_the_carrier_node_never_lands() {
    let transport = RecordingChannel::new();
    let storage = Arc::new(StorageClient::new(transport.clone()));
    let offloader = StubOffloader;
    let self_key = PublicKey::from([3u8; 32]);
    let factory = NodeFactory::new(SystemClock, Arc::new(CertChain::new()));
    let image = b"auth-cert-image".to_vec();

    let storage_for_task = storage.clone();
    let image_for_task = image.clone();
    let task = tokio::spawn(async move {
        crate::carrier::validate_auth_cert(&storage_for_task, &factory, &offloader, &self_key, &image_for_task).await
    });

    wait_for_sent(&transport, 1).await;
    let (msg_id, _) = transport.sent.lock()[0].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::FetchResponse(empty_fetch_response()));

    wait_for_sent(&transport, 2).await;
    let (msg_id, _) = transport.sent.lock()[1].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::StoreResponse(StoreResponse { status: Status::Result, ..Default::default() }));

    wait_for_sent(&transport, 3).await;
    let (msg_id, _) = transport.sent.lock()[2].clone();
    storage.on_envelope(&msg_id, RequestEnvelope::FetchResponse(empty_fetch_response()));

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, ServiceError::CertDestroyed));
}

fn fetch_response(result: FetchResult) -> RequestEnvelope {
    RequestEnvelope::FetchResponse(mesh_types::FetchResponse {
        status: Status::Result,
        result,
        crdt_result: Default::default(),
        seq: 0,
        end_seq: 0,
        row_count: 0,
        error: String::new(),
    })
}

fn empty_fetch_response() -> RequestEnvelope {
    fetch_response(FetchResult::default())
}

fn hit_fetch_response() -> RequestEnvelope {
    fetch_response(FetchResult { nodes: vec![b"carrier-node".to_vec()], embed: vec![] })
}
