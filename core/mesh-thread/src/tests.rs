use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use async_trait::async_trait;
use mesh_certs::CertChain;
use mesh_node::NodeFactory;
use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{
    MsgId, NodeFlags, NodeId1, NodeProps, PublicKey, RequestEnvelope, SignatureOffloader, Status,
    StoreResponse, TimeFreeze,
};
use parking_lot::Mutex;
use serde_json::json;

use crate::error::ThreadError;
use crate::template::{DataParamsOverride, FetchCrdtOverride, FetchQueryOverride, ThreadTemplate};
use crate::thread::Thread;

struct RecordingChannel {
    sent: Mutex<Vec<(MsgId, RequestEnvelope)>>,
}

impl RecordingChannel {
    fn new() -> Self {
        Self { sent: Mutex::new(Vec::new()) }
    }
}

impl RawChannel for RecordingChannel {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        self.sent.lock().push((msg_id.clone(), envelope));
    }
}

struct StubOffloader;

#[async_trait]
impl SignatureOffloader for StubOffloader {
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
        vec![]
    }
}

fn owner() -> PublicKey {
    PublicKey::from([7u8; 32])
}

fn empty_template() -> ThreadTemplate {
    ThreadTemplate {
        query: json!({}),
        crdt: json!({}),
        post: HashMap::new(),
        post_license: HashMap::new(),
    }
}

fn thread_with(
    template: ThreadTemplate,
) -> (Arc<RecordingChannel>, Arc<StorageClient<RecordingChannel>>, Thread<RecordingChannel, TimeFreeze>) {
    let transport = Arc::new(RecordingChannel::new());
    let storage = Arc::new(StorageClient::new(transport.clone()));
    let clock = TimeFreeze::new();
    clock.freeze(1_000);
    let factory = Arc::new(NodeFactory::new(clock, Arc::new(CertChain::new())));
    let thread = Thread::new(storage.clone(), factory, template, HashMap::new());
    (transport, storage, thread)
}

fn sample_node(owner_key: PublicKey) -> NodeProps {
    NodeProps {
        id1: NodeId1::from([9u8; 32]),
        parent_id: NodeId1::default(),
        owner: owner_key,
        creation_time: 1_000,
        expire_time: None,
        flags: NodeFlags::default(),
        license_min_distance: 0,
        license_max_distance: 0,
        data_config: 0,
        ref_id: Vec::new(),
        node_type: b"data".to_vec(),
        image: mesh_types::NodeImage(b"body".to_vec()),
    }
}

/// Waits for the `index`-th send to land, then feeds back a `StoreResponse`
/// for it. Polling by index (rather than "whatever's most recent") keeps
/// this race-free across the multi-target `postLicense` tests.
async fn reply_to_store_at(
    transport: &RecordingChannel,
    storage: &StorageClient<RecordingChannel>,
    index: usize,
    status: Status,
) {
    loop {
        if transport.sent.lock().len() > index {
            break;
        }
        tokio::task::yield_now().await;
    }
    let msg_id = transport.sent.lock()[index].0.clone();
    storage.on_envelope(
        &msg_id,
        RequestEnvelope::StoreResponse(StoreResponse {
            status,
            stored_id1_list: vec![],
            missing_blob_id1_list: vec![],
            missing_blob_sizes: vec![],
            error: String::new(),
        }),
    );
}

#[test]
fn stream_promotes_parent_into_trigger_node() {
    let template = ThreadTemplate {
        query: json!({ "parent_id": vec![0xAAu8; 32] }),
        crdt: json!({}),
        post: HashMap::new(),
        post_license: HashMap::new(),
    };
    let (_transport, _storage, thread) = thread_with(template);

    let request = thread
        .get_fetch_request(FetchQueryOverride::default(), FetchCrdtOverride::default(), true)
        .unwrap();

    assert_eq!(request.query.trigger_node_id, vec![0xAAu8; 32]);
    assert_eq!(request.query.trigger_interval, 60);
    assert!(request.crdt.msg_id.is_empty());
}

#[test]
fn stream_fails_when_neither_parent_nor_trigger_is_set() {
    let (_transport, _storage, thread) = thread_with(empty_template());

    let err = thread
        .get_fetch_request(FetchQueryOverride::default(), FetchCrdtOverride::default(), true)
        .unwrap_err();

    assert!(matches!(err, ThreadError::NoTrigger));
}

#[test]
fn stream_does_not_override_an_explicit_trigger_node() {
    let template = ThreadTemplate {
        query: json!({ "trigger_node_id": vec![0xBBu8; 32], "trigger_interval": 30 }),
        crdt: json!({}),
        post: HashMap::new(),
        post_license: HashMap::new(),
    };
    let (_transport, _storage, thread) = thread_with(template);

    let request = thread
        .get_fetch_request(FetchQueryOverride::default(), FetchCrdtOverride::default(), true)
        .unwrap();

    assert_eq!(request.query.trigger_node_id, vec![0xBBu8; 32]);
    assert_eq!(request.query.trigger_interval, 30);
}

#[test]
fn non_streaming_request_demotes_trigger_fields() {
    let template = ThreadTemplate {
        query: json!({ "trigger_node_id": vec![0xBBu8; 32], "trigger_interval": 30 }),
        crdt: json!({}),
        post: HashMap::new(),
        post_license: HashMap::new(),
    };
    let (_transport, _storage, thread) = thread_with(template);

    let request = thread
        .get_fetch_request(FetchQueryOverride::default(), FetchCrdtOverride::default(), false)
        .unwrap();

    assert!(request.query.trigger_node_id.is_empty());
    assert_eq!(request.query.trigger_interval, 0);
    assert!(!request.query.flags.only_trigger);
}

#[test]
fn call_override_beats_thread_default_beats_template() {
    let template = ThreadTemplate {
        query: json!({ "depth": 1 }),
        crdt: json!({}),
        post: HashMap::new(),
        post_license: HashMap::new(),
    };
    let (_transport, _storage, mut thread) = thread_with(template);
    thread.set_query_defaults(FetchQueryOverride { depth: Some(2), ..Default::default() });

    let from_defaults = thread
        .get_fetch_request(FetchQueryOverride::default(), FetchCrdtOverride::default(), false)
        .unwrap();
    assert_eq!(from_defaults.query.depth, 2);

    let from_call = thread
        .get_fetch_request(FetchQueryOverride { depth: Some(3), ..Default::default() }, FetchCrdtOverride::default(), false)
        .unwrap();
    assert_eq!(from_call.query.depth, 3);
}

#[tokio::test]
async fn post_signs_and_stores_a_data_node() {
    let mut template = empty_template();
    template.post.insert("message".to_string(), json!({ "body": vec![1u8, 2, 3] }));
    let (transport, storage, thread) = thread_with(template);

    let call = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            reply_to_store_at(&transport, &storage, 0, Status::Result).await;
        }
    });

    let props = thread
        .post("message", DataParamsOverride::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap();

    call.await.unwrap();
    assert_eq!(props.node_type, b"data");
    assert_eq!(props.owner, owner());
}

#[tokio::test]
async fn post_fails_with_unknown_template_name() {
    let (_transport, _storage, thread) = thread_with(empty_template());

    let err = thread
        .post("missing", DataParamsOverride::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap_err();

    assert!(matches!(err, ThreadError::UnknownPostTemplate(name) if name == "missing"));
}

#[tokio::test]
async fn post_edit_carries_parent_and_expire_time_from_the_edited_node() {
    let mut template = empty_template();
    template.post.insert("message".to_string(), json!({}));
    let (transport, storage, thread) = thread_with(template);

    let mut edited = sample_node(owner());
    edited.expire_time = Some(12_345);

    let call = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            reply_to_store_at(&transport, &storage, 0, Status::Result).await;
        }
    });

    let props = thread
        .post_edit("message", &edited, DataParamsOverride::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap();

    call.await.unwrap();
    assert_eq!(props.parent_id, edited.id1);
    assert_eq!(props.expire_time, Some(12_345));
    assert_eq!(props.data_config & mesh_types::ANNOTATION_EDIT, mesh_types::ANNOTATION_EDIT);
}

#[tokio::test]
async fn post_fails_when_store_reports_an_error_status() {
    let mut template = empty_template();
    template.post.insert("message".to_string(), json!({}));
    let (transport, storage, thread) = thread_with(template);

    let call = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            reply_to_store_at(&transport, &storage, 0, Status::NotAllowed).await;
        }
    });

    let err = thread
        .post("message", DataParamsOverride::default(), Some(&owner()), &StubOffloader)
        .await
        .unwrap_err();

    call.await.unwrap();
    assert!(matches!(err, ThreadError::StoreFailed { status: Status::NotAllowed, .. }));
}

#[tokio::test]
async fn delete_emits_a_destroy_node_for_a_destructible_node() {
    let (transport, storage, thread) = thread_with(empty_template());
    let node = sample_node(owner());

    let call = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            reply_to_store_at(&transport, &storage, 0, Status::Result).await;
        }
    });

    let destroyed = thread.delete(&node, Some(&owner()), &StubOffloader).await;
    call.await.unwrap();

    assert_eq!(destroyed.len(), 1);
    assert_eq!(destroyed[0].node_type, b"destroy");
    assert_eq!(destroyed[0].parent_id, node.id1);
}

#[tokio::test]
async fn delete_skips_an_indestructible_node() {
    let (_transport, _storage, thread) = thread_with(empty_template());
    let mut node = sample_node(owner());
    node.flags.is_indestructible = true;

    let destroyed = thread.delete(&node, Some(&owner()), &StubOffloader).await;
    assert!(destroyed.is_empty());
}

#[tokio::test]
async fn post_license_stores_one_license_per_target() {
    let (transport, storage, thread) = thread_with(empty_template());
    let node = sample_node(owner());
    let targets = vec![PublicKey::from([1u8; 32]), PublicKey::from([2u8; 32])];

    let sink = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            for i in 0..2 {
                reply_to_store_at(&transport, &storage, i, Status::Result).await;
            }
        }
    });

    let stored = thread
        .post_license(&node, &targets, &[], &[], None, Some(3_600), 1_000, Some(&owner()), &StubOffloader)
        .await;
    sink.await.unwrap();

    assert_eq!(stored.len(), 2);
    for license in &stored {
        assert_eq!(license.node_type, b"license");
        assert_eq!(license.expire_time, Some(4_600));
        assert!(license.flags.is_licensed);
    }
}

#[tokio::test]
async fn post_license_falls_back_through_target_layers() {
    let (transport, storage, thread) = thread_with(empty_template());
    let node = sample_node(owner());
    let template_targets = vec![PublicKey::from([9u8; 32])];

    let call = tokio::spawn({
        let transport = transport.clone();
        let storage = storage.clone();
        async move {
            reply_to_store_at(&transport, &storage, 0, Status::Result).await;
        }
    });

    let stored = thread
        .post_license(&node, &[], &[], &template_targets, None, None, 1_000, Some(&owner()), &StubOffloader)
        .await;
    call.await.unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].owner, template_targets[0]);
}
