use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use mesh_storage::client::RawChannel;
use mesh_types::{FetchCRDT, FetchQuery, FetchResponse, Match, MsgId, PublicKey, RequestEnvelope, Status};
use parking_lot::Mutex;

use crate::autofetcher::{AutoFetch, AutoFetcher, BlobSyncRegistry};
use crate::client::{P2PClient, RequestHandler};
use crate::forwarder::Forwarder;
use crate::permissions::{ConnectionPermissions, FetchPermissions, StorePermissions};

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

fn match_for(node_type: &[u8]) -> Match {
    Match {
        node_type: node_type.to_vec(),
        filters: vec![],
        limit: -1,
        limit_field: Default::default(),
        level: vec![],
        discard: false,
        bottom: false,
        id: 0,
        require_id: 0,
        cursor_id1: vec![],
    }
}

#[test]
fn forwarder_denies_a_fetch_for_an_unpermitted_node_type() {
    let local_transport = Arc::new(RecordingChannel::new());
    let local = Arc::new(mesh_storage::StorageClient::new(local_transport));
    let permissions = ConnectionPermissions {
        fetch: FetchPermissions { allow_node_types: vec![b"data".to_vec()], allow_read_blob: false },
        store: StorePermissions::default(),
        allow_embed: false,
        allow_include_licenses: false,
    };
    let forwarder = Forwarder::new(local, permissions);

    let request = RequestEnvelope::FetchRequest(mesh_types::FetchRequest {
        query: FetchQuery { r#match: vec![match_for(b"license")], ..FetchQuery::default() },
        crdt: FetchCRDT::default(),
    });

    let replies = Arc::new(Mutex::new(Vec::new()));
    let replies_clone = replies.clone();
    forwarder.handle(&MsgId::from(vec![1]), request, Arc::new(move |r| replies_clone.lock().push(r)));

    let replies = replies.lock();
    match &replies[0] {
        RequestEnvelope::FetchResponse(r) => assert_eq!(r.status, Status::NotAllowed),
        other => panic!("expected FetchResponse, got {other:?}"),
    }
}

#[test]
fn forwarder_relays_a_permitted_fetch_to_local_storage() {
    let local_transport = Arc::new(RecordingChannel::new());
    let local = Arc::new(mesh_storage::StorageClient::new(local_transport.clone()));
    let permissions = ConnectionPermissions {
        fetch: FetchPermissions { allow_node_types: vec![], allow_read_blob: false },
        store: StorePermissions::default(),
        allow_embed: false,
        allow_include_licenses: false,
    };
    let forwarder = Forwarder::new(local.clone(), permissions);

    let request = RequestEnvelope::FetchRequest(mesh_types::FetchRequest {
        query: FetchQuery::default(),
        crdt: FetchCRDT::default(),
    });

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    forwarder.handle(&MsgId::from(vec![1]), request, Arc::new(move |_r| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(local_transport.sent.lock().len(), 1);
    let (msg_id, _) = local_transport.sent.lock()[0].clone();
    local.on_envelope(
        &msg_id,
        RequestEnvelope::FetchResponse(FetchResponse {
            status: Status::Result,
            result: Default::default(),
            crdt_result: Default::default(),
            seq: 0,
            end_seq: 0,
            row_count: 0,
            error: String::new(),
        }),
    );

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn p2p_client_close_cascades_to_registered_children() {
    let transport = Arc::new(RecordingChannel::new());
    let client = P2PClient::new(transport, ConnectionPermissions::default(), 0);

    let closed = Arc::new(AtomicUsize::new(0));
    let closed_clone = closed.clone();
    client.register_child(Arc::new(move || {
        closed_clone.fetch_add(1, Ordering::SeqCst);
    }));

    client.close();
    client.close();

    // close()'s cascade dispatches on the next tick (§5), not inline.
    tokio::task::yield_now().await;

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(client.is_closed());
}

#[test]
fn autofetcher_mutes_the_msg_id_it_issued_on_the_forward_direction() {
    let remote_transport = Arc::new(RecordingChannel::new());
    let remote = P2PClient::new(remote_transport, ConnectionPermissions::default(), 0);
    let local_transport = Arc::new(RecordingChannel::new());
    let local = P2PClient::new(local_transport, ConnectionPermissions::default(), 0);

    let autofetcher = AutoFetcher::new(remote, local, PublicKey::from([1u8; 32]), -1, BlobSyncRegistry::new());
    autofetcher.add_fetch(&[AutoFetch {
        query: FetchQuery::default(),
        crdt: FetchCRDT::default(),
        reverse: false,
        remote_public_key: None,
    }]);

    assert!(autofetcher.is_muted_forward(&[0, 0, 0, 0, 0, 0, 0, 1]));
}

#[test]
fn autofetcher_skips_entries_filtered_to_a_different_peer() {
    let remote_transport = Arc::new(RecordingChannel::new());
    let remote = P2PClient::new(remote_transport.clone(), ConnectionPermissions::default(), 0);
    let local_transport = Arc::new(RecordingChannel::new());
    let local = P2PClient::new(local_transport, ConnectionPermissions::default(), 0);

    let autofetcher = AutoFetcher::new(remote, local, PublicKey::from([1u8; 32]), -1, BlobSyncRegistry::new());
    autofetcher.add_fetch(&[AutoFetch {
        query: FetchQuery::default(),
        crdt: FetchCRDT::default(),
        reverse: false,
        remote_public_key: Some(PublicKey::from([2u8; 32])),
    }]);

    assert!(remote_transport.sent.lock().is_empty());
}
