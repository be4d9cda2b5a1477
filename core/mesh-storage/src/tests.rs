use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use mesh_types::{FetchCRDT, FetchQuery, FetchRequest, FetchResponse, RequestEnvelope, Status};
use parking_lot::Mutex;

use crate::client::{RawChannel, StorageClient};
use crate::response::GetEvent;

struct RecordingChannel {
    sent: Mutex<Vec<RequestEnvelope>>,
}

impl RecordingChannel {
    fn new() -> Self {
        Self { sent: Mutex::new(Vec::new()) }
    }
}

impl RawChannel for RecordingChannel {
    fn send(&self, _msg_id: &mesh_types::MsgId, envelope: RequestEnvelope) {
        self.sent.lock().push(envelope);
    }
}

fn sample_fetch_response(seq: u16, end_seq: u16) -> FetchResponse {
    FetchResponse {
        status: Status::Result,
        result: Default::default(),
        crdt_result: Default::default(),
        seq,
        end_seq,
        row_count: 1,
        error: String::new(),
    }
}

#[test]
fn fetch_assigns_a_msg_id_when_the_request_has_none() {
    let transport = Arc::new(RecordingChannel::new());
    let client = StorageClient::new(transport.clone());

    let request = FetchRequest { query: FetchQuery::default(), crdt: FetchCRDT::default() };
    let response = client.fetch(request);

    assert!(!response.get_msg_id().is_empty());
    let sent = transport.sent.lock();
    match &sent[0] {
        RequestEnvelope::FetchRequest(r) => assert_eq!(&r.crdt.msg_id, &response.get_msg_id().0),
        _ => panic!("expected a FetchRequest"),
    }
}

#[tokio::test]
async fn on_reply_fires_for_every_streamed_chunk() {
    let transport = Arc::new(RecordingChannel::new());
    let client = StorageClient::new(transport);

    let request = FetchRequest { query: FetchQuery::default(), crdt: FetchCRDT::default() };
    let response = client.fetch(request);
    let msg_id = response.get_msg_id().clone();

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();
    response.on_reply(move |_r: &FetchResponse| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    client.on_envelope(&msg_id, RequestEnvelope::FetchResponse(sample_fetch_response(0, 1)));
    client.on_envelope(&msg_id, RequestEnvelope::FetchResponse(sample_fetch_response(1, 1)));

    // deliver_reply dispatches onReply on the next tick (§5), not inline.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn once_any_resolves_with_the_next_reply() {
    let transport = Arc::new(RecordingChannel::new());
    let client = Arc::new(StorageClient::new(transport));

    let request = FetchRequest { query: FetchQuery::default(), crdt: FetchCRDT::default() };
    let response = client.fetch(request);
    let msg_id = response.get_msg_id().clone();

    let client_clone = client.clone();
    let waiter = tokio::spawn(async move { response.once_any().await });

    tokio::task::yield_now().await;
    client_clone.on_envelope(&msg_id, RequestEnvelope::FetchResponse(sample_fetch_response(0, 0)));

    match waiter.await.unwrap() {
        GetEvent::Reply(r) => assert_eq!(r.seq, 0),
        other => panic!("expected Reply, got {other:?}"),
    }
}

#[test]
fn close_cancels_every_outstanding_call_exactly_once() {
    let transport = Arc::new(RecordingChannel::new());
    let client = StorageClient::new(transport);

    let a = client.fetch(FetchRequest { query: FetchQuery::default(), crdt: FetchCRDT::default() });
    let b = client.fetch(FetchRequest {
        query: FetchQuery::default(),
        crdt: FetchCRDT { msg_id: b"explicit".to_vec(), ..Default::default() },
    });

    let cancels = Arc::new(AtomicUsize::new(0));
    let c1 = cancels.clone();
    let c2 = cancels.clone();
    a.on_cancel(move || {
        c1.fetch_add(1, Ordering::SeqCst);
    });
    b.on_cancel(move || {
        c2.fetch_add(1, Ordering::SeqCst);
    });

    client.close();
    client.close();

    assert_eq!(cancels.load(Ordering::SeqCst), 2);
    assert!(client.is_closed());
}
