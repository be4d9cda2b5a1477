use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mesh_types::{
    FetchRequest, FetchResponse, GenericMessageRequest, GenericMessageResponse, MsgId,
    ReadBlobRequest, ReadBlobResponse, RequestEnvelope, StoreRequest, StoreResponse,
    UnsubscribeRequest, UnsubscribeResponse, WriteBlobRequest, WriteBlobResponse,
};
use tracing::debug;

use crate::response::{channel, GetResponse, GetResponseSource};

/// The authenticated message channel this adapter wraps. Transport framing,
/// auth, and delivery live outside this crate; this is the seam an embedder
/// plugs a real connection into.
pub trait RawChannel: Send + Sync {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope);
}

/// One pending call's producer handle, kept type-erased behind an enum so a
/// single registry can hold every request kind.
enum PendingSource {
    Fetch(GetResponseSource<FetchResponse>),
    Store(GetResponseSource<StoreResponse>),
    Unsubscribe(GetResponseSource<UnsubscribeResponse>),
    WriteBlob(GetResponseSource<WriteBlobResponse>),
    ReadBlob(GetResponseSource<ReadBlobResponse>),
    Message(GetResponseSource<GenericMessageResponse>),
}

impl PendingSource {
    fn cancel(&self) {
        match self {
            PendingSource::Fetch(s) => s.cancel(),
            PendingSource::Store(s) => s.cancel(),
            PendingSource::Unsubscribe(s) => s.cancel(),
            PendingSource::WriteBlob(s) => s.cancel(),
            PendingSource::ReadBlob(s) => s.cancel(),
            PendingSource::Message(s) => s.cancel(),
        }
    }
}

/// Wraps a `RawChannel`, handing back a `GetResponse<T>` per call and
/// routing inbound responses back to the right one by `msgId`.
pub struct StorageClient<R: RawChannel> {
    transport: Arc<R>,
    pending: DashMap<MsgId, PendingSource>,
    next_msg_id: AtomicU64,
    closed: AtomicBool,
}

impl<R: RawChannel> StorageClient<R> {
    pub fn new(transport: Arc<R>) -> Self {
        Self {
            transport,
            pending: DashMap::new(),
            next_msg_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    fn fresh_msg_id(&self) -> MsgId {
        let n = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        MsgId::from(n.to_be_bytes().to_vec())
    }

    pub fn fetch(&self, mut request: FetchRequest) -> GetResponse<FetchResponse> {
        let msg_id = if request.crdt.msg_id.is_empty() {
            let fresh = self.fresh_msg_id();
            request.crdt.msg_id = fresh.0.clone();
            fresh
        } else {
            MsgId::from(request.crdt.msg_id.clone())
        };
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::Fetch(source));
        self.transport.send(&msg_id, RequestEnvelope::FetchRequest(request));
        response
    }

    pub fn store(&self, request: StoreRequest) -> GetResponse<StoreResponse> {
        let msg_id = self.fresh_msg_id();
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::Store(source));
        self.transport.send(&msg_id, RequestEnvelope::StoreRequest(request));
        response
    }

    pub fn unsubscribe(&self, request: UnsubscribeRequest) -> GetResponse<UnsubscribeResponse> {
        let msg_id = self.fresh_msg_id();
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::Unsubscribe(source));
        self.transport.send(&msg_id, RequestEnvelope::UnsubscribeRequest(request));
        response
    }

    pub fn write_blob(&self, request: WriteBlobRequest) -> GetResponse<WriteBlobResponse> {
        let msg_id = self.fresh_msg_id();
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::WriteBlob(source));
        self.transport.send(&msg_id, RequestEnvelope::WriteBlobRequest(request));
        response
    }

    pub fn read_blob(&self, request: ReadBlobRequest) -> GetResponse<ReadBlobResponse> {
        let msg_id = self.fresh_msg_id();
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::ReadBlob(source));
        self.transport.send(&msg_id, RequestEnvelope::ReadBlobRequest(request));
        response
    }

    pub fn send_message(&self, request: GenericMessageRequest) -> GetResponse<GenericMessageResponse> {
        let msg_id = self.fresh_msg_id();
        let (response, source) = channel(msg_id.clone());
        self.pending.insert(msg_id.clone(), PendingSource::Message(source));
        self.transport.send(&msg_id, RequestEnvelope::GenericMessageRequest(request));
        response
    }

    /// Feeds an inbound envelope to its matching pending call. Fetch/read-blob
    /// streams stay registered until the caller unsubscribes or `close()`s;
    /// every other response kind is a single reply and is dropped from the
    /// registry once delivered.
    pub fn on_envelope(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        let Some(entry) = self.pending.get(msg_id) else {
            debug!(?msg_id, "response for unknown or already-closed msgId");
            return;
        };
        let is_terminal = match (entry.value(), envelope) {
            (PendingSource::Fetch(s), RequestEnvelope::FetchResponse(r)) => {
                s.deliver_reply(r);
                false
            }
            (PendingSource::Store(s), RequestEnvelope::StoreResponse(r)) => {
                s.deliver_reply(r);
                true
            }
            (PendingSource::Unsubscribe(s), RequestEnvelope::UnsubscribeResponse(r)) => {
                s.deliver_reply(r);
                true
            }
            (PendingSource::WriteBlob(s), RequestEnvelope::WriteBlobResponse(r)) => {
                s.deliver_reply(r);
                true
            }
            (PendingSource::ReadBlob(s), RequestEnvelope::ReadBlobResponse(r)) => {
                s.deliver_reply(r);
                false
            }
            (PendingSource::Message(s), RequestEnvelope::GenericMessageResponse(r)) => {
                s.deliver_reply(r);
                true
            }
            _ => {
                debug!(?msg_id, "response kind did not match the pending call's kind");
                false
            }
        };
        drop(entry);
        if is_terminal {
            self.pending.remove(msg_id);
        }
    }

    /// Idempotent: cancels every outstanding `GetResponse` exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in self.pending.iter() {
            entry.value().cancel();
        }
        self.pending.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
