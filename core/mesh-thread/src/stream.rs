use std::sync::Arc;

use mesh_storage::client::RawChannel;
use mesh_storage::{GetResponse, StorageClient};
use mesh_types::{CrdtChange, FetchRequest, FetchResponse, MsgId, NodeId1, UnsubscribeRequest};
use parking_lot::Mutex;
use serde_json::Value;

/// A node an embedder's datamodel has decoded from a raw `NodeImage`. The
/// real field layout lives outside this core (§1) — this is the minimal
/// shape the stream dispatcher needs for `isSpecial` filtering and view
/// reconstruction.
#[derive(Clone, Debug)]
pub struct DecodedNode {
    pub id1: NodeId1,
    pub is_special: bool,
    pub index: u64,
    pub data: Value,
}

/// The embedder-supplied hook that turns opaque `NodeImage` bytes and CRDT
/// delta fragments into the structured shapes the stream dispatcher works
/// with. Mirrors `SignatureOffloader`: the datamodel is out of scope, the
/// seam into it is not.
pub trait NodeDecoder: Send + Sync {
    fn decode(&self, image: &[u8]) -> Option<DecodedNode>;
    fn apply_delta(&self, delta: &[u8]) -> CrdtChange;
}

#[derive(Clone, Debug)]
pub enum ThreadUpdate {
    Change(CrdtChange),
}

type DataCallback = Box<dyn Fn(&DecodedNode) + Send + Sync>;
type ChangeCallback = Box<dyn Fn(&ThreadUpdate) + Send + Sync>;

/// Accumulates one fetch subscription's chunks: drops `isSpecial` nodes
/// before handing the rest to `onData`, and concatenates
/// `crdtResult.delta` fragments until `seq == endSeq` before dispatching a
/// single `onChange`.
pub(crate) struct Dispatcher {
    decoder: Arc<dyn NodeDecoder>,
    on_data: Mutex<Vec<DataCallback>>,
    on_change: Mutex<Vec<ChangeCallback>>,
    pending_delta: Mutex<Vec<u8>>,
}

impl Dispatcher {
    pub(crate) fn new(decoder: Arc<dyn NodeDecoder>) -> Self {
        Self {
            decoder,
            on_data: Mutex::new(Vec::new()),
            on_change: Mutex::new(Vec::new()),
            pending_delta: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_on_data(&self, cb: DataCallback) {
        self.on_data.lock().push(cb);
    }

    pub(crate) fn add_on_change(&self, cb: ChangeCallback) {
        self.on_change.lock().push(cb);
    }

    /// `onData`/`onChange` run on the next scheduler tick, never inline on
    /// the chunk-delivery stack, so a handler that calls back into
    /// `updateStream`/`stopStream` can't re-enter this dispatch (§5).
    pub(crate) fn handle(self: &Arc<Self>, chunk: &FetchResponse) {
        for raw in &chunk.result.nodes {
            if let Some(node) = self.decoder.decode(raw) {
                if node.is_special {
                    continue;
                }
                let dispatcher = self.clone();
                tokio::spawn(async move {
                    for cb in dispatcher.on_data.lock().iter() {
                        cb(&node);
                    }
                });
            }
        }

        self.pending_delta.lock().extend_from_slice(&chunk.crdt_result.delta);

        if chunk.seq == chunk.end_seq {
            let delta = std::mem::take(&mut *self.pending_delta.lock());
            let change = self.decoder.apply_delta(&delta);
            let dispatcher = self.clone();
            tokio::spawn(async move {
                for cb in dispatcher.on_change.lock().iter() {
                    cb(&ThreadUpdate::Change(change.clone()));
                }
            });
        }
    }
}

/// A live subscription returned by `Thread::stream`. The underlying fetch
/// msgId stays stable across `updateStream` calls.
pub struct ThreadStreamHandle<R: RawChannel> {
    storage: Arc<StorageClient<R>>,
    response: GetResponse<FetchResponse>,
    original_request: Mutex<FetchRequest>,
    dispatcher: Arc<Dispatcher>,
}

impl<R: RawChannel> ThreadStreamHandle<R> {
    pub(crate) fn new(
        storage: Arc<StorageClient<R>>,
        response: GetResponse<FetchResponse>,
        original_request: FetchRequest,
        decoder: Arc<dyn NodeDecoder>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(decoder));
        let handler = dispatcher.clone();
        response.on_reply(move |chunk: &FetchResponse| handler.handle(chunk));
        Self {
            storage,
            response,
            original_request: Mutex::new(original_request),
            dispatcher,
        }
    }

    pub fn on_data(&self, cb: impl Fn(&DecodedNode) + Send + Sync + 'static) {
        self.dispatcher.add_on_data(Box::new(cb));
    }

    pub fn on_change(&self, cb: impl Fn(&ThreadUpdate) + Send + Sync + 'static) {
        self.dispatcher.add_on_change(Box::new(cb));
    }

    pub fn msg_id(&self) -> &MsgId {
        self.response.get_msg_id()
    }

    /// Sends an Unsubscribe for this stream's msgId.
    pub fn stop_stream(&self) -> GetResponse<mesh_types::UnsubscribeResponse> {
        self.storage.unsubscribe(UnsubscribeRequest {
            original_msg_id: self.response.get_msg_id().0.clone(),
            target_public_key: self.original_request.lock().query.target_public_key.clone(),
        })
    }

    /// Re-sends the original `FetchRequest` with the subscription msgId and
    /// any of `cursor_id1`/`cursor_index`/`head`/`tail`/`reverse`/
    /// `trigger_interval` that `update` sets. The fetch msgId never changes.
    pub fn update_stream(&self, update: StreamUpdate) -> GetResponse<FetchResponse> {
        let mut request = self.original_request.lock();
        if let Some(v) = update.cursor_id1 {
            request.crdt.cursor_id1 = v;
        }
        if let Some(v) = update.cursor_index {
            request.crdt.cursor_index = v;
        }
        if let Some(v) = update.head {
            request.crdt.head = v;
        }
        if let Some(v) = update.tail {
            request.crdt.tail = v;
        }
        if let Some(v) = update.reverse {
            request.crdt.reverse = v;
        }
        if let Some(v) = update.trigger_interval {
            request.query.trigger_interval = v;
        }
        request.crdt.msg_id = self.response.get_msg_id().0.clone();
        self.storage.fetch(request.clone())
    }
}

/// The subset of `FetchCRDT`/`FetchQuery` fields `updateStream` is allowed
/// to change on a live subscription.
#[derive(Clone, Debug, Default)]
pub struct StreamUpdate {
    pub cursor_id1: Option<Vec<u8>>,
    pub cursor_index: Option<i32>,
    pub head: Option<i32>,
    pub tail: Option<i32>,
    pub reverse: Option<bool>,
    pub trigger_interval: Option<u16>,
}
