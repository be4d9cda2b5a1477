use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use mesh_storage::client::RawChannel;
use mesh_storage::GetResponse;
use mesh_types::{
    FetchCRDT, FetchQuery, FetchRequest, FetchResponse, MsgId, NodeId1, PublicKey, ReadBlobRequest,
    ReadBlobResponse, StoreRequest, UnsubscribeRequest,
};
use parking_lot::Mutex;

use crate::client::P2PClient;

/// One registered subscription: `reverse = false` pulls from the remote
/// peer into local storage, `reverse = true` pushes local storage to the
/// remote. `remote_public_key = None` matches every connected peer (§4.9).
#[derive(Clone, Debug, PartialEq)]
pub struct AutoFetch {
    pub query: FetchQuery,
    pub crdt: FetchCRDT,
    pub reverse: bool,
    pub remote_public_key: Option<PublicKey>,
}

/// Bookkeeping shared across every `AutoFetcher` on a `Service`, so
/// `syncBlob` can hand an already-in-flight pull to a second caller instead
/// of requesting the same blob twice.
#[derive(Default)]
pub struct BlobSyncRegistry {
    in_flight: DashMap<NodeId1, ()>,
}

impl BlobSyncRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns `true` if this call claimed the blob (the caller should issue
    /// the read); `false` means another `AutoFetcher` already owns it.
    fn claim(&self, id1: NodeId1) -> bool {
        self.in_flight.insert(id1, ()).is_none()
    }

    fn release(&self, id1: &NodeId1) {
        self.in_flight.remove(id1);
    }
}

/// Owns a set of subscriptions between one remote peer and local storage,
/// both mediated through their own `P2PClient`s, and the mute lists that
/// stop the pair from echoing each other's traffic back and forth (§4.9).
pub struct AutoFetcher<R: RawChannel, L: RawChannel> {
    remote: Arc<P2PClient<R>>,
    local: Arc<P2PClient<L>>,
    connected_public_key: PublicKey,
    mute_msg_ids: Mutex<HashSet<Vec<u8>>>,
    reverse_mute_msg_ids: Mutex<HashSet<Vec<u8>>>,
    blob_size_max_limit: i64,
    active: Mutex<Vec<MsgId>>,
    blob_registry: Arc<BlobSyncRegistry>,
}

impl<R: RawChannel + 'static, L: RawChannel + 'static> AutoFetcher<R, L> {
    pub fn new(
        remote: Arc<P2PClient<R>>,
        local: Arc<P2PClient<L>>,
        connected_public_key: PublicKey,
        blob_size_max_limit: i64,
        blob_registry: Arc<BlobSyncRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            remote,
            local,
            connected_public_key,
            mute_msg_ids: Mutex::new(HashSet::new()),
            reverse_mute_msg_ids: Mutex::new(HashSet::new()),
            blob_size_max_limit,
            active: Mutex::new(Vec::new()),
            blob_registry,
        })
    }

    pub fn add_fetch(self: &Arc<Self>, entries: &[AutoFetch]) {
        for entry in entries {
            if let Some(filter) = entry.remote_public_key {
                if filter != self.connected_public_key {
                    continue;
                }
            }
            if entry.reverse {
                self.start_reverse(entry);
            } else {
                self.start_forward(entry);
            }
        }
    }

    fn start_forward(self: &Arc<Self>, entry: &AutoFetch) {
        let request = FetchRequest { query: entry.query.clone(), crdt: entry.crdt.clone() };
        let response: GetResponse<FetchResponse> = self.remote.storage().fetch(request);
        let msg_id = response.get_msg_id().clone();
        self.mute_msg_ids.lock().insert(msg_id.0.clone());
        self.active.lock().push(msg_id);

        let local = self.local.clone();
        let blob_limit = self.blob_size_max_limit;
        response.on_reply(move |chunk: &FetchResponse| {
            let nodes: Vec<Vec<u8>> = chunk
                .result
                .nodes
                .iter()
                .filter(|n| blob_limit < 0 || (n.len() as i64) <= blob_limit)
                .cloned()
                .collect();
            if nodes.is_empty() {
                return;
            }
            local.storage().store(StoreRequest {
                nodes,
                source_public_key: Vec::new(),
                target_public_key: Vec::new(),
                mute_msg_ids: Vec::new(),
                preserve_transient: false,
                batch_id: 0,
                has_more: false,
            });
        });
    }

    fn start_reverse(self: &Arc<Self>, entry: &AutoFetch) {
        let request = FetchRequest { query: entry.query.clone(), crdt: entry.crdt.clone() };
        let response: GetResponse<FetchResponse> = self.local.storage().fetch(request);
        let msg_id = response.get_msg_id().clone();
        self.reverse_mute_msg_ids.lock().insert(msg_id.0.clone());
        self.active.lock().push(msg_id);

        let remote = self.remote.clone();
        let blob_limit = self.blob_size_max_limit;
        response.on_reply(move |chunk: &FetchResponse| {
            let nodes: Vec<Vec<u8>> = chunk
                .result
                .nodes
                .iter()
                .filter(|n| blob_limit < 0 || (n.len() as i64) <= blob_limit)
                .cloned()
                .collect();
            if nodes.is_empty() {
                return;
            }
            remote.storage().store(StoreRequest {
                nodes,
                source_public_key: Vec::new(),
                target_public_key: Vec::new(),
                mute_msg_ids: Vec::new(),
                preserve_transient: false,
                batch_id: 0,
                has_more: false,
            });
        });
    }

    /// First-match-wins: if another `AutoFetcher` already claimed this blob
    /// via the shared registry, returns `None` and the caller should expect
    /// its eventual write to come from that existing pull. Otherwise issues
    /// the read itself and releases the claim once the stream ends.
    pub fn sync_blob(self: &Arc<Self>, node_id1: NodeId1, expected_len: u64) -> Option<GetResponse<ReadBlobResponse>> {
        if !self.blob_registry.claim(node_id1) {
            return None;
        }
        let response = self.remote.storage().read_blob(ReadBlobRequest {
            node_id1: node_id1.as_bytes().to_vec(),
            pos: 0,
            length: expected_len.min(u32::MAX as u64) as u32,
            target_public_key: Vec::new(),
            source_public_key: Vec::new(),
        });
        let registry = self.blob_registry.clone();
        response.on_cancel(move || registry.release(&node_id1));
        let registry = self.blob_registry.clone();
        response.on_reply(move |r: &ReadBlobResponse| {
            if r.seq == r.end_seq {
                registry.release(&node_id1);
            }
        });
        Some(response)
    }

    pub fn is_muted_forward(&self, msg_id: &[u8]) -> bool {
        self.mute_msg_ids.lock().contains(msg_id)
    }

    pub fn is_muted_reverse(&self, msg_id: &[u8]) -> bool {
        self.reverse_mute_msg_ids.lock().contains(msg_id)
    }

    pub fn stop_all(&self) {
        for msg_id in self.active.lock().drain(..) {
            self.remote.storage().unsubscribe(UnsubscribeRequest { original_msg_id: msg_id.0, target_public_key: Vec::new() });
        }
        self.mute_msg_ids.lock().clear();
        self.reverse_mute_msg_ids.lock().clear();
    }
}
