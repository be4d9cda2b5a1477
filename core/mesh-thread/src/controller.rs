use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mesh_storage::client::RawChannel;
use mesh_types::{FetchCRDT, FetchQuery, NodeId1};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::stream::{DecodedNode, ThreadStreamHandle, ThreadUpdate};

/// The seam `ThreadController` registers its forward/reverse auto-sync
/// subscriptions through. The concrete `AutoFetcher` this talks to lives in
/// the peer layer, which in turn depends on this crate — the trait avoids
/// the cycle the same way `SignatureOffloader`/`NodeDecoder` keep the
/// datamodel out of this core.
pub trait AutoSyncRegistrar: Send + Sync {
    fn register(&self, query: &FetchQuery, crdt: &FetchCRDT, reverse: bool) -> u64;
    fn unregister(&self, handle: u64);
}

/// A makeData hook: given a freshly decoded node, the previously derived
/// data (if this is an update), and whether this is an update, produces the
/// enriched `data` object attached to the dispatched `onChange` entry.
pub type MakeData = dyn Fn(&DecodedNode, Option<&Value>, bool) -> Value + Send + Sync;

#[derive(Clone, Debug)]
pub struct ViewEntry {
    pub id1: NodeId1,
    pub index: u64,
    pub data: Value,
    pub last_seen: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerChange {
    pub added: Vec<ViewEntry>,
    pub updated: Vec<ViewEntry>,
    pub deleted: Vec<NodeId1>,
}

type ChangeCallback = Box<dyn Fn(&ControllerChange) + Send + Sync>;
type CloseCallback = Box<dyn FnOnce() + Send>;

struct ViewState {
    entries: HashMap<[u8; 32], ViewEntry>,
}

/// A long-lived subscription over a `Thread::stream`. Owns the stream
/// handle, two auto-sync registrations (unless disabled), and a purge
/// timer that drops view entries older than `purge_age`.
pub struct ThreadController<R: RawChannel> {
    stream: ThreadStreamHandle<R>,
    registrar: Option<Arc<dyn AutoSyncRegistrar>>,
    forward_handle: Mutex<Option<u64>>,
    reverse_handle: Mutex<Option<u64>>,
    view: Arc<Mutex<ViewState>>,
    make_data: Arc<MakeData>,
    on_change: Mutex<Vec<ChangeCallback>>,
    on_close: Mutex<Option<CloseCallback>>,
    closed: AtomicBool,
    now: Arc<dyn Fn() -> u64 + Send + Sync>,
    purge_task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: RawChannel + Send + Sync + 'static> ThreadController<R> {
    /// `purge_interval`/`purge_age` default to 60s/600s per §4.8.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: ThreadStreamHandle<R>,
        registrar: Option<Arc<dyn AutoSyncRegistrar>>,
        query: FetchQuery,
        crdt: FetchCRDT,
        auto_sync: bool,
        make_data: Arc<MakeData>,
        now: Arc<dyn Fn() -> u64 + Send + Sync>,
        purge_interval: Duration,
        purge_age_secs: u64,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            stream,
            registrar: registrar.clone(),
            forward_handle: Mutex::new(None),
            reverse_handle: Mutex::new(None),
            view: Arc::new(Mutex::new(ViewState { entries: HashMap::new() })),
            make_data,
            on_change: Mutex::new(Vec::new()),
            on_close: Mutex::new(None),
            closed: AtomicBool::new(false),
            now,
            purge_task: Mutex::new(None),
        });

        if auto_sync {
            if let Some(registrar) = &controller.registrar {
                // includeLicenses = 3 (embed) pulls license nodes inline into the
                // synced set, so auto-sync can never preserve transient nodes or
                // run a CRDT reduction over them (§8).
                let (sync_query, sync_crdt) = if query.include_licenses == 3 {
                    let mut q = query.clone();
                    q.flags.preserve_transient = false;
                    let mut c = crdt.clone();
                    c.algo = String::new();
                    (q, c)
                } else {
                    (query.clone(), crdt.clone())
                };
                *controller.forward_handle.lock() = Some(registrar.register(&sync_query, &sync_crdt, false));
                *controller.reverse_handle.lock() = Some(registrar.register(&sync_query, &sync_crdt, true));
            }
        }

        let weak_view = controller.view.clone();
        let controller_for_dispatch = controller.clone();
        controller.stream.on_change(move |update: &ThreadUpdate| {
            let ThreadUpdate::Change(change) = update;
            controller_for_dispatch.apply_crdt_change(change, &weak_view);
        });

        let purge_view = controller.view.clone();
        let purge_now = controller.now.clone();
        let purge_age = purge_age_secs;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_interval);
            loop {
                ticker.tick().await;
                let cutoff = purge_now().saturating_sub(purge_age);
                purge_view.lock().entries.retain(|_, e| e.last_seen >= cutoff);
            }
        });
        *controller.purge_task.lock() = Some(task);

        controller
    }

    pub fn on_change(&self, cb: impl Fn(&ControllerChange) + Send + Sync + 'static) {
        self.on_change.lock().push(Box::new(cb));
    }

    pub fn on_close(&self, cb: impl FnOnce() + Send + 'static) {
        if self.closed.load(Ordering::SeqCst) {
            cb();
            return;
        }
        *self.on_close.lock() = Some(Box::new(cb));
    }

    fn apply_crdt_change(self: &Arc<Self>, change: &mesh_types::CrdtChange, view: &Arc<Mutex<ViewState>>) {
        let now = (self.now)();
        let mut added = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        let mut state = view.lock();

        for (index, raw_id1) in change.added.iter().enumerate() {
            let key = key_from(raw_id1);
            let data = (self.make_data)(&placeholder_node(raw_id1, index as u64), None, false);
            let entry = ViewEntry { id1: NodeId1::from_slice(raw_id1).unwrap_or_default(), index: index as u64, data, last_seen: now };
            state.entries.insert(key, entry.clone());
            added.push(entry);
        }
        for (index, raw_id1) in change.updated.iter().enumerate() {
            let key = key_from(raw_id1);
            let previous = state.entries.get(&key).map(|e| e.data.clone());
            let data = (self.make_data)(&placeholder_node(raw_id1, index as u64), previous.as_ref(), true);
            let entry = ViewEntry { id1: NodeId1::from_slice(raw_id1).unwrap_or_default(), index: index as u64, data, last_seen: now };
            state.entries.insert(key, entry.clone());
            updated.push(entry);
        }
        for raw_id1 in &change.deleted {
            let key = key_from(raw_id1);
            state.entries.remove(&key);
            deleted.push(NodeId1::from_slice(raw_id1).unwrap_or_default());
        }
        drop(state);

        added.sort_by_key(|e| e.index);
        updated.sort_by_key(|e| e.index);

        let dispatched = ControllerChange { added, updated, deleted };
        // `on_change` observers run on the next tick, never inline here, so
        // a callback that calls back into `on_change`/`close` can't re-enter
        // this apply while it's still running (§5).
        let controller = self.clone();
        tokio::spawn(async move {
            for cb in controller.on_change.lock().iter() {
                cb(&dispatched);
            }
        });
    }

    /// Idempotent: cancels the stream, unregisters both auto-syncs, purges
    /// every entry, and fires `close` exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stream.stop_stream();
        if let Some(registrar) = &self.registrar {
            if let Some(h) = self.forward_handle.lock().take() {
                registrar.unregister(h);
            }
            if let Some(h) = self.reverse_handle.lock().take() {
                registrar.unregister(h);
            }
        }
        self.view.lock().entries.clear();
        if let Some(task) = self.purge_task.lock().take() {
            task.abort();
        }
        if let Some(cb) = self.on_close.lock().take() {
            cb();
        }
        debug!("thread controller closed");
    }
}

fn key_from(raw: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    let n = raw.len().min(32);
    key[..n].copy_from_slice(&raw[..n]);
    key
}

/// `CrdtChange` only carries raw node bytes; without a `NodeDecoder` at the
/// controller layer we can only stamp a placeholder id/index into
/// `makeData`'s input. Embedders that need real node content wire a
/// `NodeDecoder` through the `Thread::stream` call already.
fn placeholder_node(raw_id1: &[u8], index: u64) -> DecodedNode {
    DecodedNode {
        id1: NodeId1::from_slice(raw_id1).unwrap_or_default(),
        is_special: false,
        index,
        data: Value::Null,
    }
}
