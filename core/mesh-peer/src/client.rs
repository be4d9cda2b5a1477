use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_types::{MsgId, RequestEnvelope};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::permissions::ConnectionPermissions;

/// Handles a request the other side of a connection sent unsolicited (as
/// opposed to a reply to something we issued, which `StorageClient` already
/// correlates). `Forwarder`/`Extender` install themselves as a peer's
/// handler at `peerConnected` time.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, msg_id: &MsgId, request: RequestEnvelope, reply: Arc<dyn Fn(RequestEnvelope) + Send + Sync>);
}

fn is_response(envelope: &RequestEnvelope) -> bool {
    matches!(
        envelope,
        RequestEnvelope::FetchResponse(_)
            | RequestEnvelope::StoreResponse(_)
            | RequestEnvelope::UnsubscribeResponse(_)
            | RequestEnvelope::WriteBlobResponse(_)
            | RequestEnvelope::ReadBlobResponse(_)
            | RequestEnvelope::GenericMessageResponse(_)
    )
}

/// One authenticated connection, local or remote. Wraps a `StorageClient`
/// for the calls *we* issue over this link, dispatches unsolicited inbound
/// requests to an installed `RequestHandler`, and cascades `close()` to
/// every child proxy registered against it (§4.9/§5).
pub struct P2PClient<R: RawChannel> {
    transport: Arc<R>,
    storage: Arc<StorageClient<R>>,
    handler: RwLock<Option<Arc<dyn RequestHandler>>>,
    pub permissions: ConnectionPermissions,
    pub clock_diff: i64,
    children: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    closed: AtomicBool,
    on_cancel: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl<R: RawChannel> P2PClient<R> {
    pub fn new(transport: Arc<R>, permissions: ConnectionPermissions, clock_diff: i64) -> Arc<Self> {
        Arc::new(Self {
            storage: Arc::new(StorageClient::new(transport.clone())),
            transport,
            handler: RwLock::new(None),
            permissions,
            clock_diff,
            children: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            on_cancel: Mutex::new(Vec::new()),
        })
    }

    pub fn storage(&self) -> &Arc<StorageClient<R>> {
        &self.storage
    }

    pub fn set_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Registers a closer to run when this connection closes, so a proxy
    /// (Forwarder/Extender/AutoFetcher) built on top of it tears down too.
    pub fn register_child(&self, closer: Arc<dyn Fn() + Send + Sync>) {
        self.children.lock().push(closer);
    }

    pub fn on_close(&self, cb: impl FnOnce() + Send + 'static) {
        if self.closed.load(Ordering::SeqCst) {
            cb();
            return;
        }
        self.on_cancel.lock().push(Box::new(cb));
    }

    /// Routes an inbound envelope: replies to calls we issued go to the
    /// `StorageClient` registry; everything else is a fresh request for the
    /// installed handler.
    pub fn dispatch(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        if is_response(&envelope) {
            self.storage.on_envelope(msg_id, envelope);
            return;
        }
        let Some(handler) = self.handler.read().clone() else {
            debug!(?msg_id, "no request handler installed, dropping inbound request");
            return;
        };
        let transport = self.transport.clone();
        let reply_msg_id = msg_id.clone();
        let reply: Arc<dyn Fn(RequestEnvelope) + Send + Sync> =
            Arc::new(move |out: RequestEnvelope| transport.send(&reply_msg_id, out));
        handler.handle(msg_id, envelope, reply);
    }

    /// Idempotent: closes the underlying storage client, cascades to every
    /// registered child, and fires `onClose` exactly once. The cascade and
    /// `onClose` callbacks run on the next tick rather than on this call's
    /// own stack, so a child closer that reaches back into this client
    /// can't re-enter `close` (§5).
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.storage.close();
        let children: Vec<_> = self.children.lock().drain(..).collect();
        let cancels: Vec<_> = self.on_cancel.lock().drain(..).collect();
        tokio::spawn(async move {
            for child in children {
                child();
            }
            for cb in cancels {
                cb();
            }
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
