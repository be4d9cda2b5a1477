use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mesh_types::MsgId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// The tagged union `onceAny()` resolves to: the next reply, a terminal
/// error, or cancellation — whichever comes first.
#[derive(Clone, Debug)]
pub enum GetEvent<T> {
    Reply(T),
    Error(String),
    Cancel,
}

type ReplyCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type CancelCallback = Box<dyn FnOnce() + Send>;

struct Inner<T> {
    msg_id: MsgId,
    reply_callbacks: Mutex<Vec<ReplyCallback<T>>>,
    cancel_callback: Mutex<Option<CancelCallback>>,
    once_waiters: Mutex<Vec<oneshot::Sender<GetEvent<T>>>>,
    cancelled: AtomicBool,
}

/// The consumer's handle to an in-flight fetch/store/etc. call.
pub struct GetResponse<T> {
    inner: Arc<Inner<T>>,
}

/// The producer's handle to the same call, held by the `StorageClient`
/// implementation so it can push replies, surface errors, or cancel.
pub struct GetResponseSource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for GetResponseSource<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// Creates a linked `(GetResponse, GetResponseSource)` pair correlated by
/// `msg_id`.
pub fn channel<T>(msg_id: MsgId) -> (GetResponse<T>, GetResponseSource<T>) {
    let inner = Arc::new(Inner {
        msg_id,
        reply_callbacks: Mutex::new(Vec::new()),
        cancel_callback: Mutex::new(None),
        once_waiters: Mutex::new(Vec::new()),
        cancelled: AtomicBool::new(false),
    });
    (
        GetResponse { inner: inner.clone() },
        GetResponseSource { inner },
    )
}

impl<T: Clone + Send + 'static> GetResponse<T> {
    pub fn get_msg_id(&self) -> &MsgId {
        &self.inner.msg_id
    }

    /// Registers `cb` to run for every subsequent reply chunk (streaming
    /// fetches deliver more than one).
    pub fn on_reply(&self, cb: impl Fn(&T) + Send + Sync + 'static) {
        self.inner.reply_callbacks.lock().push(Box::new(cb));
    }

    /// Invoked exactly once, on transport-level termination.
    pub fn on_cancel(&self, cb: impl FnOnce() + Send + 'static) {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            cb();
            return;
        }
        *self.inner.cancel_callback.lock() = Some(Box::new(cb));
    }

    /// Resolves on the next reply, error, or cancellation after this call.
    pub async fn once_any(&self) -> GetEvent<T> {
        let (tx, rx) = oneshot::channel();
        self.inner.once_waiters.lock().push(tx);
        rx.await.unwrap_or(GetEvent::Cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + 'static> GetResponseSource<T> {
    pub fn get_msg_id(&self) -> &MsgId {
        &self.inner.msg_id
    }

    /// `onReply` observers run on the next scheduler tick, never on this
    /// call's own stack, so a callback that turns around and calls
    /// `onReply`/`cancel` again can't re-enter `deliver_reply` (§5).
    pub fn deliver_reply(&self, value: T) {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return;
        }
        for waiter in self.inner.once_waiters.lock().drain(..) {
            let _ = waiter.send(GetEvent::Reply(value.clone()));
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            for cb in inner.reply_callbacks.lock().iter() {
                cb(&value);
            }
        });
    }

    pub fn deliver_error(&self, reason: impl Into<String>) {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        for waiter in self.inner.once_waiters.lock().drain(..) {
            let _ = waiter.send(GetEvent::Error(reason.clone()));
        }
    }

    /// Idempotent: the cancel callback fires and pending `onceAny` waiters
    /// resolve exactly once even if called more than once.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        for waiter in self.inner.once_waiters.lock().drain(..) {
            let _ = waiter.send(GetEvent::Cancel);
        }
        if let Some(cb) = self.inner.cancel_callback.lock().take() {
            cb();
        }
    }
}
