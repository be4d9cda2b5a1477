use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Abstracts "now" so that NodeFactory defaults and Service timestamps are
/// testable without sleeping real time.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> u64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs()
    }
}

/// A clock that can be pinned to a fixed value for the duration of a test.
/// `freeze`/`unfreeze` nest: the most recent still-frozen value wins, and
/// unfreezing pops back to whatever was frozen before it (or to the real
/// clock once the stack empties).
pub struct TimeFreeze<C: Clock = SystemClock> {
    inner: C,
    stack: Mutex<Vec<u64>>,
}

impl TimeFreeze<SystemClock> {
    pub fn new() -> Self {
        Self {
            inner: SystemClock,
            stack: Mutex::new(Vec::new()),
        }
    }
}

impl Default for TimeFreeze<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TimeFreeze<C> {
    pub fn with_clock(inner: C) -> Self {
        Self {
            inner,
            stack: Mutex::new(Vec::new()),
        }
    }

    pub fn freeze(&self, at: u64) {
        self.stack.lock().push(at);
    }

    pub fn unfreeze(&self) {
        self.stack.lock().pop();
    }

    pub fn is_frozen(&self) -> bool {
        !self.stack.lock().is_empty()
    }
}

impl<C: Clock> Clock for TimeFreeze<C> {
    fn now_unix(&self) -> u64 {
        if let Some(v) = self.stack.lock().last() {
            *v
        } else {
            self.inner.now_unix()
        }
    }
}
