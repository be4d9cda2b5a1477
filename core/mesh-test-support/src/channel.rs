use std::sync::Arc;

use mesh_storage::client::RawChannel;
use mesh_types::{MsgId, RequestEnvelope};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// What a `HandshakeFactory` callback hands back alongside the outbound
/// channel: every envelope the other side sends arrives here.
pub type Inbound = mpsc::UnboundedReceiver<(MsgId, RequestEnvelope)>;

/// One end of an in-memory connection: `send` forwards straight into the
/// peer's `Inbound` queue instead of touching any real transport.
pub struct ChannelEnd {
    peer_tx: mpsc::UnboundedSender<(MsgId, RequestEnvelope)>,
}

impl RawChannel for ChannelEnd {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        let _ = self.peer_tx.send((msg_id.clone(), envelope));
    }
}

/// Builds two connected `ChannelEnd`s: whatever `a` sends shows up in `b`'s
/// `Inbound`, and whatever `b` sends shows up in `a`'s. Stands in for the
/// real transport a `HandshakeFactory` would otherwise supply, so a single
/// process can drive both sides of a handshake in a test.
pub fn linked_pair() -> (Arc<ChannelEnd>, Inbound, Arc<ChannelEnd>, Inbound) {
    let (tx_to_b, rx_from_a) = mpsc::unbounded_channel();
    let (tx_to_a, rx_from_b) = mpsc::unbounded_channel();
    let a = Arc::new(ChannelEnd { peer_tx: tx_to_b });
    let b = Arc::new(ChannelEnd { peer_tx: tx_to_a });
    (a, rx_from_b, b, rx_from_a)
}

/// A `RawChannel` that just records what it was sent, for tests that only
/// care about what went out and reply by hand via `StorageClient::on_envelope`.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(MsgId, RequestEnvelope)>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(MsgId, RequestEnvelope)> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<(MsgId, RequestEnvelope)> {
        self.sent.lock().last().cloned()
    }
}

impl RawChannel for RecordingChannel {
    fn send(&self, msg_id: &MsgId, envelope: RequestEnvelope) {
        self.sent.lock().push((msg_id.clone(), envelope));
    }
}

/// Polls `sent.len()` until it reaches `count` or `tries` elapses, since a
/// dispatch loop runs on its own spawned task and sends land asynchronously.
pub async fn wait_for_sent(channel: &RecordingChannel, count: usize) -> bool {
    for _ in 0..200 {
        if channel.sent().len() >= count {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    channel.sent().len() >= count
}
