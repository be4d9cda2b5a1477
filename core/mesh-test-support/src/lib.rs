//! Shared test doubles and builders used across the workspace's crates:
//! deterministic keys, in-memory `RawChannel` pairs, and `FetchQuery`
//! builders. Kept out of each crate's own `tests.rs` so the same fixtures
//! don't get re-implemented per crate.

pub mod channel;
pub mod keys;
pub mod query;

pub use channel::{linked_pair, wait_for_sent, ChannelEnd, Inbound, RecordingChannel};
pub use keys::{DeterministicOffloader, KeyPair};
pub use mesh_types::{Clock, SystemClock, TimeFreeze};
