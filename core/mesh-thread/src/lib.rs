//! Translates a `ThreadTemplate` + per-call parameters into a concrete
//! `FetchRequest`, and the `post`/`postEdit`/`postReaction`/`delete`/
//! `postLicense` helpers built on top of it (§4.7).

pub mod controller;
pub mod error;
pub mod stream;
pub mod template;
pub mod thread;

pub use controller::{AutoSyncRegistrar, ControllerChange, MakeData, ThreadController, ViewEntry};
pub use error::ThreadError;
pub use stream::{DecodedNode, NodeDecoder, StreamUpdate, ThreadStreamHandle, ThreadUpdate};
pub use template::{DataParamsOverride, FetchCrdtOverride, FetchQueryOverride, ThreadTemplate};
pub use thread::Thread;

#[cfg(test)]
mod tests;
