//! Shared wire/data-model types for the sync core: request/response
//! envelopes, query and CRDT parameter structs, node/cert ids, the clock
//! abstraction, and the service event enum.

pub mod clock;
pub mod crdt;
pub mod events;
pub mod ids;
pub mod node;
pub mod offload;
pub mod query;
pub mod request;

#[cfg(test)]
mod tests;

pub use clock::{Clock, SystemClock, TimeFreeze};
pub use crdt::{CrdtChange, CrdtResult, FetchCRDT};
pub use events::ServiceEvent;
pub use ids::{MsgId, NodeId1, PublicKey};
pub use node::{NodeFlags, NodeImage, NodeProps, ANNOTATION_EDIT, ANNOTATION_REACTION};
pub use offload::SignatureOffloader;
pub use query::{AllowEmbed, Cmp, FetchQuery, FetchQueryFlags, Filter, FilterValue, LimitField, Match};
pub use request::{
    FetchRequest,
    FetchResponse,
    FetchResult,
    GenericMessageRequest,
    GenericMessageResponse,
    Opcode,
    ReadBlobRequest,
    ReadBlobResponse,
    RequestEnvelope,
    Status,
    StoreRequest,
    StoreResponse,
    UnsubscribeRequest,
    UnsubscribeResponse,
    WriteBlobRequest,
    WriteBlobResponse,
};
