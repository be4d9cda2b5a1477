use serde::{Deserialize, Serialize};

use crate::crdt::{CrdtResult, FetchCRDT};
use crate::query::FetchQuery;

/// Canonical response disposition. The numeric assignment is
/// implementation-defined but, once fixed, must stay stable across codec
/// versions (§6.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Error = 0,
    Result = 1,
    Missing = 2,
    NotAllowed = 3,
    MalformedRequest = 4,
    Exists = 5,
    MissingRootNode = 6,
    DroppedTrigger = 7,
    MismatchingSession = 8,
    MissingCursor = 9,
    TryAgain = 10,
}

impl Default for Status {
    fn default() -> Self {
        Status::Error
    }
}

impl Status {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Status::Error,
            1 => Status::Result,
            2 => Status::Missing,
            3 => Status::NotAllowed,
            4 => Status::MalformedRequest,
            5 => Status::Exists,
            6 => Status::MissingRootNode,
            7 => Status::DroppedTrigger,
            8 => Status::MismatchingSession,
            9 => Status::MissingCursor,
            10 => Status::TryAgain,
            _ => return None,
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Result)
    }
}

/// Fixed 32-bit big-endian opcode for every wire message. The opcode is the
/// first 4 bytes of a binary frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    FetchRequest = 0x0000_0001,
    FetchResponse = 0x0000_0002,
    StoreRequest = 0x0000_0003,
    StoreResponse = 0x0000_0004,
    UnsubscribeRequest = 0x0000_0005,
    UnsubscribeResponse = 0x0000_0006,
    WriteBlobRequest = 0x0000_0007,
    WriteBlobResponse = 0x0000_0008,
    ReadBlobRequest = 0x0000_0009,
    ReadBlobResponse = 0x0000_000a,
    GenericMessageRequest = 0x0000_000b,
    GenericMessageResponse = 0x0000_000c,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0x0000_0001 => Opcode::FetchRequest,
            0x0000_0002 => Opcode::FetchResponse,
            0x0000_0003 => Opcode::StoreRequest,
            0x0000_0004 => Opcode::StoreResponse,
            0x0000_0005 => Opcode::UnsubscribeRequest,
            0x0000_0006 => Opcode::UnsubscribeResponse,
            0x0000_0007 => Opcode::WriteBlobRequest,
            0x0000_0008 => Opcode::WriteBlobResponse,
            0x0000_0009 => Opcode::ReadBlobRequest,
            0x0000_000a => Opcode::ReadBlobResponse,
            0x0000_000b => Opcode::GenericMessageRequest,
            0x0000_000c => Opcode::GenericMessageResponse,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub query: FetchQuery,
    pub crdt: FetchCRDT,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub nodes: Vec<Vec<u8>>,
    pub embed: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: Status,
    pub result: FetchResult,
    pub crdt_result: CrdtResult,
    pub seq: u16,
    pub end_seq: u16,
    pub row_count: u16,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub nodes: Vec<Vec<u8>>,
    pub source_public_key: Vec<u8>,
    pub target_public_key: Vec<u8>,
    pub mute_msg_ids: Vec<Vec<u8>>,
    pub preserve_transient: bool,
    pub batch_id: u32,
    pub has_more: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub status: Status,
    pub stored_id1_list: Vec<Vec<u8>>,
    pub missing_blob_id1_list: Vec<Vec<u8>>,
    pub missing_blob_sizes: Vec<i64>,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub original_msg_id: Vec<u8>,
    pub target_public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub status: Status,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteBlobRequest {
    pub node_id1: Vec<u8>,
    pub pos: u64,
    pub data: Vec<u8>,
    pub source_public_key: Vec<u8>,
    pub target_public_key: Vec<u8>,
    pub mute_msg_ids: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteBlobResponse {
    pub status: Status,
    pub current_length: u64,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadBlobRequest {
    pub node_id1: Vec<u8>,
    pub pos: u64,
    pub length: u32,
    pub target_public_key: Vec<u8>,
    pub source_public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadBlobResponse {
    pub status: Status,
    pub data: Vec<u8>,
    pub seq: u16,
    pub end_seq: u16,
    pub blob_length: u64,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericMessageRequest {
    pub action: String,
    pub source_public_key: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericMessageResponse {
    pub status: Status,
    pub data: Vec<u8>,
    pub error: String,
}

/// The tagged union over all 12 wire message variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RequestEnvelope {
    FetchRequest(FetchRequest),
    FetchResponse(FetchResponse),
    StoreRequest(StoreRequest),
    StoreResponse(StoreResponse),
    UnsubscribeRequest(UnsubscribeRequest),
    UnsubscribeResponse(UnsubscribeResponse),
    WriteBlobRequest(WriteBlobRequest),
    WriteBlobResponse(WriteBlobResponse),
    ReadBlobRequest(ReadBlobRequest),
    ReadBlobResponse(ReadBlobResponse),
    GenericMessageRequest(GenericMessageRequest),
    GenericMessageResponse(GenericMessageResponse),
}

impl RequestEnvelope {
    pub fn opcode(&self) -> Opcode {
        match self {
            RequestEnvelope::FetchRequest(_) => Opcode::FetchRequest,
            RequestEnvelope::FetchResponse(_) => Opcode::FetchResponse,
            RequestEnvelope::StoreRequest(_) => Opcode::StoreRequest,
            RequestEnvelope::StoreResponse(_) => Opcode::StoreResponse,
            RequestEnvelope::UnsubscribeRequest(_) => Opcode::UnsubscribeRequest,
            RequestEnvelope::UnsubscribeResponse(_) => Opcode::UnsubscribeResponse,
            RequestEnvelope::WriteBlobRequest(_) => Opcode::WriteBlobRequest,
            RequestEnvelope::WriteBlobResponse(_) => Opcode::WriteBlobResponse,
            RequestEnvelope::ReadBlobRequest(_) => Opcode::ReadBlobRequest,
            RequestEnvelope::ReadBlobResponse(_) => Opcode::ReadBlobResponse,
            RequestEnvelope::GenericMessageRequest(_) => Opcode::GenericMessageRequest,
            RequestEnvelope::GenericMessageResponse(_) => Opcode::GenericMessageResponse,
        }
    }
}
