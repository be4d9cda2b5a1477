use serde::{Deserialize, Serialize};

/// Stable mapping between the CRDT algorithm name used in the JSON codec and
/// the single-byte tag used on the wire. Resolves the open question in the
/// design notes: `ParseFetchCRDT.algo` must have one canonical name per id.
///
/// `""` always maps to `0` (no CRDT). Named algorithms get stable ids assigned
/// here and must never be renumbered once shipped.
pub fn algo_name_to_tag(name: &str) -> u8 {
    match name {
        "" => 0,
        "last-write-wins" => 1,
        "grow-only-set" => 2,
        "observed-remove-set" => 3,
        _ => 0,
    }
}

pub fn algo_tag_to_name(tag: u8) -> &'static str {
    match tag {
        0 => "",
        1 => "last-write-wins",
        2 => "grow-only-set",
        3 => "observed-remove-set",
        _ => "",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchCRDT {
    /// Canonical name; `""` means no CRDT view is requested.
    pub algo: String,
    /// Opaque JSON configuration blob for the selected algorithm.
    pub conf: String,
    pub msg_id: Vec<u8>,
    pub reverse: bool,
    pub head: i32,
    pub tail: i32,
    pub cursor_id1: Vec<u8>,
    pub cursor_index: i32,
}

impl Default for FetchCRDT {
    fn default() -> Self {
        Self {
            algo: String::new(),
            conf: String::new(),
            msg_id: Vec::new(),
            reverse: false,
            head: 0,
            tail: 0,
            cursor_id1: Vec::new(),
            cursor_index: 0,
        }
    }
}

impl FetchCRDT {
    pub fn is_active(&self) -> bool {
        !self.algo.is_empty()
    }

    pub fn algo_tag(&self) -> u8 {
        algo_name_to_tag(&self.algo)
    }
}

/// A single fragment of a CRDT delta stream; fragments are concatenated in
/// `seq` order until `seq == endSeq`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrdtResult {
    pub delta: Vec<u8>,
}

/// The diff produced once an entire CRDT batch (`seq == endSeq`) has been
/// applied to a view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrdtChange {
    pub added: Vec<Vec<u8>>,
    pub updated: Vec<Vec<u8>>,
    pub deleted: Vec<Vec<u8>>,
}

impl CrdtChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn merge(&mut self, other: CrdtChange) {
        self.added.extend(other.added);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
    }
}
