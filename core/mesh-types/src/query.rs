use serde::{Deserialize, Serialize};

use crate::ids::{NodeId1, PublicKey};

/// Comparison operator carried by a [`Filter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Cmp::Eq => "EQ",
            Cmp::Ne => "NE",
            Cmp::Lt => "LT",
            Cmp::Le => "LE",
            Cmp::Gt => "GT",
            Cmp::Ge => "GE",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "EQ" => Cmp::Eq,
            "NE" => Cmp::Ne,
            "LT" => Cmp::Lt,
            "LE" => Cmp::Le,
            "GT" => Cmp::Gt,
            "GE" => Cmp::Ge,
            _ => return None,
        })
    }
}

/// The value half of a [`Filter`]; a filter with no value matches on
/// field presence alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Absent,
    String(String),
    Number(f64),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub operator: String,
    pub cmp: Cmp,
    pub value: FilterValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct LimitField {
    pub name: String,
    pub limit: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub node_type: Vec<u8>,
    pub filters: Vec<Filter>,
    pub limit: i32,
    pub limit_field: LimitField,
    pub level: Vec<u16>,
    pub discard: bool,
    pub bottom: bool,
    pub id: u8,
    pub require_id: u8,
    pub cursor_id1: Vec<u8>,
}

impl Default for Match {
    fn default() -> Self {
        Self {
            node_type: Vec::new(),
            filters: Vec::new(),
            limit: -1,
            limit_field: LimitField::default(),
            level: Vec::new(),
            discard: false,
            bottom: false,
            id: 0,
            require_id: 0,
            cursor_id1: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct AllowEmbed {
    pub node_type: Vec<u8>,
    pub filters: Vec<Filter>,
}

/// `includeLicenses` is a 0..3 tri-state: 0 = none, 1 = owned, 2 = all, 3 = embed.
pub type IncludeLicenses = u8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct FetchQueryFlags {
    pub descending: bool,
    pub order_by_storage_time: bool,
    pub ignore_inactive: bool,
    pub ignore_own: bool,
    pub preserve_transient: bool,
    pub discard_root: bool,
    pub only_trigger: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchQuery {
    pub depth: i32,
    pub limit: i32,
    pub cutoff_time: u64,
    pub root_node_id1: Vec<u8>,
    pub parent_id: Vec<u8>,
    pub target_public_key: Vec<u8>,
    pub source_public_key: Vec<u8>,
    pub r#match: Vec<Match>,
    pub allow_embed: Vec<AllowEmbed>,
    pub trigger_node_id: Vec<u8>,
    pub trigger_interval: u16,
    pub flags: FetchQueryFlags,
    pub region: String,
    pub jurisdiction: String,
    pub include_licenses: IncludeLicenses,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            depth: -1,
            limit: -1,
            cutoff_time: 0,
            root_node_id1: Vec::new(),
            parent_id: Vec::new(),
            target_public_key: Vec::new(),
            source_public_key: Vec::new(),
            r#match: Vec::new(),
            allow_embed: Vec::new(),
            trigger_node_id: Vec::new(),
            trigger_interval: 0,
            flags: FetchQueryFlags::default(),
            region: String::new(),
            jurisdiction: String::new(),
            include_licenses: 0,
        }
    }
}

impl FetchQuery {
    /// `parentId` xor `rootNodeId1` must be set unless streaming with a prior
    /// `triggerNodeId` already present.
    pub fn has_valid_root(&self) -> bool {
        let has_parent = !self.parent_id.is_empty();
        let has_root = !self.root_node_id1.is_empty();
        let has_trigger = !self.trigger_node_id.is_empty();
        (has_parent ^ has_root) || has_trigger
    }

    pub fn parent_or_root(&self) -> Option<&[u8]> {
        if !self.parent_id.is_empty() {
            Some(&self.parent_id)
        } else if !self.root_node_id1.is_empty() {
            Some(&self.root_node_id1)
        } else {
            None
        }
    }
}

pub fn zero_node_id() -> NodeId1 {
    NodeId1::default()
}

pub fn zero_public_key() -> PublicKey {
    PublicKey::default()
}
