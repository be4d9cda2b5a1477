use mesh_types::{NodeFlags, NodeId1, PublicKey};

/// Which node this builds. Only affects the defaults `NodeFactory::build`
/// applies before packing: a `License` gets a default `expireTime` and a
/// default node type tag when the caller didn't set one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Data,
    License,
    Carrier,
}

impl NodeKind {
    pub(crate) fn default_type_tag(self) -> &'static [u8] {
        match self {
            NodeKind::Data => b"data",
            NodeKind::License => b"license",
            NodeKind::Carrier => b"carrier",
        }
    }

    pub(crate) fn default_expire_seconds(self) -> Option<u64> {
        match self {
            NodeKind::License => Some(3600),
            NodeKind::Data | NodeKind::Carrier => None,
        }
    }
}

/// The caller-supplied half of a node's properties. `NodeFactory::build`
/// fills in `owner`/`parentId`/`creationTime`/`expireTime` defaults and
/// stamps `id1` from the packed body's hash.
#[derive(Clone, Debug, Default)]
pub struct NodeParams {
    pub owner: Option<PublicKey>,
    pub parent_id: Option<NodeId1>,
    pub creation_time: Option<u64>,
    pub expire_time: Option<u64>,
    pub node_type: Vec<u8>,
    pub flags: NodeFlags,
    pub license_min_distance: u8,
    pub license_max_distance: u8,
    pub data_config: u32,
    pub ref_id: Vec<u8>,
    pub body: Vec<u8>,
}
