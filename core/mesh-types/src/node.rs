use serde::{Deserialize, Serialize};

use crate::ids::{NodeId1, PublicKey};

/// The `dataConfig` bit set by `postEdit`/`postReaction` helpers on the Thread.
pub const ANNOTATION_EDIT: u32 = 1 << 0;
pub const ANNOTATION_REACTION: u32 = 1 << 1;

/// An opaque, already-packed node or certificate body. The real datamodel
/// (field layout, canonical serialization) lives outside this core; we only
/// ever move these bytes around and hand them to a `SignatureOffloader`
/// (hashing, §1 OUT OF SCOPE) or a `pack()`/`load()` boundary supplied by
/// the embedder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeImage(pub Vec<u8>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    pub is_licensed: bool,
    pub is_indestructible: bool,
    pub is_special: bool,
    pub is_public: bool,
}

/// Structural properties of a node that the core needs to reason about
/// (signing, licensing, destroy semantics) without understanding the full
/// datamodel encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProps {
    pub id1: NodeId1,
    pub parent_id: NodeId1,
    pub owner: PublicKey,
    pub creation_time: u64,
    pub expire_time: Option<u64>,
    pub flags: NodeFlags,
    pub license_min_distance: u8,
    pub license_max_distance: u8,
    pub data_config: u32,
    pub ref_id: Vec<u8>,
    /// Embedder-defined node type tag (e.g. Data/License/Carrier), carried
    /// opaquely so `matchNodeCert`/`matchSignCert` can compare it against a
    /// cert's accepted-type list without this core knowing the datamodel.
    pub node_type: Vec<u8>,
    pub image: NodeImage,
}

impl NodeProps {
    pub fn is_destructible(&self) -> bool {
        !self.flags.is_indestructible
    }
}
