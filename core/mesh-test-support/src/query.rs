use mesh_types::{Cmp, Filter, FilterValue, Match, PublicKey};

/// An `owner == public_key` filter, the shape used throughout the core for
/// ownership-scoped fetches (carrier nodes, self-owned license lookups, ...).
pub fn owner_filter(public_key: &PublicKey) -> Filter {
    Filter {
        field: "owner".to_string(),
        operator: "eq".to_string(),
        cmp: Cmp::Eq,
        value: FilterValue::Bytes(public_key.0.to_vec()),
    }
}

/// A match on a node type with no filters, for tests that just want "any
/// node of this type".
pub fn match_type(node_type: &str) -> Match {
    Match { node_type: node_type.as_bytes().to_vec(), ..Match::default() }
}

/// A match on a node type plus an extra filter list.
pub fn match_type_with_filters(node_type: &str, filters: Vec<Filter>) -> Match {
    Match { node_type: node_type.as_bytes().to_vec(), filters, ..Match::default() }
}
