/// What a Forwarder will relay from the remote side of a connection onto
/// local storage.
#[derive(Clone, Debug, Default)]
pub struct FetchPermissions {
    pub allow_node_types: Vec<Vec<u8>>,
    pub allow_read_blob: bool,
}

impl FetchPermissions {
    pub fn allows(&self, node_type: &[u8]) -> bool {
        self.allow_node_types.is_empty() || self.allow_node_types.iter().any(|t| t == node_type)
    }

    pub fn allows_query(&self, query: &mesh_types::FetchQuery) -> bool {
        query.r#match.iter().all(|m| self.allows(&m.node_type))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StorePermissions {
    pub allow_store: bool,
    pub allow_write_blob: bool,
}

/// Per-connection permission set a `Forwarder`/`Extender`/`AutoFetcher` is
/// constructed with, derived from the peer connection config (§4.9/§4.10).
#[derive(Clone, Debug, Default)]
pub struct ConnectionPermissions {
    pub fetch: FetchPermissions,
    pub store: StorePermissions,
    pub allow_embed: bool,
    pub allow_include_licenses: bool,
}
