use std::collections::HashMap;

use mesh_certs::{CertChain, DecodedCert};
use mesh_node::{NodeFactory, NodeKind, NodeParams};
use mesh_storage::client::RawChannel;
use mesh_storage::{GetEvent, StorageClient};
use mesh_types::{
    Clock, Cmp, FetchQuery, Filter, FilterValue, Match, NodeId1, PublicKey, SignatureOffloader,
    StoreRequest,
};
use serde_json::Value;

use crate::error::ServiceError;

fn pack(props: &mesh_types::NodeProps, signature: &[u8]) -> Vec<u8> {
    let mut image = props.image.0.clone();
    image.extend_from_slice(signature);
    image
}

fn owner_filter(public_key: &PublicKey) -> Filter {
    Filter {
        field: "owner".to_string(),
        operator: "eq".to_string(),
        cmp: Cmp::Eq,
        value: FilterValue::Bytes(public_key.0.to_vec()),
    }
}

/// Checks the remote's AuthCert's declared region/jurisdiction against this
/// connection's config via the same lock-constraint machinery `CertChain`
/// already uses for node matching (§4.10 step 5).
pub fn check_region_jurisdiction(
    cert_chain: &CertChain,
    cert: &DecodedCert,
    expected_region: &str,
    expected_jurisdiction: &str,
) -> Result<(), ServiceError> {
    let mut target = HashMap::new();
    target.insert("region".to_string(), Value::String(expected_region.to_string()));
    target.insert("jurisdiction".to_string(), Value::String(expected_jurisdiction.to_string()));
    let (ok, reason) = cert_chain.validate(cert, &target);
    if ok {
        Ok(())
    } else {
        Err(ServiceError::RegionMismatch(reason.unwrap_or_default()))
    }
}

/// Caches a verified AuthCert image as a CarrierNode so that re-validating
/// the same image doesn't re-store it: `{ owner: self, parentId: H(image),
/// refId: H(image), expireTime: now+3600 }` (§6.4). Fetches first; stores
/// and refetches only on a miss. A still-absent cert after the refetch means
/// it was destroyed (a destroy-node already landed on top of it) and the
/// handshake must fail (§7: "authCert destroyed (carrier absent)").
pub async fn validate_auth_cert<R, C>(
    storage: &StorageClient<R>,
    factory: &NodeFactory<C>,
    offloader: &dyn SignatureOffloader,
    self_public_key: &PublicKey,
    image: &[u8],
) -> Result<(), ServiceError>
where
    R: RawChannel,
    C: Clock,
{
    let ref_id = offloader.hash(image);

    if carrier_node_exists(storage, self_public_key, &ref_id).await {
        return Ok(());
    }

    let params = NodeParams {
        owner: Some(*self_public_key),
        parent_id: Some(NodeId1(ref_id)),
        ref_id: ref_id.to_vec(),
        body: image.to_vec(),
        expire_time: Some(factory.now_unix() + 3600),
        ..Default::default()
    };
    let (props, signature) = factory
        .build(NodeKind::Carrier, params, Some(self_public_key), offloader)
        .await?;
    let request = StoreRequest {
        nodes: vec![pack(&props, &signature)],
        source_public_key: self_public_key.0.to_vec(),
        target_public_key: Vec::new(),
        mute_msg_ids: Vec::new(),
        preserve_transient: false,
        batch_id: 0,
        has_more: false,
    };
    let response = storage.store(request);
    match response.once_any().await {
        GetEvent::Reply(r) if r.status.is_ok() => {}
        _ => return Err(ServiceError::CertDestroyed),
    }

    if carrier_node_exists(storage, self_public_key, &ref_id).await {
        Ok(())
    } else {
        Err(ServiceError::CertDestroyed)
    }
}

async fn carrier_node_exists<R: RawChannel>(
    storage: &StorageClient<R>,
    self_public_key: &PublicKey,
    ref_id: &[u8; 32],
) -> bool {
    let query = FetchQuery {
        depth: 1,
        parent_id: ref_id.to_vec(),
        r#match: vec![Match { node_type: b"carrier".to_vec(), filters: vec![owner_filter(self_public_key)], ..Match::default() }],
        ..FetchQuery::default()
    };
    let response = storage.fetch(mesh_types::FetchRequest { query, crdt: mesh_types::FetchCRDT::default() });
    match response.once_any().await {
        GetEvent::Reply(r) => r.status.is_ok() && !r.result.nodes.is_empty(),
        _ => false,
    }
}
