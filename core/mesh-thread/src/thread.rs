use std::collections::HashMap;
use std::sync::Arc;

use mesh_node::{NodeFactory, NodeKind, NodeParams};
use mesh_storage::client::RawChannel;
use mesh_storage::StorageClient;
use mesh_template::Var;
use mesh_types::{
    Clock, FetchCRDT, FetchQuery, FetchRequest, NodeFlags, NodeId1, NodeProps, PublicKey,
    SignatureOffloader, Status, StoreRequest, SystemClock, ANNOTATION_EDIT, ANNOTATION_REACTION,
};

use crate::error::ThreadError;
use crate::template::{
    self, DataParamsOverride, FetchCrdtOverride, FetchQueryOverride, ThreadTemplate,
};

const SECONDS_PER_30_DAYS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_TRIGGER_INTERVAL: u16 = 60;

/// Translates a `ThreadTemplate` plus per-call parameters into a concrete
/// `FetchRequest`, and provides the `post`/`postEdit`/`postReaction`/
/// `delete`/`postLicense` helpers layered on top of a `NodeFactory` and
/// `StorageClient`.
pub struct Thread<R: RawChannel, C: Clock = SystemClock> {
    storage: Arc<StorageClient<R>>,
    factory: Arc<NodeFactory<C>>,
    template: ThreadTemplate,
    defaults_query: FetchQueryOverride,
    defaults_crdt: FetchCrdtOverride,
    defaults_post: HashMap<String, DataParamsOverride>,
    vars: HashMap<String, Var>,
}

impl<R: RawChannel, C: Clock> Thread<R, C> {
    pub fn new(
        storage: Arc<StorageClient<R>>,
        factory: Arc<NodeFactory<C>>,
        template: ThreadTemplate,
        vars: HashMap<String, Var>,
    ) -> Self {
        Self {
            storage,
            factory,
            template,
            defaults_query: FetchQueryOverride::default(),
            defaults_crdt: FetchCrdtOverride::default(),
            defaults_post: HashMap::new(),
            vars,
        }
    }

    pub fn set_query_defaults(&mut self, defaults: FetchQueryOverride) {
        self.defaults_query = defaults;
    }

    pub fn set_crdt_defaults(&mut self, defaults: FetchCrdtOverride) {
        self.defaults_crdt = defaults;
    }

    pub fn set_post_defaults(&mut self, name: impl Into<String>, defaults: DataParamsOverride) {
        self.defaults_post.insert(name.into(), defaults);
    }

    /// Opens a streaming subscription: builds the promoted `FetchRequest`,
    /// issues it, and wires the response into a dispatcher that filters
    /// `isSpecial` nodes and batches CRDT deltas per §4.7's partitioning
    /// rule.
    pub fn stream(
        &self,
        call_query: FetchQueryOverride,
        call_crdt: FetchCrdtOverride,
        decoder: Arc<dyn crate::stream::NodeDecoder>,
    ) -> Result<crate::stream::ThreadStreamHandle<R>, ThreadError> {
        let request = self.get_fetch_request(call_query, call_crdt, true)?;
        let response = self.storage.fetch(request.clone());
        Ok(crate::stream::ThreadStreamHandle::new(self.storage.clone(), response, request, decoder))
    }

    /// Merges template, thread defaults, and `call` (highest precedence)
    /// into a concrete `FetchRequest`. When `stream` is true, applies the
    /// streaming promotion rules; otherwise demotes to a one-shot query.
    pub fn get_fetch_request(
        &self,
        call_query: FetchQueryOverride,
        call_crdt: FetchCrdtOverride,
        stream: bool,
    ) -> Result<FetchRequest, ThreadError> {
        let template_query = template::substitute_query(&self.template.query, &self.vars)?;
        let template_crdt = template::substitute_crdt(&self.template.crdt, &self.vars)?;

        let mut query = template::merge_query(&template_query, &self.defaults_query, &call_query);
        let mut crdt = template::merge_crdt(&template_crdt, &self.defaults_crdt, &call_crdt);

        if stream {
            promote(&mut query, &mut crdt)?;
        } else {
            demote(&mut query);
        }

        Ok(FetchRequest { query, crdt })
    }

    /// Builds DataParams from `post[name]` (template) + thread defaults +
    /// `params` (call), signs, stores, and returns the stored node.
    pub async fn post(
        &self,
        name: &str,
        params: DataParamsOverride,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Result<NodeProps, ThreadError> {
        let merged = self.merge_post_params(name, params)?;
        self.build_sign_and_store(NodeKind::Data, merged, signer, offloader).await
    }

    /// `postEdit`: sets `parentId ← nodeToEdit.id`, `expireTime ←
    /// nodeToEdit.expireTime`, and ORs `ANNOTATION_EDIT` into `dataConfig`.
    pub async fn post_edit(
        &self,
        name: &str,
        node_to_edit: &NodeProps,
        params: DataParamsOverride,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Result<NodeProps, ThreadError> {
        let mut merged = self.merge_post_params(name, params)?;
        merged.parent_id = Some(node_to_edit.id1);
        merged.expire_time = node_to_edit.expire_time;
        merged.data_config |= ANNOTATION_EDIT;
        self.build_sign_and_store(NodeKind::Data, merged, signer, offloader).await
    }

    /// `postReaction`: like `postEdit` but ORs `ANNOTATION_REACTION`.
    pub async fn post_reaction(
        &self,
        name: &str,
        node: &NodeProps,
        params: DataParamsOverride,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Result<NodeProps, ThreadError> {
        let mut merged = self.merge_post_params(name, params)?;
        merged.parent_id = Some(node.id1);
        merged.expire_time = node.expire_time;
        merged.data_config |= ANNOTATION_REACTION;
        self.build_sign_and_store(NodeKind::Data, merged, signer, offloader).await
    }

    fn merge_post_params(&self, name: &str, call: DataParamsOverride) -> Result<NodeParams, ThreadError> {
        let template_raw = self
            .template
            .post
            .get(name)
            .ok_or_else(|| ThreadError::UnknownPostTemplate(name.to_string()))?;
        let template_layer = template::substitute_data_params(template_raw, &self.vars)?;
        let defaults_layer = self.defaults_post.get(name).cloned().unwrap_or_default();
        Ok(template::merge_data_params(&template_layer, &defaults_layer, &call))
    }

    async fn build_sign_and_store(
        &self,
        kind: NodeKind,
        params: NodeParams,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Result<NodeProps, ThreadError> {
        let (props, signature) = self.factory.build(kind, params, signer, offloader).await?;
        let image = pack(&props, &signature);
        let request = StoreRequest {
            nodes: vec![image],
            source_public_key: signer.map(|k| k.0.to_vec()).unwrap_or_default(),
            target_public_key: Vec::new(),
            mute_msg_ids: Vec::new(),
            preserve_transient: false,
            batch_id: 0,
            has_more: false,
        };
        let response = self.storage.store(request);
        match response.once_any().await {
            mesh_storage::GetEvent::Reply(r) if r.status.is_ok() => Ok(props),
            mesh_storage::GetEvent::Reply(r) => Err(ThreadError::StoreFailed { status: r.status, reason: r.error }),
            mesh_storage::GetEvent::Error(reason) => Err(ThreadError::StoreFailed { status: Status::Error, reason }),
            mesh_storage::GetEvent::Cancel => Err(ThreadError::Cancelled),
        }
    }

    /// Emits up to two destroy nodes: one targeting `node` if destructible,
    /// one targeting its licenses if licensed at distance 0. Returns only
    /// those that stored successfully.
    pub async fn delete(
        &self,
        node: &NodeProps,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Vec<NodeProps> {
        let mut destroyed = Vec::new();
        let public_key = signer.copied().unwrap_or(node.owner);

        if node.is_destructible() {
            let ref_id = destroy_ref_id(offloader, b"DESTROY_NODE", &public_key, &node.id1);
            let params = NodeParams {
                parent_id: Some(node.id1),
                ref_id,
                node_type: b"destroy".to_vec(),
                ..Default::default()
            };
            if let Ok(built) = self.build_sign_and_store(NodeKind::Data, params, signer, offloader).await {
                destroyed.push(built);
            }
        }

        if node.flags.is_licensed && node.license_min_distance == 0 {
            let ref_id = destroy_ref_id(offloader, b"DESTROY_LICENSES_FOR_NODE", &public_key, &node.id1);
            let params = NodeParams {
                parent_id: Some(node.id1),
                ref_id,
                node_type: b"destroy".to_vec(),
                ..Default::default()
            };
            if let Ok(built) = self.build_sign_and_store(NodeKind::Data, params, signer, offloader).await {
                destroyed.push(built);
            }
        }

        destroyed
    }

    /// Iterates `params.targets ∪ defaults.targets ∪ template.targets`
    /// (first non-empty), computes each license's `expireTime` as the
    /// minimum of `node.expireTime`, an explicit `expireTime`, `now +
    /// validSeconds`, and `now + 30d`, signs, and stores one license per
    /// target. Returns only successfully stored licenses.
    #[allow(clippy::too_many_arguments)]
    pub async fn post_license(
        &self,
        node: &NodeProps,
        targets: &[PublicKey],
        defaults_targets: &[PublicKey],
        template_targets: &[PublicKey],
        explicit_expire_time: Option<u64>,
        valid_seconds: Option<u64>,
        now: u64,
        signer: Option<&PublicKey>,
        offloader: &dyn SignatureOffloader,
    ) -> Vec<NodeProps> {
        let chosen_targets = [targets, defaults_targets, template_targets]
            .into_iter()
            .find(|t| !t.is_empty())
            .unwrap_or(&[]);

        let mut candidates = vec![now + SECONDS_PER_30_DAYS];
        if let Some(e) = node.expire_time {
            candidates.push(e);
        }
        if let Some(e) = explicit_expire_time {
            candidates.push(e);
        }
        if let Some(secs) = valid_seconds {
            candidates.push(now + secs);
        }
        let expire_time = candidates.into_iter().min().unwrap_or(now);

        let mut stored = Vec::new();
        for target in chosen_targets {
            let params = NodeParams {
                owner: Some(*target),
                parent_id: Some(node.id1),
                expire_time: Some(expire_time),
                node_type: b"license".to_vec(),
                flags: NodeFlags { is_licensed: true, ..Default::default() },
                ..Default::default()
            };
            if let Ok(built) = self.build_sign_and_store(NodeKind::License, params, signer, offloader).await {
                stored.push(built);
            }
        }
        stored
    }
}

fn destroy_ref_id(
    offloader: &dyn SignatureOffloader,
    tag: &[u8],
    public_key: &PublicKey,
    node_id1: &NodeId1,
) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(tag.len() + 32 + 32);
    preimage.extend_from_slice(tag);
    preimage.extend_from_slice(public_key.as_bytes());
    preimage.extend_from_slice(node_id1.as_bytes());
    offloader.hash(&preimage).to_vec()
}

fn pack(props: &NodeProps, signature: &[u8]) -> Vec<u8> {
    let mut image = props.image.0.clone();
    image.extend_from_slice(signature);
    image
}

fn promote(query: &mut FetchQuery, crdt: &mut FetchCRDT) -> Result<(), ThreadError> {
    let original_interval_was_zero = query.trigger_interval == 0;
    if query.trigger_node_id.is_empty() && original_interval_was_zero {
        query.trigger_node_id = query.parent_id.clone();
    }
    if query.trigger_interval == 0 {
        query.trigger_interval = DEFAULT_TRIGGER_INTERVAL;
    }
    crdt.msg_id.clear();
    if query.trigger_node_id.is_empty() && original_interval_was_zero {
        return Err(ThreadError::NoTrigger);
    }
    Ok(())
}

fn demote(query: &mut FetchQuery) {
    query.trigger_node_id.clear();
    query.trigger_interval = 0;
    query.flags.only_trigger = false;
}
