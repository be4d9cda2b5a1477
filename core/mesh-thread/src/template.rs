use std::collections::HashMap;

use mesh_node::NodeParams;
use mesh_template::Var;
use mesh_types::{AllowEmbed, FetchCRDT, FetchQuery, FetchQueryFlags, Match, NodeFlags, NodeId1, PublicKey};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ThreadError;

/// A ThreadTemplate's raw `query`/`crdt`/`post`/`postLicense` trees, still
/// carrying `${name:type:default}` tokens. Substituted once per `Thread`
/// construction against that thread's variable bindings.
#[derive(Clone, Debug, Default)]
pub struct ThreadTemplate {
    pub query: Value,
    pub crdt: Value,
    pub post: HashMap<String, Value>,
    pub post_license: HashMap<String, Value>,
}

pub fn substitute_query(template: &Value, vars: &HashMap<String, Var>) -> Result<FetchQuery, ThreadError> {
    let substituted = mesh_template::substitute(template, vars)?.unwrap_or(Value::Null);
    if substituted.is_null() {
        return Ok(FetchQuery::default());
    }
    Ok(serde_json::from_value(substituted)?)
}

pub fn substitute_crdt(template: &Value, vars: &HashMap<String, Var>) -> Result<FetchCRDT, ThreadError> {
    let substituted = mesh_template::substitute(template, vars)?.unwrap_or(Value::Null);
    if substituted.is_null() {
        return Ok(FetchCRDT::default());
    }
    Ok(serde_json::from_value(substituted)?)
}

pub fn substitute_value(template: &Value, vars: &HashMap<String, Var>) -> Result<Value, ThreadError> {
    Ok(mesh_template::substitute(template, vars)?.unwrap_or(Value::Null))
}

/// Per-call or thread-default overrides layered on top of a template's
/// substituted `FetchQuery`. `None` means "not set at this layer"; the
/// byte-string fields additionally treat an explicitly empty vec as unset
/// so a lower-precedence layer can still fill it in.
#[derive(Clone, Debug, Default)]
pub struct FetchQueryOverride {
    pub depth: Option<i32>,
    pub limit: Option<i32>,
    pub cutoff_time: Option<u64>,
    pub root_node_id1: Option<Vec<u8>>,
    pub parent_id: Option<Vec<u8>>,
    pub target_public_key: Option<Vec<u8>>,
    pub source_public_key: Option<Vec<u8>>,
    pub r#match: Option<Vec<Match>>,
    pub allow_embed: Option<Vec<AllowEmbed>>,
    pub trigger_node_id: Option<Vec<u8>>,
    pub trigger_interval: Option<u16>,
    pub flags: Option<FetchQueryFlags>,
    pub region: Option<String>,
    pub jurisdiction: Option<String>,
    pub include_licenses: Option<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct FetchCrdtOverride {
    pub algo: Option<String>,
    pub conf: Option<String>,
    pub msg_id: Option<Vec<u8>>,
    pub reverse: Option<bool>,
    pub head: Option<i32>,
    pub tail: Option<i32>,
    pub cursor_id1: Option<Vec<u8>>,
    pub cursor_index: Option<i32>,
}

fn merge_bytes(layers: [&[u8]; 3]) -> Vec<u8> {
    layers
        .into_iter()
        .find(|v| !v.is_empty())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

fn pick<T: Clone>(layers: [&Option<T>; 2], base: T) -> T {
    for layer in layers {
        if let Some(v) = layer {
            return v.clone();
        }
    }
    base
}

/// Merges query overrides onto a template-substituted base, highest
/// precedence first: `call`, then `defaults`, then `template`.
pub fn merge_query(template: &FetchQuery, defaults: &FetchQueryOverride, call: &FetchQueryOverride) -> FetchQuery {
    FetchQuery {
        depth: pick([&call.depth, &defaults.depth], template.depth),
        limit: pick([&call.limit, &defaults.limit], template.limit),
        cutoff_time: pick([&call.cutoff_time, &defaults.cutoff_time], template.cutoff_time),
        root_node_id1: merge_bytes([
            call.root_node_id1.as_deref().unwrap_or(&[]),
            defaults.root_node_id1.as_deref().unwrap_or(&[]),
            &template.root_node_id1,
        ]),
        parent_id: merge_bytes([
            call.parent_id.as_deref().unwrap_or(&[]),
            defaults.parent_id.as_deref().unwrap_or(&[]),
            &template.parent_id,
        ]),
        target_public_key: merge_bytes([
            call.target_public_key.as_deref().unwrap_or(&[]),
            defaults.target_public_key.as_deref().unwrap_or(&[]),
            &template.target_public_key,
        ]),
        source_public_key: merge_bytes([
            call.source_public_key.as_deref().unwrap_or(&[]),
            defaults.source_public_key.as_deref().unwrap_or(&[]),
            &template.source_public_key,
        ]),
        r#match: pick([&call.r#match, &defaults.r#match], template.r#match.clone()),
        allow_embed: pick([&call.allow_embed, &defaults.allow_embed], template.allow_embed.clone()),
        trigger_node_id: merge_bytes([
            call.trigger_node_id.as_deref().unwrap_or(&[]),
            defaults.trigger_node_id.as_deref().unwrap_or(&[]),
            &template.trigger_node_id,
        ]),
        trigger_interval: pick([&call.trigger_interval, &defaults.trigger_interval], template.trigger_interval),
        flags: pick([&call.flags, &defaults.flags], template.flags.clone()),
        region: pick([&call.region, &defaults.region], template.region.clone()),
        jurisdiction: pick([&call.jurisdiction, &defaults.jurisdiction], template.jurisdiction.clone()),
        include_licenses: pick([&call.include_licenses, &defaults.include_licenses], template.include_licenses),
    }
}

/// An override layer for a `post`/`postEdit`/`postReaction` call. Mirrors
/// `mesh_node::NodeParams` but every field is optional so the three
/// precedence layers (call, thread defaults, template) can be merged the
/// same way query overrides are.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DataParamsOverride {
    pub owner: Option<PublicKey>,
    pub parent_id: Option<NodeId1>,
    pub creation_time: Option<u64>,
    pub expire_time: Option<u64>,
    pub node_type: Option<Vec<u8>>,
    pub flags: Option<NodeFlags>,
    pub license_min_distance: Option<u8>,
    pub license_max_distance: Option<u8>,
    pub data_config: Option<u32>,
    pub ref_id: Option<Vec<u8>>,
    pub body: Option<Vec<u8>>,
}

pub fn substitute_data_params(template: &Value, vars: &HashMap<String, Var>) -> Result<DataParamsOverride, ThreadError> {
    let substituted = mesh_template::substitute(template, vars)?.unwrap_or(Value::Null);
    if substituted.is_null() {
        return Ok(DataParamsOverride::default());
    }
    Ok(serde_json::from_value(substituted)?)
}

/// Merges three `DataParamsOverride` layers, highest precedence first, into
/// a concrete `NodeParams`. Unset fields fall back to `NodeParams::default`
/// (which `NodeFactory::build` then defaults further: creationTime, owner,
/// license expireTime).
pub fn merge_data_params(
    template: &DataParamsOverride,
    defaults: &DataParamsOverride,
    call: &DataParamsOverride,
) -> NodeParams {
    let layers = [call, defaults, template];
    NodeParams {
        owner: layers.iter().find_map(|l| l.owner),
        parent_id: layers.iter().find_map(|l| l.parent_id),
        creation_time: layers.iter().find_map(|l| l.creation_time),
        expire_time: layers.iter().find_map(|l| l.expire_time),
        node_type: layers.iter().find_map(|l| l.node_type.clone()).unwrap_or_default(),
        flags: layers.iter().find_map(|l| l.flags.clone()).unwrap_or_default(),
        license_min_distance: layers.iter().find_map(|l| l.license_min_distance).unwrap_or(0),
        license_max_distance: layers.iter().find_map(|l| l.license_max_distance).unwrap_or(0),
        data_config: layers.iter().find_map(|l| l.data_config).unwrap_or(0),
        ref_id: layers.iter().find_map(|l| l.ref_id.clone()).unwrap_or_default(),
        body: layers.iter().find_map(|l| l.body.clone()).unwrap_or_default(),
    }
}

pub fn merge_crdt(template: &FetchCRDT, defaults: &FetchCrdtOverride, call: &FetchCrdtOverride) -> FetchCRDT {
    FetchCRDT {
        algo: pick([&call.algo, &defaults.algo], template.algo.clone()),
        conf: pick([&call.conf, &defaults.conf], template.conf.clone()),
        msg_id: merge_bytes([
            call.msg_id.as_deref().unwrap_or(&[]),
            defaults.msg_id.as_deref().unwrap_or(&[]),
            &template.msg_id,
        ]),
        reverse: pick([&call.reverse, &defaults.reverse], template.reverse),
        head: pick([&call.head, &defaults.head], template.head),
        tail: pick([&call.tail, &defaults.tail], template.tail),
        cursor_id1: merge_bytes([
            call.cursor_id1.as_deref().unwrap_or(&[]),
            defaults.cursor_id1.as_deref().unwrap_or(&[]),
            &template.cursor_id1,
        ]),
        cursor_index: pick([&call.cursor_index, &defaults.cursor_index], template.cursor_index),
    }
}
