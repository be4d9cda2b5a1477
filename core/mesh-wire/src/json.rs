//! JSON wire codec (§6.2): fixed/identity binary fields (ids, public keys,
//! hashes) are hex; variable-length payload fields (`nodes[]`, `embed[]`,
//! `data`, `crdtResult.delta`) are base64; 64-bit integer fields are decimal
//! strings; `undefined`/absent fields are stripped on encode.
//!
//! Decoding infers the request variant from the presence of discriminating
//! keys, in the precedence order fixed by §4.1, and fails with
//! `WireError::IndeterminateVariant` if nothing matches.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use mesh_types::{
    AllowEmbed,
    Cmp,
    CrdtResult,
    FetchCRDT,
    FetchQuery,
    FetchQueryFlags,
    FetchRequest,
    FetchResponse,
    FetchResult,
    Filter,
    FilterValue,
    GenericMessageRequest,
    GenericMessageResponse,
    LimitField,
    Match,
    ReadBlobRequest,
    ReadBlobResponse,
    RequestEnvelope,
    Status,
    StoreRequest,
    StoreResponse,
    UnsubscribeRequest,
    UnsubscribeResponse,
    WriteBlobRequest,
    WriteBlobResponse,
};
use serde_json::{json, Value};

use crate::error::WireError;

fn hex_enc(b: &[u8]) -> String {
    hex::encode(b)
}

fn hex_dec(v: &Value, key: &str) -> Result<Vec<u8>, WireError> {
    match v.get(key).and_then(Value::as_str) {
        Some(s) => hex::decode(s).map_err(|e| WireError::MalformedBody(e.to_string())),
        None => Ok(Vec::new()),
    }
}

fn b64_dec(v: &Value, key: &str) -> Result<Vec<u8>, WireError> {
    match v.get(key).and_then(Value::as_str) {
        Some(s) => B64
            .decode(s)
            .map_err(|e| WireError::MalformedBody(e.to_string())),
        None => Ok(Vec::new()),
    }
}

fn hex_array_dec(v: &Value, key: &str) -> Result<Vec<Vec<u8>>, WireError> {
    match v.get(key).and_then(Value::as_array) {
        Some(arr) => arr
            .iter()
            .map(|x| {
                let s = x.as_str().unwrap_or_default();
                hex::decode(s).map_err(|e| WireError::MalformedBody(e.to_string()))
            })
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn b64_array_dec(v: &Value, key: &str) -> Result<Vec<Vec<u8>>, WireError> {
    match v.get(key).and_then(Value::as_array) {
        Some(arr) => arr
            .iter()
            .map(|x| {
                let s = x.as_str().unwrap_or_default();
                B64.decode(s).map_err(|e| WireError::MalformedBody(e.to_string()))
            })
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn i64_field(v: &Value, key: &str) -> i64 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn u64_field(v: &Value, key: &str) -> u64 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

fn bool_field(v: &Value, key: &str) -> bool {
    v.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn filter_value_to_json(value: &FilterValue) -> Value {
    match value {
        FilterValue::Absent => Value::Null,
        FilterValue::String(s) => Value::String(s.clone()),
        FilterValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        FilterValue::Bytes(b) => Value::Array(b.iter().map(|x| json!(x)).collect()),
    }
}

fn filter_value_from_json(v: &Value) -> FilterValue {
    match v {
        Value::Null => FilterValue::Absent,
        Value::String(s) => FilterValue::String(s.clone()),
        Value::Number(n) => FilterValue::Number(n.as_f64().unwrap_or_default()),
        Value::Array(items) => {
            let bytes: Option<Vec<u8>> = items
                .iter()
                .map(|x| x.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            bytes.map(FilterValue::Bytes).unwrap_or(FilterValue::Absent)
        },
        _ => FilterValue::Absent,
    }
}

fn filter_to_json(f: &Filter) -> Value {
    json!({
        "field": f.field,
        "operator": f.operator,
        "cmp": f.cmp.as_wire_str(),
        "value": filter_value_to_json(&f.value),
    })
}

fn filter_from_json(v: &Value) -> Result<Filter, WireError> {
    let cmp_str = str_field(v, "cmp");
    let cmp = Cmp::from_wire_str(&cmp_str)
        .ok_or_else(|| WireError::MalformedBody(format!("unknown cmp {cmp_str}")))?;
    Ok(Filter {
        field: str_field(v, "field"),
        operator: str_field(v, "operator"),
        cmp,
        value: filter_value_from_json(v.get("value").unwrap_or(&Value::Null)),
    })
}

fn filters_to_json(filters: &[Filter]) -> Value {
    Value::Array(filters.iter().map(filter_to_json).collect())
}

fn filters_from_json(v: &Value, key: &str) -> Result<Vec<Filter>, WireError> {
    match v.get(key).and_then(Value::as_array) {
        Some(arr) => arr.iter().map(filter_from_json).collect(),
        None => Ok(Vec::new()),
    }
}

fn match_to_json(m: &Match) -> Value {
    json!({
        "nodeType": hex_enc(&m.node_type),
        "filters": filters_to_json(&m.filters),
        "limit": m.limit,
        "limitField": { "name": m.limit_field.name, "limit": m.limit_field.limit },
        "level": m.level,
        "discard": m.discard,
        "bottom": m.bottom,
        "id": m.id,
        "requireId": m.require_id,
        "cursorId1": hex_enc(&m.cursor_id1),
    })
}

fn match_from_json(v: &Value) -> Result<Match, WireError> {
    let limit_field = v.get("limitField").cloned().unwrap_or(Value::Null);
    Ok(Match {
        node_type: hex_dec(v, "nodeType")?,
        filters: filters_from_json(v, "filters")?,
        limit: v.get("limit").and_then(Value::as_i64).unwrap_or(-1) as i32,
        limit_field: LimitField {
            name: str_field(&limit_field, "name"),
            limit: limit_field.get("limit").and_then(Value::as_i64).unwrap_or(-1) as i32,
        },
        level: v
            .get("level")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|x| x.as_u64().map(|n| n as u16)).collect())
            .unwrap_or_default(),
        discard: bool_field(v, "discard"),
        bottom: bool_field(v, "bottom"),
        id: v.get("id").and_then(Value::as_u64).unwrap_or(0) as u8,
        require_id: v.get("requireId").and_then(Value::as_u64).unwrap_or(0) as u8,
        cursor_id1: hex_dec(v, "cursorId1")?,
    })
}

fn allow_embed_to_json(e: &AllowEmbed) -> Value {
    json!({
        "nodeType": hex_enc(&e.node_type),
        "filters": filters_to_json(&e.filters),
    })
}

fn allow_embed_from_json(v: &Value) -> Result<AllowEmbed, WireError> {
    Ok(AllowEmbed {
        node_type: hex_dec(v, "nodeType")?,
        filters: filters_from_json(v, "filters")?,
    })
}

fn fetch_query_to_json(q: &FetchQuery) -> Value {
    json!({
        "depth": q.depth,
        "limit": q.limit,
        "cutoffTime": q.cutoff_time.to_string(),
        "rootNodeId1": hex_enc(&q.root_node_id1),
        "discardRoot": q.flags.discard_root,
        "parentId": hex_enc(&q.parent_id),
        "targetPublicKey": hex_enc(&q.target_public_key),
        "sourcePublicKey": hex_enc(&q.source_public_key),
        "match": q.r#match.iter().map(match_to_json).collect::<Vec<_>>(),
        "embed": q.allow_embed.iter().map(allow_embed_to_json).collect::<Vec<_>>(),
        "triggerNodeId": hex_enc(&q.trigger_node_id),
        "triggerInterval": q.trigger_interval,
        "onlyTrigger": q.flags.only_trigger,
        "descending": q.flags.descending,
        "orderByStorageTime": q.flags.order_by_storage_time,
        "ignoreInactive": q.flags.ignore_inactive,
        "ignoreOwn": q.flags.ignore_own,
        "preserveTransient": q.flags.preserve_transient,
        "region": q.region,
        "jurisdiction": q.jurisdiction,
        "includeLicenses": q.include_licenses,
    })
}

fn fetch_query_from_json(v: &Value) -> Result<FetchQuery, WireError> {
    let matches = match v.get("match").and_then(Value::as_array) {
        Some(arr) => arr.iter().map(match_from_json).collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let embeds = match v.get("embed").and_then(Value::as_array) {
        Some(arr) => arr
            .iter()
            .map(allow_embed_from_json)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(FetchQuery {
        depth: v.get("depth").and_then(Value::as_i64).unwrap_or(-1) as i32,
        limit: v.get("limit").and_then(Value::as_i64).unwrap_or(-1) as i32,
        cutoff_time: u64_field(v, "cutoffTime"),
        root_node_id1: hex_dec(v, "rootNodeId1")?,
        parent_id: hex_dec(v, "parentId")?,
        target_public_key: hex_dec(v, "targetPublicKey")?,
        source_public_key: hex_dec(v, "sourcePublicKey")?,
        r#match: matches,
        allow_embed: embeds,
        trigger_node_id: hex_dec(v, "triggerNodeId")?,
        trigger_interval: v.get("triggerInterval").and_then(Value::as_u64).unwrap_or(0) as u16,
        flags: FetchQueryFlags {
            descending: bool_field(v, "descending"),
            order_by_storage_time: bool_field(v, "orderByStorageTime"),
            ignore_inactive: bool_field(v, "ignoreInactive"),
            ignore_own: bool_field(v, "ignoreOwn"),
            preserve_transient: bool_field(v, "preserveTransient"),
            discard_root: bool_field(v, "discardRoot"),
            only_trigger: bool_field(v, "onlyTrigger"),
        },
        region: str_field(v, "region"),
        jurisdiction: str_field(v, "jurisdiction"),
        include_licenses: v.get("includeLicenses").and_then(Value::as_u64).unwrap_or(0) as u8,
    })
}

fn fetch_crdt_to_json(c: &FetchCRDT) -> Value {
    json!({
        "algo": c.algo,
        "conf": c.conf,
        "msgId": hex_enc(&c.msg_id),
        "reverse": c.reverse,
        "head": c.head,
        "tail": c.tail,
        "cursorId1": hex_enc(&c.cursor_id1),
        "cursorIndex": c.cursor_index,
    })
}

fn fetch_crdt_from_json(v: &Value) -> Result<FetchCRDT, WireError> {
    Ok(FetchCRDT {
        algo: str_field(v, "algo"),
        conf: str_field(v, "conf"),
        msg_id: hex_dec(v, "msgId")?,
        reverse: bool_field(v, "reverse"),
        head: v.get("head").and_then(Value::as_i64).unwrap_or(0) as i32,
        tail: v.get("tail").and_then(Value::as_i64).unwrap_or(0) as i32,
        cursor_id1: hex_dec(v, "cursorId1")?,
        cursor_index: v.get("cursorIndex").and_then(Value::as_i64).unwrap_or(0) as i32,
    })
}

fn status_from_json(v: &Value) -> Result<Status, WireError> {
    let raw = v.get("status").and_then(Value::as_u64).unwrap_or(255) as u8;
    Status::from_u8(raw).ok_or(WireError::UnknownStatus(raw))
}

fn strip_nulls(mut v: Value) -> Value {
    if let Value::Object(ref mut map) = v {
        let keys: Vec<String> = map
            .iter()
            .filter(|(_, val)| val.is_null())
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            map.remove(&k);
        }
    }
    v
}

pub fn encode(envelope: &RequestEnvelope) -> Value {
    let body = match envelope {
        RequestEnvelope::FetchRequest(r) => json!({
            "query": fetch_query_to_json(&r.query),
            "crdt": fetch_crdt_to_json(&r.crdt),
        }),
        RequestEnvelope::FetchResponse(r) => json!({
            "status": r.status as u8,
            "result": {
                "nodes": r.result.nodes.iter().map(|n| B64.encode(n)).collect::<Vec<_>>(),
                "embed": r.result.embed.iter().map(|n| B64.encode(n)).collect::<Vec<_>>(),
            },
            "crdtResult": { "delta": B64.encode(&r.crdt_result.delta) },
            "seq": r.seq,
            "endSeq": r.end_seq,
            "rowCount": r.row_count,
            "error": r.error,
        }),
        RequestEnvelope::StoreRequest(r) => json!({
            "nodes": r.nodes.iter().map(|n| B64.encode(n)).collect::<Vec<_>>(),
            "sourcePublicKey": hex_enc(&r.source_public_key),
            "targetPublicKey": hex_enc(&r.target_public_key),
            "muteMsgIds": r.mute_msg_ids.iter().map(|m| hex_enc(m)).collect::<Vec<_>>(),
            "preserveTransient": r.preserve_transient,
            "batchId": r.batch_id,
            "hasMore": r.has_more,
        }),
        RequestEnvelope::StoreResponse(r) => json!({
            "status": r.status as u8,
            "storedId1s": r.stored_id1_list.iter().map(|n| hex_enc(n)).collect::<Vec<_>>(),
            "missingBlobId1List": r.missing_blob_id1_list.iter().map(|n| hex_enc(n)).collect::<Vec<_>>(),
            "missingBlobSizes": r.missing_blob_sizes.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            "error": r.error,
        }),
        RequestEnvelope::UnsubscribeRequest(r) => json!({
            "originalMsgId": hex_enc(&r.original_msg_id),
            "targetPublicKey": hex_enc(&r.target_public_key),
        }),
        RequestEnvelope::UnsubscribeResponse(r) => json!({
            "status": r.status as u8,
            "error": r.error,
        }),
        RequestEnvelope::WriteBlobRequest(r) => json!({
            "nodeId1": hex_enc(&r.node_id1),
            "pos": r.pos.to_string(),
            "data": B64.encode(&r.data),
            "sourcePublicKey": hex_enc(&r.source_public_key),
            "targetPublicKey": hex_enc(&r.target_public_key),
            "muteMsgIds": r.mute_msg_ids.iter().map(|m| hex_enc(m)).collect::<Vec<_>>(),
        }),
        RequestEnvelope::WriteBlobResponse(r) => json!({
            "status": r.status as u8,
            "currentLength": r.current_length.to_string(),
            "error": r.error,
        }),
        RequestEnvelope::ReadBlobRequest(r) => json!({
            "nodeId1": hex_enc(&r.node_id1),
            "pos": r.pos.to_string(),
            "length": r.length,
            "targetPublicKey": hex_enc(&r.target_public_key),
            "sourcePublicKey": hex_enc(&r.source_public_key),
        }),
        RequestEnvelope::ReadBlobResponse(r) => json!({
            "status": r.status as u8,
            "data": B64.encode(&r.data),
            "seq": r.seq,
            "endSeq": r.end_seq,
            "blobLength": r.blob_length.to_string(),
            "error": r.error,
        }),
        RequestEnvelope::GenericMessageRequest(r) => json!({
            "action": r.action,
            "sourcePublicKey": hex_enc(&r.source_public_key),
            "data": B64.encode(&r.data),
        }),
        RequestEnvelope::GenericMessageResponse(r) => json!({
            "status": r.status as u8,
            "data": B64.encode(&r.data),
            "error": r.error,
        }),
    };
    strip_nulls(body)
}

/// Infers the variant from discriminating keys, in this precedence:
/// `query`→Fetch, `result`→FetchResponse, `nodes`→Store,
/// `storedId1s`→StoreResponse, `originalMsgId`→Unsubscribe,
/// `nodeId1 && data`→WriteBlob, `currentLength`→WriteBlobResponse,
/// `nodeId1 && length`→ReadBlob, `blobLength`→ReadBlobResponse,
/// `action`→Generic, `status && data`→GenericResponse,
/// `status && error`→UnsubscribeResponse.
pub fn decode(v: &Value) -> Result<RequestEnvelope, WireError> {
    let obj = v.as_object().ok_or(WireError::IndeterminateVariant)?;
    let has = |k: &str| obj.contains_key(k);

    if has("query") {
        return Ok(RequestEnvelope::FetchRequest(FetchRequest {
            query: fetch_query_from_json(v.get("query").unwrap())?,
            crdt: v
                .get("crdt")
                .map(fetch_crdt_from_json)
                .transpose()?
                .unwrap_or_default(),
        }));
    }
    if has("result") {
        let result = v.get("result").cloned().unwrap_or(Value::Null);
        let crdt_result = v.get("crdtResult").cloned().unwrap_or(Value::Null);
        return Ok(RequestEnvelope::FetchResponse(FetchResponse {
            status: status_from_json(v)?,
            result: FetchResult {
                nodes: b64_array_dec(&result, "nodes")?,
                embed: b64_array_dec(&result, "embed")?,
            },
            crdt_result: CrdtResult {
                delta: b64_dec(&crdt_result, "delta")?,
            },
            seq: v.get("seq").and_then(Value::as_u64).unwrap_or(0) as u16,
            end_seq: v.get("endSeq").and_then(Value::as_u64).unwrap_or(0) as u16,
            row_count: v.get("rowCount").and_then(Value::as_u64).unwrap_or(0) as u16,
            error: str_field(v, "error"),
        }));
    }
    if has("nodes") {
        return Ok(RequestEnvelope::StoreRequest(StoreRequest {
            nodes: b64_array_dec(v, "nodes")?,
            source_public_key: hex_dec(v, "sourcePublicKey")?,
            target_public_key: hex_dec(v, "targetPublicKey")?,
            mute_msg_ids: hex_array_dec(v, "muteMsgIds")?,
            preserve_transient: bool_field(v, "preserveTransient"),
            batch_id: v.get("batchId").and_then(Value::as_u64).unwrap_or(0) as u32,
            has_more: bool_field(v, "hasMore"),
        }));
    }
    if has("storedId1s") {
        return Ok(RequestEnvelope::StoreResponse(StoreResponse {
            status: status_from_json(v)?,
            stored_id1_list: hex_array_dec(v, "storedId1s")?,
            missing_blob_id1_list: hex_array_dec(v, "missingBlobId1List")?,
            missing_blob_sizes: match v.get("missingBlobSizes").and_then(Value::as_array) {
                Some(arr) => arr
                    .iter()
                    .map(|x| match x {
                        Value::String(s) => s.parse().unwrap_or_default(),
                        Value::Number(n) => n.as_i64().unwrap_or_default(),
                        _ => 0,
                    })
                    .collect(),
                None => Vec::new(),
            },
            error: str_field(v, "error"),
        }));
    }
    if has("originalMsgId") {
        return Ok(RequestEnvelope::UnsubscribeRequest(UnsubscribeRequest {
            original_msg_id: hex_dec(v, "originalMsgId")?,
            target_public_key: hex_dec(v, "targetPublicKey")?,
        }));
    }
    if has("nodeId1") && has("data") {
        return Ok(RequestEnvelope::WriteBlobRequest(WriteBlobRequest {
            node_id1: hex_dec(v, "nodeId1")?,
            pos: u64_field(v, "pos"),
            data: b64_dec(v, "data")?,
            source_public_key: hex_dec(v, "sourcePublicKey")?,
            target_public_key: hex_dec(v, "targetPublicKey")?,
            mute_msg_ids: hex_array_dec(v, "muteMsgIds")?,
        }));
    }
    if has("currentLength") {
        return Ok(RequestEnvelope::WriteBlobResponse(WriteBlobResponse {
            status: status_from_json(v)?,
            current_length: u64_field(v, "currentLength"),
            error: str_field(v, "error"),
        }));
    }
    if has("nodeId1") && has("length") {
        return Ok(RequestEnvelope::ReadBlobRequest(ReadBlobRequest {
            node_id1: hex_dec(v, "nodeId1")?,
            pos: u64_field(v, "pos"),
            length: v.get("length").and_then(Value::as_u64).unwrap_or(0) as u32,
            target_public_key: hex_dec(v, "targetPublicKey")?,
            source_public_key: hex_dec(v, "sourcePublicKey")?,
        }));
    }
    if has("blobLength") {
        return Ok(RequestEnvelope::ReadBlobResponse(ReadBlobResponse {
            status: status_from_json(v)?,
            data: b64_dec(v, "data")?,
            seq: v.get("seq").and_then(Value::as_u64).unwrap_or(0) as u16,
            end_seq: v.get("endSeq").and_then(Value::as_u64).unwrap_or(0) as u16,
            blob_length: u64_field(v, "blobLength"),
            error: str_field(v, "error"),
        }));
    }
    if has("action") {
        return Ok(RequestEnvelope::GenericMessageRequest(GenericMessageRequest {
            action: str_field(v, "action"),
            source_public_key: hex_dec(v, "sourcePublicKey")?,
            data: b64_dec(v, "data")?,
        }));
    }
    if has("status") && has("data") {
        return Ok(RequestEnvelope::GenericMessageResponse(GenericMessageResponse {
            status: status_from_json(v)?,
            data: b64_dec(v, "data")?,
            error: str_field(v, "error"),
        }));
    }
    if has("status") && has("error") {
        return Ok(RequestEnvelope::UnsubscribeResponse(UnsubscribeResponse {
            status: status_from_json(v)?,
            error: str_field(v, "error"),
        }));
    }

    Err(WireError::IndeterminateVariant)
}
