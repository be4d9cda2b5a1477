//! Binary wire codec: 4-byte big-endian opcode, then a schema-defined body.
//! All integers are big-endian (the `bytes` crate's default `Buf`/`BufMut`
//! accessors already are); variable-length fields are u32-length-prefixed.

use bytes::{Buf, BufMut, Bytes, BytesMut};
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
    Opcode,
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

use crate::error::WireError;
use crate::filter_value;

struct Reader {
    buf: Bytes,
}

impl Reader {
    fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<(), WireError> {
        if self.buf.remaining() < n {
            Err(WireError::Truncated)
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn i64(&mut self) -> Result<i64, WireError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        self.need(len)?;
        Ok(self.buf.copy_to_bytes(len).to_vec())
    }

    fn string(&mut self) -> Result<String, WireError> {
        String::from_utf8(self.bytes()?).map_err(|_| WireError::InvalidUtf8)
    }

    fn bytes_array(&mut self) -> Result<Vec<Vec<u8>>, WireError> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.bytes()).collect()
    }

    fn u16_array(&mut self) -> Result<Vec<u16>, WireError> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.u16()).collect()
    }

    fn i64_array(&mut self) -> Result<Vec<i64>, WireError> {
        let n = self.u32()? as usize;
        (0..n).map(|_| self.i64()).collect()
    }
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn put_bytes_array(buf: &mut BytesMut, items: &[Vec<u8>]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        put_bytes(buf, item);
    }
}

fn put_u16_array(buf: &mut BytesMut, items: &[u16]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        buf.put_u16(*item);
    }
}

fn put_i64_array(buf: &mut BytesMut, items: &[i64]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        buf.put_i64(*item);
    }
}

fn write_filter(buf: &mut BytesMut, f: &Filter) {
    put_string(buf, &f.field);
    put_string(buf, &f.operator);
    put_string(buf, f.cmp.as_wire_str());
    put_string(buf, &filter_value::to_wire_string(&f.value));
}

fn read_filter(r: &mut Reader) -> Result<Filter, WireError> {
    let field = r.string()?;
    let operator = r.string()?;
    let cmp_str = r.string()?;
    let cmp = Cmp::from_wire_str(&cmp_str)
        .ok_or_else(|| WireError::MalformedBody(format!("unknown cmp {cmp_str}")))?;
    let value_str = r.string()?;
    let value = filter_value::from_wire_string(&value_str)?;
    Ok(Filter {
        field,
        operator,
        cmp,
        value,
    })
}

fn write_filters(buf: &mut BytesMut, filters: &[Filter]) {
    buf.put_u32(filters.len() as u32);
    for f in filters {
        write_filter(buf, f);
    }
}

fn read_filters(r: &mut Reader) -> Result<Vec<Filter>, WireError> {
    let n = r.u32()? as usize;
    (0..n).map(|_| read_filter(r)).collect()
}

fn write_limit_field(buf: &mut BytesMut, lf: &LimitField) {
    put_string(buf, &lf.name);
    buf.put_i32(lf.limit);
}

fn read_limit_field(r: &mut Reader) -> Result<LimitField, WireError> {
    Ok(LimitField {
        name: r.string()?,
        limit: r.i32()?,
    })
}

fn write_match(buf: &mut BytesMut, m: &Match) {
    put_bytes(buf, &m.node_type);
    write_filters(buf, &m.filters);
    buf.put_i32(m.limit);
    write_limit_field(buf, &m.limit_field);
    put_u16_array(buf, &m.level);
    buf.put_u8(m.discard as u8);
    buf.put_u8(m.bottom as u8);
    buf.put_u8(m.id);
    buf.put_u8(m.require_id);
    put_bytes(buf, &m.cursor_id1);
}

fn read_match(r: &mut Reader) -> Result<Match, WireError> {
    Ok(Match {
        node_type: r.bytes()?,
        filters: read_filters(r)?,
        limit: r.i32()?,
        limit_field: read_limit_field(r)?,
        level: r.u16_array()?,
        discard: r.bool()?,
        bottom: r.bool()?,
        id: r.u8()?,
        require_id: r.u8()?,
        cursor_id1: r.bytes()?,
    })
}

fn write_matches(buf: &mut BytesMut, matches: &[Match]) {
    buf.put_u32(matches.len() as u32);
    for m in matches {
        write_match(buf, m);
    }
}

fn read_matches(r: &mut Reader) -> Result<Vec<Match>, WireError> {
    let n = r.u32()? as usize;
    (0..n).map(|_| read_match(r)).collect()
}

fn write_allow_embed(buf: &mut BytesMut, e: &AllowEmbed) {
    put_bytes(buf, &e.node_type);
    write_filters(buf, &e.filters);
}

fn read_allow_embed(r: &mut Reader) -> Result<AllowEmbed, WireError> {
    Ok(AllowEmbed {
        node_type: r.bytes()?,
        filters: read_filters(r)?,
    })
}

fn write_embeds(buf: &mut BytesMut, embeds: &[AllowEmbed]) {
    buf.put_u32(embeds.len() as u32);
    for e in embeds {
        write_allow_embed(buf, e);
    }
}

fn read_embeds(r: &mut Reader) -> Result<Vec<AllowEmbed>, WireError> {
    let n = r.u32()? as usize;
    (0..n).map(|_| read_allow_embed(r)).collect()
}

fn write_fetch_query(buf: &mut BytesMut, q: &FetchQuery) {
    buf.put_i32(q.depth);
    buf.put_i32(q.limit);
    buf.put_i64(q.cutoff_time as i64);
    put_bytes(buf, &q.root_node_id1);
    buf.put_u8(q.flags.discard_root as u8);
    put_bytes(buf, &q.parent_id);
    put_bytes(buf, &q.target_public_key);
    put_bytes(buf, &q.source_public_key);
    write_matches(buf, &q.r#match);
    write_embeds(buf, &q.allow_embed);
    put_bytes(buf, &q.trigger_node_id);
    buf.put_u16(q.trigger_interval);
    buf.put_u8(q.flags.only_trigger as u8);
    buf.put_u8(q.flags.descending as u8);
    buf.put_u8(q.flags.order_by_storage_time as u8);
    buf.put_u8(q.flags.ignore_inactive as u8);
    buf.put_u8(q.flags.ignore_own as u8);
    buf.put_u8(q.flags.preserve_transient as u8);
    put_string(buf, &q.region);
    put_string(buf, &q.jurisdiction);
    put_string(buf, &q.include_licenses.to_string());
}

fn read_fetch_query(r: &mut Reader) -> Result<FetchQuery, WireError> {
    let depth = r.i32()?;
    let limit = r.i32()?;
    let cutoff_time = r.i64()? as u64;
    let root_node_id1 = r.bytes()?;
    let discard_root = r.bool()?;
    let parent_id = r.bytes()?;
    let target_public_key = r.bytes()?;
    let source_public_key = r.bytes()?;
    let r#match = read_matches(r)?;
    let allow_embed = read_embeds(r)?;
    let trigger_node_id = r.bytes()?;
    let trigger_interval = r.u16()?;
    let only_trigger = r.bool()?;
    let descending = r.bool()?;
    let order_by_storage_time = r.bool()?;
    let ignore_inactive = r.bool()?;
    let ignore_own = r.bool()?;
    let preserve_transient = r.bool()?;
    let region = r.string()?;
    let jurisdiction = r.string()?;
    let include_licenses_str = r.string()?;
    let include_licenses: u8 = include_licenses_str.parse().unwrap_or(0);

    Ok(FetchQuery {
        depth,
        limit,
        cutoff_time,
        root_node_id1,
        parent_id,
        target_public_key,
        source_public_key,
        r#match,
        allow_embed,
        trigger_node_id,
        trigger_interval,
        flags: FetchQueryFlags {
            descending,
            order_by_storage_time,
            ignore_inactive,
            ignore_own,
            preserve_transient,
            discard_root,
            only_trigger,
        },
        region,
        jurisdiction,
        include_licenses,
    })
}

fn write_fetch_crdt(buf: &mut BytesMut, c: &FetchCRDT) {
    put_string(buf, &c.algo);
    put_string(buf, &c.conf);
    put_bytes(buf, &c.msg_id);
    buf.put_u8(c.reverse as u8);
    buf.put_i32(c.head);
    buf.put_i32(c.tail);
    put_bytes(buf, &c.cursor_id1);
    buf.put_i32(c.cursor_index);
}

fn read_fetch_crdt(r: &mut Reader) -> Result<FetchCRDT, WireError> {
    Ok(FetchCRDT {
        algo: r.string()?,
        conf: r.string()?,
        msg_id: r.bytes()?,
        reverse: r.bool()?,
        head: r.i32()?,
        tail: r.i32()?,
        cursor_id1: r.bytes()?,
        cursor_index: r.i32()?,
    })
}

fn write_status(buf: &mut BytesMut, s: Status) {
    buf.put_u8(s as u8);
}

fn read_status(r: &mut Reader) -> Result<Status, WireError> {
    let raw = r.u8()?;
    Status::from_u8(raw).ok_or(WireError::UnknownStatus(raw))
}

pub fn encode(envelope: &RequestEnvelope) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u32(envelope.opcode() as u32);
    match envelope {
        RequestEnvelope::FetchRequest(r) => {
            write_fetch_query(&mut buf, &r.query);
            write_fetch_crdt(&mut buf, &r.crdt);
        },
        RequestEnvelope::FetchResponse(r) => {
            write_status(&mut buf, r.status);
            put_bytes_array(&mut buf, &r.result.nodes);
            put_bytes_array(&mut buf, &r.result.embed);
            put_bytes(&mut buf, &r.crdt_result.delta);
            buf.put_u16(r.seq);
            buf.put_u16(r.end_seq);
            buf.put_u16(r.row_count);
            put_string(&mut buf, &r.error);
        },
        RequestEnvelope::StoreRequest(r) => {
            put_bytes_array(&mut buf, &r.nodes);
            put_bytes(&mut buf, &r.source_public_key);
            put_bytes(&mut buf, &r.target_public_key);
            put_bytes_array(&mut buf, &r.mute_msg_ids);
            buf.put_u8(r.preserve_transient as u8);
            buf.put_u32(r.batch_id);
            buf.put_u8(r.has_more as u8);
        },
        RequestEnvelope::StoreResponse(r) => {
            write_status(&mut buf, r.status);
            put_bytes_array(&mut buf, &r.stored_id1_list);
            put_bytes_array(&mut buf, &r.missing_blob_id1_list);
            put_i64_array(&mut buf, &r.missing_blob_sizes);
            put_string(&mut buf, &r.error);
        },
        RequestEnvelope::UnsubscribeRequest(r) => {
            put_bytes(&mut buf, &r.original_msg_id);
            put_bytes(&mut buf, &r.target_public_key);
        },
        RequestEnvelope::UnsubscribeResponse(r) => {
            write_status(&mut buf, r.status);
            put_string(&mut buf, &r.error);
        },
        RequestEnvelope::WriteBlobRequest(r) => {
            put_bytes(&mut buf, &r.node_id1);
            buf.put_u64(r.pos);
            put_bytes(&mut buf, &r.data);
            put_bytes(&mut buf, &r.source_public_key);
            put_bytes(&mut buf, &r.target_public_key);
            put_bytes_array(&mut buf, &r.mute_msg_ids);
        },
        RequestEnvelope::WriteBlobResponse(r) => {
            write_status(&mut buf, r.status);
            buf.put_u64(r.current_length);
            put_string(&mut buf, &r.error);
        },
        RequestEnvelope::ReadBlobRequest(r) => {
            put_bytes(&mut buf, &r.node_id1);
            buf.put_u64(r.pos);
            buf.put_u32(r.length);
            put_bytes(&mut buf, &r.target_public_key);
            put_bytes(&mut buf, &r.source_public_key);
        },
        RequestEnvelope::ReadBlobResponse(r) => {
            write_status(&mut buf, r.status);
            put_bytes(&mut buf, &r.data);
            buf.put_u16(r.seq);
            buf.put_u16(r.end_seq);
            buf.put_u64(r.blob_length);
            put_string(&mut buf, &r.error);
        },
        RequestEnvelope::GenericMessageRequest(r) => {
            put_string(&mut buf, &r.action);
            put_bytes(&mut buf, &r.source_public_key);
            put_bytes(&mut buf, &r.data);
        },
        RequestEnvelope::GenericMessageResponse(r) => {
            write_status(&mut buf, r.status);
            put_bytes(&mut buf, &r.data);
            put_string(&mut buf, &r.error);
        },
    }
    buf
}

/// Reads the leading opcode and dispatches; returns `WireError::UnknownOpcode`
/// for anything not in the 12-variant table.
pub fn decode(bytes: &[u8]) -> Result<RequestEnvelope, WireError> {
    let mut r = Reader::new(Bytes::copy_from_slice(bytes));
    let opcode_raw = r.u32()?;
    let opcode = Opcode::from_u32(opcode_raw).ok_or(WireError::UnknownOpcode(opcode_raw))?;
    decode_body(opcode, &mut r)
}

/// Decodes assuming the caller already knows (and has stripped) the opcode,
/// validating the body against the *expected* variant and rejecting a
/// mismatch with `WireError::WrongOpcode`.
pub fn decode_as(bytes: &[u8], expected: Opcode) -> Result<RequestEnvelope, WireError> {
    let mut r = Reader::new(Bytes::copy_from_slice(bytes));
    let opcode_raw = r.u32()?;
    let opcode = Opcode::from_u32(opcode_raw).ok_or(WireError::UnknownOpcode(opcode_raw))?;
    if opcode as u32 != expected as u32 {
        return Err(WireError::WrongOpcode {
            expected: expected as u32,
            actual: opcode as u32,
        });
    }
    decode_body(opcode, &mut r)
}

fn decode_body(opcode: Opcode, r: &mut Reader) -> Result<RequestEnvelope, WireError> {
    Ok(match opcode {
        Opcode::FetchRequest => RequestEnvelope::FetchRequest(FetchRequest {
            query: read_fetch_query(r)?,
            crdt: read_fetch_crdt(r)?,
        }),
        Opcode::FetchResponse => {
            let status = read_status(r)?;
            let nodes = r.bytes_array()?;
            let embed = r.bytes_array()?;
            let delta = r.bytes()?;
            let seq = r.u16()?;
            let end_seq = r.u16()?;
            let row_count = r.u16()?;
            let error = r.string()?;
            RequestEnvelope::FetchResponse(FetchResponse {
                status,
                result: FetchResult { nodes, embed },
                crdt_result: CrdtResult { delta },
                seq,
                end_seq,
                row_count,
                error,
            })
        },
        Opcode::StoreRequest => RequestEnvelope::StoreRequest(StoreRequest {
            nodes: r.bytes_array()?,
            source_public_key: r.bytes()?,
            target_public_key: r.bytes()?,
            mute_msg_ids: r.bytes_array()?,
            preserve_transient: r.bool()?,
            batch_id: r.u32()?,
            has_more: r.bool()?,
        }),
        Opcode::StoreResponse => RequestEnvelope::StoreResponse(StoreResponse {
            status: read_status(r)?,
            stored_id1_list: r.bytes_array()?,
            missing_blob_id1_list: r.bytes_array()?,
            missing_blob_sizes: r.i64_array()?,
            error: r.string()?,
        }),
        Opcode::UnsubscribeRequest => RequestEnvelope::UnsubscribeRequest(UnsubscribeRequest {
            original_msg_id: r.bytes()?,
            target_public_key: r.bytes()?,
        }),
        Opcode::UnsubscribeResponse => RequestEnvelope::UnsubscribeResponse(UnsubscribeResponse {
            status: read_status(r)?,
            error: r.string()?,
        }),
        Opcode::WriteBlobRequest => RequestEnvelope::WriteBlobRequest(WriteBlobRequest {
            node_id1: r.bytes()?,
            pos: r.u64()?,
            data: r.bytes()?,
            source_public_key: r.bytes()?,
            target_public_key: r.bytes()?,
            mute_msg_ids: r.bytes_array()?,
        }),
        Opcode::WriteBlobResponse => RequestEnvelope::WriteBlobResponse(WriteBlobResponse {
            status: read_status(r)?,
            current_length: r.u64()?,
            error: r.string()?,
        }),
        Opcode::ReadBlobRequest => RequestEnvelope::ReadBlobRequest(ReadBlobRequest {
            node_id1: r.bytes()?,
            pos: r.u64()?,
            length: r.u32()?,
            target_public_key: r.bytes()?,
            source_public_key: r.bytes()?,
        }),
        Opcode::ReadBlobResponse => RequestEnvelope::ReadBlobResponse(ReadBlobResponse {
            status: read_status(r)?,
            data: r.bytes()?,
            seq: r.u16()?,
            end_seq: r.u16()?,
            blob_length: r.u64()?,
            error: r.string()?,
        }),
        Opcode::GenericMessageRequest => {
            RequestEnvelope::GenericMessageRequest(GenericMessageRequest {
                action: r.string()?,
                source_public_key: r.bytes()?,
                data: r.bytes()?,
            })
        },
        Opcode::GenericMessageResponse => {
            RequestEnvelope::GenericMessageResponse(GenericMessageResponse {
                status: read_status(r)?,
                data: r.bytes()?,
                error: r.string()?,
            })
        },
    })
}
