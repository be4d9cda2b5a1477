use pretty_assertions::assert_eq;

use mesh_types::{
    Cmp,
    FetchCRDT,
    FetchQuery,
    FetchRequest,
    Filter,
    FilterValue,
    RequestEnvelope,
    Status,
    UnsubscribeRequest,
};
use serde_json::json;

use crate::{binary, json as wjson};

fn sample_fetch_request() -> RequestEnvelope {
    RequestEnvelope::FetchRequest(FetchRequest {
        query: FetchQuery {
            parent_id: vec![0x01; 32],
            limit: 10,
            ..Default::default()
        },
        crdt: FetchCRDT::default(),
    })
}

#[test]
fn fetch_round_trip_bit_identical() {
    let envelope = sample_fetch_request();
    let encoded = binary::encode(&envelope);

    assert_eq!(&encoded[0..4], &[0x00, 0x00, 0x00, 0x01]);

    let decoded = binary::decode(&encoded).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn decode_rejects_unknown_opcode() {
    let bytes = [0x00, 0x00, 0x00, 0xFF];
    let err = binary::decode(&bytes).unwrap_err();
    assert_eq!(err, crate::WireError::UnknownOpcode(0xFF));
}

#[test]
fn decode_as_rejects_mismatched_opcode() {
    let envelope = sample_fetch_request();
    let encoded = binary::encode(&envelope);
    let err = binary::decode_as(&encoded, mesh_types::Opcode::StoreRequest).unwrap_err();
    assert!(matches!(err, crate::WireError::WrongOpcode { .. }));
}

#[test]
fn filter_value_array_of_octets_round_trips() {
    let original = FilterValue::Bytes(vec![1, 2, 3, 255]);
    let wire = crate::filter_value::to_wire_string(&original);
    let back = crate::filter_value::from_wire_string(&wire).unwrap();
    assert_eq!(back, original);
}

#[test]
fn filter_encodes_and_decodes_through_binary_query() {
    let mut query = FetchQuery {
        parent_id: vec![0xAA; 32],
        ..Default::default()
    };
    query.r#match.push(mesh_types::Match {
        filters: vec![Filter {
            field: "owner".into(),
            operator: "eq".into(),
            cmp: Cmp::Eq,
            value: FilterValue::Bytes(vec![9, 8, 7]),
        }],
        ..Default::default()
    });
    let envelope = RequestEnvelope::FetchRequest(FetchRequest {
        query,
        crdt: FetchCRDT::default(),
    });
    let encoded = binary::encode(&envelope);
    let decoded = binary::decode(&encoded).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn json_variant_inference_unsubscribe_request() {
    let input = json!({"originalMsgId": "deadbeef", "targetPublicKey": ""});
    let decoded = wjson::decode(&input).unwrap();
    match decoded {
        RequestEnvelope::UnsubscribeRequest(UnsubscribeRequest {
            original_msg_id,
            target_public_key,
        }) => {
            assert_eq!(original_msg_id, vec![0xde, 0xad, 0xbe, 0xef]);
            assert!(target_public_key.is_empty());
        },
        other => panic!("expected UnsubscribeRequest, got {other:?}"),
    }
}

#[test]
fn json_round_trips_fetch_request() {
    let envelope = sample_fetch_request();
    let encoded = wjson::encode(&envelope);
    let decoded = wjson::decode(&encoded).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn json_decode_rejects_unknown_status() {
    let input = json!({"status": 200, "error": "boom"});
    let err = wjson::decode(&input).unwrap_err();
    assert_eq!(err, crate::WireError::UnknownStatus(200));
}

#[test]
fn json_decode_indeterminate_shape_fails() {
    let input = json!({"foo": "bar"});
    let err = wjson::decode(&input).unwrap_err();
    assert_eq!(err, crate::WireError::IndeterminateVariant);
}

#[test]
fn store_response_round_trips_binary() {
    let envelope = RequestEnvelope::StoreResponse(mesh_types::StoreResponse {
        status: Status::Result,
        stored_id1_list: vec![vec![1, 2, 3]],
        missing_blob_id1_list: vec![],
        missing_blob_sizes: vec![42, -1],
        error: String::new(),
    });
    let encoded = binary::encode(&envelope);
    let decoded = binary::decode(&encoded).unwrap();
    assert_eq!(decoded, envelope);
}
