use pretty_assertions::assert_eq;
use serde_json::json;

use crate::schema::{optional, optional_no_default, required, Scalar, SchemaNode};
use crate::{parse, parse_enum, SchemaError};

fn limit_field_schema() -> SchemaNode {
    SchemaNode::object(vec![
        ("name", optional(SchemaNode::Scalar(Scalar::String), json!(""))),
        ("limit", optional(SchemaNode::Scalar(Scalar::Number), json!(-1))),
    ])
}

fn match_schema() -> SchemaNode {
    SchemaNode::object(vec![
        ("nodeType", required(SchemaNode::Scalar(Scalar::Bytes))),
        (
            "limitField",
            optional(limit_field_schema(), json!({})),
        ),
        ("discard", optional(SchemaNode::Scalar(Scalar::Bool), json!(false))),
    ])
}

#[test]
fn required_key_missing_fails_with_dotted_path() {
    let schema = match_schema();
    let err = parse(&schema, &json!({}), "").unwrap_err();
    match err {
        SchemaError::MissingRequired { path } => assert_eq!(path, "nodeType"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn object_default_recurses_into_empty_container() {
    let schema = match_schema();
    let input = json!({"nodeType": "hex:01020304"});
    let parsed = parse(&schema, &input, "").unwrap();
    assert_eq!(parsed["limitField"]["name"], json!(""));
    assert_eq!(parsed["limitField"]["limit"], json!(-1.0));
    assert_eq!(parsed["discard"], json!(false));
}

#[test]
fn bytes_coercion_supports_prefixes() {
    let schema = SchemaNode::Scalar(Scalar::Bytes);
    assert_eq!(
        parse(&schema, &json!("hex:0a0b"), "").unwrap(),
        json!([10, 11])
    );
    assert_eq!(
        parse(&schema, &json!("ascii:AB"), "").unwrap(),
        json!([65, 66])
    );
    assert_eq!(
        parse(&schema, &json!("base64:AQI="), "").unwrap(),
        json!([1, 2])
    );
}

#[test]
fn string_coercion_stringifies_non_string() {
    let schema = SchemaNode::Scalar(Scalar::String);
    let input = json!({"a": 1});
    let parsed = parse(&schema, &input, "").unwrap();
    assert_eq!(parsed, json!(r#"{"a":1}"#));
}

#[test]
fn number_coercion_from_lossless_string() {
    let schema = SchemaNode::Scalar(Scalar::Number);
    assert_eq!(parse(&schema, &json!("42"), "").unwrap(), json!(42.0));
    assert!(parse(&schema, &json!("nope"), "").is_err());
}

#[test]
fn fallback_schema_handles_unknown_keys_and_skips_comments() {
    let schema = SchemaNode::object(vec![("a", required(SchemaNode::Scalar(Scalar::Number)))])
        .with_fallback(SchemaNode::Scalar(Scalar::String));
    let input = json!({"a": 1, "b": 2, "#note": "ignored"});
    let parsed = parse(&schema, &input, "").unwrap();
    assert_eq!(parsed["a"], json!(1.0));
    assert_eq!(parsed["b"], json!("2"));
    assert!(parsed.get("#note").is_none());
}

#[test]
fn optional_no_default_omits_absent_key() {
    let schema = SchemaNode::object(vec![(
        "maybe",
        optional_no_default(SchemaNode::Scalar(Scalar::String)),
    )]);
    let parsed = parse(&schema, &json!({}), "").unwrap();
    assert!(parsed.get("maybe").is_none());
}

#[test]
fn parse_enum_accepts_known_values_and_falls_back() {
    let schema = parse_enum(&["a", "b"], "a");
    assert_eq!(parse(&schema, &json!("b"), "").unwrap(), json!("b"));
    assert_eq!(parse(&schema, &serde_json::Value::Null, "").unwrap(), json!("a"));
    assert!(parse(&schema, &json!("c"), "").is_err());
}

#[test]
fn post_fn_hook_runs_on_parsed_subtree() {
    let schema = SchemaNode::object(vec![("n", required(SchemaNode::Scalar(Scalar::Number)))])
        .with_post_fn(std::sync::Arc::new(|mut v: serde_json::Value| {
            v["doubled"] = json!(v["n"].as_f64().unwrap() * 2.0);
            Ok(v)
        }));
    let parsed = parse(&schema, &json!({"n": 3}), "").unwrap();
    assert_eq!(parsed["doubled"], json!(6.0));
}
