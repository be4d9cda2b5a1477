use std::collections::HashMap;

use pretty_assertions::assert_eq;
use serde_json::json;

use super::{substitute, Var};

#[test]
fn substitutes_bound_variable() {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), Var::String("alice".to_string()));
    let tree = json!({"owner": "${name}"});
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, json!({"owner": "alice"}));
}

#[test]
fn falls_back_to_default_when_missing() {
    let vars = HashMap::new();
    let tree = json!({"limit": "${limit:number:10}"});
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, json!({"limit": 10.0}));
}

#[test]
fn missing_without_default_removes_key_and_compacts_arrays() {
    let vars = HashMap::new();
    let tree = json!({"list": ["a", "${gone}", "b"], "solo": "${gone}"});
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, json!({"list": ["a", "b"]}));
}

#[test]
fn null_value_forces_removal_even_with_default() {
    let mut vars = HashMap::new();
    vars.insert("x".to_string(), Var::Null);
    let tree = json!({"x": "${x:string:fallback}"});
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, json!({}));
}

#[test]
fn partial_match_is_left_as_plain_text() {
    let vars = HashMap::new();
    let tree = json!("prefix ${name} suffix");
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, json!("prefix ${name} suffix"));
}

#[test]
fn non_string_nodes_recurse_untouched() {
    let vars = HashMap::new();
    let tree = json!({"n": 5, "b": true, "nested": {"inner": 1}});
    let out = substitute(&tree, &vars).unwrap().unwrap();
    assert_eq!(out, tree);
}
