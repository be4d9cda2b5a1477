use std::sync::Arc;

use serde_json::{Map, Value};

use crate::coercion;
use crate::error::SchemaError;

/// How a declared object field relates to its presence in the input, per the
/// source's `name` / `name?` / `name??` key-suffix convention (§4.2).
#[derive(Clone)]
pub enum Requiredness {
    /// Bare key: fails with `MissingRequired` if absent.
    Required,
    /// `name?`: absent falls back to `default`. If `default` is itself an
    /// object/array, absence recurses into the field schema with an empty
    /// container rather than taking the literal default verbatim.
    OptionalWithDefault { default: Value },
    /// `name??`: absent omits the key from the parsed output entirely.
    OptionalNoDefault,
}

#[derive(Clone)]
pub struct ObjectField {
    pub schema: SchemaNode,
    pub requiredness: Requiredness,
}

pub type PostFn = Arc<dyn Fn(Value) -> Result<Value, SchemaError> + Send + Sync>;
pub type CustomParser = Arc<dyn Fn(&Value, &str) -> Result<Value, SchemaError> + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    String,
    Bytes,
    Number,
    Bool,
}

#[derive(Clone)]
pub enum SchemaNode {
    Scalar(Scalar),
    Array(Box<SchemaNode>),
    Object {
        fields: Vec<(String, ObjectField)>,
        /// Schema applied to keys present in the input but not declared in
        /// `fields` (the `""` fallback key). Keys beginning with `#` are
        /// always ignored regardless of a fallback.
        fallback: Option<Box<SchemaNode>>,
        post_fn: Option<PostFn>,
    },
    /// A custom parser function (`ParseEnum`, `ParseNodeType`, ...).
    Func(CustomParser),
}

impl SchemaNode {
    pub fn object(fields: Vec<(&str, ObjectField)>) -> Self {
        SchemaNode::Object {
            fields: fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            fallback: None,
            post_fn: None,
        }
    }

    pub fn with_fallback(mut self, fallback: SchemaNode) -> Self {
        if let SchemaNode::Object { fallback: f, .. } = &mut self {
            *f = Some(Box::new(fallback));
        }
        self
    }

    pub fn with_post_fn(mut self, f: PostFn) -> Self {
        if let SchemaNode::Object { post_fn, .. } = &mut self {
            *post_fn = Some(f);
        }
        self
    }
}

pub fn required(schema: SchemaNode) -> ObjectField {
    ObjectField {
        schema,
        requiredness: Requiredness::Required,
    }
}

pub fn optional(schema: SchemaNode, default: Value) -> ObjectField {
    ObjectField {
        schema,
        requiredness: Requiredness::OptionalWithDefault { default },
    }
}

pub fn optional_no_default(schema: SchemaNode) -> ObjectField {
    ObjectField {
        schema,
        requiredness: Requiredness::OptionalNoDefault,
    }
}

fn is_comment_key(key: &str) -> bool {
    key.starts_with('#')
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Parses `input` against `schema`, coercing loosely-typed values and
/// filling declared defaults, or fails with a dotted-path `SchemaError`.
pub fn parse(schema: &SchemaNode, input: &Value, path: &str) -> Result<Value, SchemaError> {
    match schema {
        SchemaNode::Scalar(Scalar::String) => coercion::coerce_string(input, path),
        SchemaNode::Scalar(Scalar::Bytes) => coercion::coerce_bytes(input, path),
        SchemaNode::Scalar(Scalar::Number) => coercion::coerce_number(input, path),
        SchemaNode::Scalar(Scalar::Bool) => Ok(coercion::coerce_bool(input)),
        SchemaNode::Func(f) => f(input, path),
        SchemaNode::Array(inner) => {
            let items = input.as_array().ok_or_else(|| SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: "array".into(),
                got: input.to_string(),
            })?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(parse(inner, item, &join_path(path, &i.to_string()))?);
            }
            Ok(Value::Array(out))
        },
        SchemaNode::Object {
            fields,
            fallback,
            post_fn,
        } => {
            let input_obj = match input {
                Value::Object(m) => m.clone(),
                Value::Null => Map::new(),
                other => {
                    return Err(SchemaError::TypeMismatch {
                        path: path.to_string(),
                        expected: "object".into(),
                        got: other.to_string(),
                    })
                },
            };

            let mut out = Map::new();
            let mut consumed = std::collections::HashSet::new();

            for (key, field) in fields {
                consumed.insert(key.clone());
                let field_path = join_path(path, key);
                match input_obj.get(key) {
                    Some(value) => {
                        out.insert(key.clone(), parse(&field.schema, value, &field_path)?);
                    },
                    None => match &field.requiredness {
                        Requiredness::Required => {
                            return Err(SchemaError::MissingRequired { path: field_path })
                        },
                        Requiredness::OptionalNoDefault => {},
                        Requiredness::OptionalWithDefault { default } => {
                            let value = if matches!(default, Value::Object(_) | Value::Array(_)) {
                                parse(&field.schema, default, &field_path)?
                            } else {
                                default.clone()
                            };
                            out.insert(key.clone(), value);
                        },
                    },
                }
            }

            if let Some(fallback_schema) = fallback {
                for (key, value) in input_obj.iter() {
                    if consumed.contains(key) || is_comment_key(key) {
                        continue;
                    }
                    let field_path = join_path(path, key);
                    out.insert(key.clone(), parse(fallback_schema, value, &field_path)?);
                }
            }

            let result = Value::Object(out);
            match post_fn {
                Some(f) => f(result),
                None => Ok(result),
            }
        },
    }
}

/// `ParseEnum(values, default)`: accepts any of `values` verbatim, or falls
/// back to `default` when the input does not match (and is absent/null).
pub fn parse_enum(values: &'static [&'static str], default: &'static str) -> SchemaNode {
    SchemaNode::Func(Arc::new(move |v: &Value, path: &str| match v {
        Value::String(s) if values.contains(&s.as_str()) => Ok(Value::String(s.clone())),
        Value::Null => Ok(Value::String(default.to_string())),
        other => Err(SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: format!("one of {values:?}"),
            got: other.to_string(),
        }),
    }))
}

/// `ParseNodeType`: resolves a human-friendly node type alias to its
/// canonical byte-string form. The alias table is supplied by the caller
/// (it is datamodel knowledge, out of this core's scope).
pub fn parse_node_type(aliases: &'static [(&'static str, &'static [u8])]) -> SchemaNode {
    SchemaNode::Func(Arc::new(move |v: &Value, path: &str| {
        if let Value::String(s) = v {
            if let Some((_, bytes)) = aliases.iter().find(|(name, _)| *name == s) {
                return Ok(Value::Array(bytes.iter().map(|b| Value::from(*b as u64)).collect()));
            }
        }
        coercion::coerce_bytes(v, path)
    }))
}
