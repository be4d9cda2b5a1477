//! Substitutes `${name:type:default}` and `${name}` placeholders inside
//! arbitrary JSON-like trees (§4.3). Applied before schema parsing, per the
//! design notes — template substitution never attempts to statically type
//! through variables.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("variable \"{0}\" has unknown declared type \"{1}\"")]
    UnknownType(String, String),

    #[error("default value \"{0}\" could not be parsed as {1}")]
    BadDefault(String, String),
}

/// A variable value supplied by the caller for substitution.
#[derive(Clone, Debug, PartialEq)]
pub enum Var {
    String(String),
    Number(f64),
    BigInt(i64),
    Bool(bool),
    Null,
}

impl Var {
    fn to_value(&self, declared_type: Option<&str>) -> Result<Value, TemplateError> {
        match declared_type {
            None | Some("string") => Ok(Value::String(self.as_string())),
            Some("number") => Ok(self
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            Some("bigint") => Ok(Value::Number(self.as_i64().into())),
            Some("boolean") => Ok(Value::Bool(self.as_bool())),
            Some(other) => Err(TemplateError::UnknownType(self.as_string(), other.to_string())),
        }
    }

    fn as_string(&self) -> String {
        match self {
            Var::String(s) => s.clone(),
            Var::Number(n) => n.to_string(),
            Var::BigInt(n) => n.to_string(),
            Var::Bool(b) => b.to_string(),
            Var::Null => String::new(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Var::String(s) => s.parse().ok(),
            Var::Number(n) => Some(*n),
            Var::BigInt(n) => Some(*n as f64),
            Var::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Var::Null => None,
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            Var::String(s) => s.parse().unwrap_or(0),
            Var::Number(n) => *n as i64,
            Var::BigInt(n) => *n,
            Var::Bool(b) => *b as i64,
            Var::Null => 0,
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Var::String(s) => !s.is_empty() && s != "false" && s != "0",
            Var::Number(n) => *n != 0.0,
            Var::BigInt(n) => *n != 0,
            Var::Bool(b) => *b,
            Var::Null => false,
        }
    }
}

struct Token<'a> {
    name: &'a str,
    ty: Option<&'a str>,
    default: Option<&'a str>,
}

/// Parses a string that is *entirely* a `${...}` token, or returns `None` if
/// it is plain text (or only partially a template reference — the spec
/// requires the full string content to match, not a substring).
fn parse_token(s: &str) -> Option<Token<'_>> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    let mut parts = inner.splitn(3, ':');
    let name = parts.next()?;
    let ty = parts.next();
    let default = parts.next();
    Some(Token { name, ty, default })
}

fn default_value(token: &Token<'_>) -> Result<Option<Value>, TemplateError> {
    let Some(default) = token.default else {
        return Ok(None);
    };
    let v = match token.ty {
        None | Some("string") => Value::String(default.to_string()),
        Some("number") => default
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| TemplateError::BadDefault(default.to_string(), "number".into()))?,
        Some("bigint") => default
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| TemplateError::BadDefault(default.to_string(), "bigint".into()))?,
        Some("boolean") => Value::Bool(default == "true"),
        Some(other) => {
            return Err(TemplateError::UnknownType(token.name.to_string(), other.to_string()))
        },
    };
    Ok(Some(v))
}

/// Substitutes every matching token in `tree`. Returns `None` when the node
/// itself must be dropped (an unresolved variable with no default, or one
/// whose bound value is explicitly `null`) so the caller can compact arrays
/// and drop object keys.
pub fn substitute(tree: &Value, vars: &HashMap<String, Var>) -> Result<Option<Value>, TemplateError> {
    match tree {
        Value::String(s) => match parse_token(s) {
            None => Ok(Some(tree.clone())),
            Some(token) => match vars.get(token.name) {
                Some(Var::Null) => Ok(None),
                Some(var) => Ok(Some(var.to_value(token.ty)?)),
                None => default_value(&token),
            },
        },
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                if let Some(v) = substitute(item, vars)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        },
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if let Some(substituted) = substitute(v, vars)? {
                    out.insert(k.clone(), substituted);
                }
            }
            Ok(Some(Value::Object(out)))
        },
        other => Ok(Some(other.clone())),
    }
}

#[cfg(test)]
mod tests;
