//! Response-shape canonicalization
//!
//! Different versions of the access API wrap list responses differently
//! (bare array, `{"list": [...]}`, `{"sockets": [...]}`, `{"policies": [...]}`)
//! and surface identifiers as either `id` or a type-specific `*_id` field.
//! Every response passes through here before it reaches typed code.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConnectError, Result};

/// Resource families with their own container keys and id fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Endpoint,
    Policy,
}

impl ResourceKind {
    /// Container keys, in the order they are tried
    pub fn container_keys(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Endpoint => &["list", "sockets"],
            ResourceKind::Policy => &["list", "policies"],
        }
    }

    /// Type-specific identifier field
    pub fn id_field(&self) -> &'static str {
        match self {
            ResourceKind::Endpoint => "socket_id",
            ResourceKind::Policy => "policy_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Endpoint => "socket",
            ResourceKind::Policy => "policy",
        }
    }
}

/// Pull the item array out of a list response.
///
/// An empty body, or a recognized container holding `null`, is an empty list.
/// Any other shape is an error rather than an empty list.
pub fn extract_list(value: Value, kind: ResourceKind) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => {
            for key in kind.container_keys() {
                match map.remove(*key) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(Value::Null) => return Ok(Vec::new()),
                    Some(other) => {
                        return Err(ConnectError::UnexpectedShape {
                            kind: kind.label(),
                            detail: format!("`{}` holds {}", key, json_type(&other)),
                        })
                    }
                    None => {}
                }
            }
            let keys = map.keys().cloned().collect::<Vec<_>>().join(", ");
            debug!("No recognized {} container in response (keys: {})", kind.label(), keys);
            Err(ConnectError::UnexpectedShape {
                kind: kind.label(),
                detail: format!("no list container among keys [{}]", keys),
            })
        }
        other => Err(ConnectError::UnexpectedShape {
            kind: kind.label(),
            detail: format!("expected a list, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Copy the type-specific identifier into `id` when `id` is absent
pub fn canonicalize_id(item: &mut Value, kind: ResourceKind) {
    let Value::Object(map) = item else {
        return;
    };
    let has_id = matches!(map.get("id"), Some(v) if !v.is_null());
    if has_id {
        return;
    }
    if let Some(alt) = map.get(kind.id_field()).cloned() {
        map.insert("id".to_string(), alt);
    }
}

/// Normalize and decode a list response
pub fn normalize_list<T: DeserializeOwned>(value: Value, kind: ResourceKind) -> Result<Vec<T>> {
    extract_list(value, kind)?
        .into_iter()
        .map(|mut item| {
            canonicalize_id(&mut item, kind);
            decode(item, kind)
        })
        .collect()
}

/// Normalize and decode a single-resource response.
///
/// `known_id` fills in the identifier when the service echoes a record without one.
pub fn normalize_item<T: DeserializeOwned>(
    mut value: Value,
    kind: ResourceKind,
    known_id: Option<&str>,
) -> Result<T> {
    canonicalize_id(&mut value, kind);
    if let (Value::Object(map), Some(id)) = (&mut value, known_id) {
        map.entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
    }
    match &value {
        Value::Object(map) if map.contains_key("id") => decode(value, kind),
        _ => Err(ConnectError::MissingField {
            kind: kind.label(),
            field: "id",
        }),
    }
}

fn decode<T: DeserializeOwned>(value: Value, kind: ResourceKind) -> Result<T> {
    serde_json::from_value(value).map_err(|source| ConnectError::Decode {
        kind: kind.label(),
        source,
    })
}
