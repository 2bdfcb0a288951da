//! JSON codec for patch operations.
//!
//! Converts operations to/from `serde_json::Value` in RFC 6902 format, with
//! the optional `oldValue` member on `remove` and `replace`.

use serde_json::{json, Map, Value};

use crate::types::{Op, PatchError};

fn encode_path(path: &[String]) -> Value {
    Value::String(statetree_path::format_json_pointer(path))
}

fn decode_path(v: Option<&Value>, member: &str) -> Result<Vec<String>, PatchError> {
    let s = v
        .and_then(Value::as_str)
        .ok_or_else(|| PatchError::InvalidOp(format!("{member} must be a string")))?;
    if !s.is_empty() && !s.starts_with('/') {
        return Err(PatchError::InvalidOp(format!("{member} must be a JSON pointer")));
    }
    Ok(statetree_path::parse_json_pointer(s))
}

fn required<'a>(m: &'a Map<String, Value>, member: &str) -> Result<&'a Value, PatchError> {
    m.get(member)
        .ok_or_else(|| PatchError::InvalidOp(format!("missing {member}")))
}

/// Serializes an `Op` to its JSON Patch form.
pub fn to_json(op: &Op) -> Value {
    match op {
        Op::Add { path, value } => json!({
            "op": "add",
            "path": encode_path(path),
            "value": value
        }),
        Op::Remove { path, old_value } => {
            let mut m = Map::new();
            m.insert("op".into(), json!("remove"));
            m.insert("path".into(), encode_path(path));
            if let Some(ov) = old_value {
                m.insert("oldValue".into(), ov.clone());
            }
            Value::Object(m)
        }
        Op::Replace {
            path,
            value,
            old_value,
        } => {
            let mut m = Map::new();
            m.insert("op".into(), json!("replace"));
            m.insert("path".into(), encode_path(path));
            m.insert("value".into(), value.clone());
            if let Some(ov) = old_value {
                m.insert("oldValue".into(), ov.clone());
            }
            Value::Object(m)
        }
        Op::Copy { path, from } => json!({
            "op": "copy",
            "path": encode_path(path),
            "from": encode_path(from)
        }),
        Op::Move { path, from } => json!({
            "op": "move",
            "path": encode_path(path),
            "from": encode_path(from)
        }),
        Op::Test { path, value, not } => {
            let mut m = Map::new();
            m.insert("op".into(), json!("test"));
            m.insert("path".into(), encode_path(path));
            m.insert("value".into(), value.clone());
            if *not {
                m.insert("not".into(), json!(true));
            }
            Value::Object(m)
        }
    }
}

/// Deserializes one JSON Patch operation.
pub fn from_json(v: &Value) -> Result<Op, PatchError> {
    let m = v
        .as_object()
        .ok_or_else(|| PatchError::InvalidOp("operation must be an object".into()))?;
    let op = m
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| PatchError::InvalidOp("missing op".into()))?;
    let path = decode_path(m.get("path"), "path")?;
    match op {
        "add" => Ok(Op::Add {
            path,
            value: required(m, "value")?.clone(),
        }),
        "remove" => Ok(Op::Remove {
            path,
            old_value: m.get("oldValue").cloned(),
        }),
        "replace" => Ok(Op::Replace {
            path,
            value: required(m, "value")?.clone(),
            old_value: m.get("oldValue").cloned(),
        }),
        "copy" => Ok(Op::Copy {
            path,
            from: decode_path(m.get("from"), "from")?,
        }),
        "move" => Ok(Op::Move {
            path,
            from: decode_path(m.get("from"), "from")?,
        }),
        "test" => Ok(Op::Test {
            path,
            value: required(m, "value")?.clone(),
            not: m.get("not").and_then(Value::as_bool).unwrap_or(false),
        }),
        other => Err(PatchError::InvalidOp(format!("unknown op: {other}"))),
    }
}

/// Serializes a whole patch to a JSON array.
pub fn to_json_patch(ops: &[Op]) -> Value {
    Value::Array(ops.iter().map(to_json).collect())
}

/// Deserializes a JSON array of operations. A single operation object is
/// accepted as a one-element patch.
pub fn from_json_patch(v: &Value) -> Result<Vec<Op>, PatchError> {
    match v {
        Value::Array(arr) => arr.iter().map(from_json).collect(),
        Value::Object(_) => Ok(vec![from_json(v)?]),
        _ => Err(PatchError::InvalidOp("patch must be an array".into())),
    }
}
