//! Patch apply logic.

use serde_json::Value;

use super::types::{Op, PatchError};

/// Anything a patch can be applied to.
///
/// Paths are split into components and are relative to the target. The
/// applicator only needs these four primitives; `copy`, `move` and `test`
/// are derived from them.
pub trait PatchTarget {
    type Error: From<PatchError>;

    /// Reads the value at `path`, `None` if nothing is there.
    fn get(&self, path: &[String]) -> Result<Option<Value>, Self::Error>;

    /// Inserts (arrays) or sets (objects) `value`. Returns the replaced
    /// value for object keys that already existed.
    fn add(&mut self, path: &[String], value: Value) -> Result<Option<Value>, Self::Error>;

    /// Removes the value at `path` and returns it.
    fn remove(&mut self, path: &[String]) -> Result<Value, Self::Error>;

    /// Overwrites an existing value and returns the previous one.
    fn replace(&mut self, path: &[String], value: Value) -> Result<Value, Self::Error>;
}

/// Applies one operation, returning the value it displaced (if any).
pub fn apply_op<T>(target: &mut T, op: &Op) -> Result<Option<Value>, T::Error>
where
    T: PatchTarget + ?Sized,
{
    match op {
        Op::Add { path, value } => target.add(path, value.clone()),
        Op::Remove { path, .. } => target.remove(path).map(Some),
        Op::Replace { path, value, .. } => target.replace(path, value.clone()).map(Some),
        Op::Copy { path, from } => {
            let value = target.get(from)?.ok_or(PatchError::NotFound)?;
            target.add(path, value)
        }
        Op::Move { path, from } => {
            // Moving a value into its own subtree is meaningless.
            if path.len() > from.len() && path.starts_with(from) {
                return Err(PatchError::InvalidTarget.into());
            }
            if path == from {
                return Ok(None);
            }
            let value = target.remove(from)?;
            target.add(path, value)
        }
        Op::Test { path, value, not } => {
            let actual = target.get(path)?.ok_or(PatchError::NotFound)?;
            if (actual == *value) == *not {
                return Err(PatchError::Test.into());
            }
            Ok(None)
        }
    }
}

/// Applies a sequence of operations in order, stopping at the first failure.
pub fn apply_ops<T>(target: &mut T, ops: &[Op]) -> Result<Vec<Option<Value>>, T::Error>
where
    T: PatchTarget + ?Sized,
{
    ops.iter().map(|op| apply_op(target, op)).collect()
}

// ── Plain JSON documents ──────────────────────────────────────────────────

fn parse_index(key: &str, len: usize, allow_end: bool) -> Result<usize, PatchError> {
    if allow_end && key == "-" {
        return Ok(len);
    }
    if !statetree_path::is_valid_index(key) {
        return Err(PatchError::InvalidIndex);
    }
    let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex)?;
    let bound = if allow_end { len } else { len.saturating_sub(1) };
    if idx > bound || (!allow_end && len == 0) {
        return Err(if allow_end { PatchError::InvalidIndex } else { PatchError::NotFound });
    }
    Ok(idx)
}

fn get_mut_at<'a>(doc: &'a mut Value, path: &[String]) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for step in path {
        current = match current {
            Value::Object(map) => map.get_mut(step).ok_or(PatchError::NotFound)?,
            Value::Array(arr) => {
                let idx = parse_index(step, arr.len(), false)?;
                &mut arr[idx]
            }
            _ => return Err(PatchError::NotFound),
        };
    }
    Ok(current)
}

impl PatchTarget for Value {
    type Error = PatchError;

    fn get(&self, path: &[String]) -> Result<Option<Value>, PatchError> {
        let pointer = statetree_path::format_json_pointer(path);
        Ok(self.pointer(&pointer).cloned())
    }

    fn add(&mut self, path: &[String], value: Value) -> Result<Option<Value>, PatchError> {
        let Some((key, parent_path)) = path.split_last() else {
            return Ok(Some(std::mem::replace(self, value)));
        };
        match get_mut_at(self, parent_path)? {
            Value::Object(map) => Ok(map.insert(key.clone(), value)),
            Value::Array(arr) => {
                let idx = parse_index(key, arr.len(), true)?;
                arr.insert(idx, value);
                Ok(None)
            }
            _ => Err(PatchError::InvalidTarget),
        }
    }

    fn remove(&mut self, path: &[String]) -> Result<Value, PatchError> {
        let (key, parent_path) = path.split_last().ok_or(PatchError::InvalidTarget)?;
        match get_mut_at(self, parent_path)? {
            Value::Object(map) => map.shift_remove(key).ok_or(PatchError::NotFound),
            Value::Array(arr) => {
                let idx = parse_index(key, arr.len(), false)?;
                Ok(arr.remove(idx))
            }
            _ => Err(PatchError::InvalidTarget),
        }
    }

    fn replace(&mut self, path: &[String], value: Value) -> Result<Value, PatchError> {
        let slot = get_mut_at(self, path)?;
        Ok(std::mem::replace(slot, value))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> Vec<String> {
        if s.is_empty() {
            return vec![];
        }
        s.split('/').map(|p| p.to_string()).collect()
    }

    #[test]
    fn add_to_object() {
        let mut doc = json!({"a": 1});
        apply_op(&mut doc, &Op::Add { path: path("b"), value: json!(2) }).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn add_to_array() {
        let mut doc = json!([1, 2, 3]);
        apply_op(&mut doc, &Op::Add { path: path("1"), value: json!(99) }).unwrap();
        assert_eq!(doc, json!([1, 99, 2, 3]));
    }

    #[test]
    fn add_append_array() {
        let mut doc = json!([1, 2]);
        apply_op(&mut doc, &Op::Add { path: path("-"), value: json!(3) }).unwrap();
        assert_eq!(doc, json!([1, 2, 3]));
    }

    #[test]
    fn add_past_end_is_invalid() {
        let mut doc = json!([1]);
        let err = apply_op(&mut doc, &Op::Add { path: path("5"), value: json!(3) }).unwrap_err();
        assert_eq!(err, PatchError::InvalidIndex);
    }

    #[test]
    fn remove_from_object() {
        let mut doc = json!({"a": 1, "b": 2});
        let old = apply_op(&mut doc, &Op::Remove { path: path("a"), old_value: None }).unwrap();
        assert_eq!(doc, json!({"b": 2}));
        assert_eq!(old, Some(json!(1)));
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut doc = json!({"a": 1});
        let err = apply_op(&mut doc, &Op::Remove { path: vec![], old_value: None }).unwrap_err();
        assert_eq!(err, PatchError::InvalidTarget);
    }

    #[test]
    fn replace_value() {
        let mut doc = json!({"a": 1});
        let old = apply_op(
            &mut doc,
            &Op::Replace { path: path("a"), value: json!(99), old_value: None },
        )
        .unwrap();
        assert_eq!(doc, json!({"a": 99}));
        assert_eq!(old, Some(json!(1)));
    }

    #[test]
    fn replace_missing_key_fails() {
        let mut doc = json!({"a": 1});
        let err = apply_op(
            &mut doc,
            &Op::Replace { path: path("z"), value: json!(0), old_value: None },
        )
        .unwrap_err();
        assert_eq!(err, PatchError::NotFound);
    }

    #[test]
    fn copy_op() {
        let mut doc = json!({"a": {"x": 1}, "b": {}});
        apply_op(&mut doc, &Op::Copy { path: path("b/x"), from: path("a/x") }).unwrap();
        assert_eq!(doc["b"]["x"], json!(1));
    }

    #[test]
    fn move_op() {
        let mut doc = json!({"a": 1, "b": 2});
        apply_op(&mut doc, &Op::Move { path: path("c"), from: path("a") }).unwrap();
        assert_eq!(doc, json!({"b": 2, "c": 1}));
    }

    #[test]
    fn move_into_own_child_fails() {
        let mut doc = json!({"a": {"b": 1}});
        let err = apply_op(&mut doc, &Op::Move { path: path("a/b/c"), from: path("a") }).unwrap_err();
        assert_eq!(err, PatchError::InvalidTarget);
    }

    #[test]
    fn test_op_pass_and_fail() {
        let mut doc = json!({"a": 1});
        apply_op(&mut doc, &Op::Test { path: path("a"), value: json!(1), not: false }).unwrap();
        let err = apply_op(&mut doc, &Op::Test { path: path("a"), value: json!(1), not: true }).unwrap_err();
        assert_eq!(err, PatchError::Test);
    }

    #[test]
    fn ops_stop_at_first_failure() {
        let mut doc = json!({"a": 1});
        let ops = vec![
            Op::Replace { path: path("a"), value: json!(2), old_value: None },
            Op::Remove { path: path("missing"), old_value: None },
            Op::Replace { path: path("a"), value: json!(3), old_value: None },
        ];
        assert!(apply_ops(&mut doc, &ops).is_err());
        assert_eq!(doc, json!({"a": 2}));
    }
}
