//! Applying JSON patches and snapshots to live trees.

use serde_json::Value;
use statetree_patch::{apply_ops, to_json_patch, Op, PatchError, PatchTarget};

use super::Node;
use crate::action::{self, RunStep, APPLY_PATCHES, APPLY_SNAPSHOT};
use crate::args::Arg;
use crate::error::TreeError;
use crate::types::Type;

/// Adapts a subtree to the generic patch applicator. Paths are relative to
/// `base`.
struct TreePatchTarget<'a> {
    base: &'a Node,
}

impl TreePatchTarget<'_> {
    fn parent<'p>(&self, path: &'p [String]) -> Result<(Node, &'p str), TreeError> {
        let (key, parent) = path.split_last().ok_or(PatchError::InvalidTarget)?;
        Ok((self.base.resolve_segments(parent)?, key.as_str()))
    }
}

fn insert_index(node: &Node, key: &str) -> Result<usize, TreeError> {
    if key == "-" {
        return node.len();
    }
    if !statetree_path::is_valid_index(key) {
        return Err(PatchError::InvalidIndex.into());
    }
    Ok(key.parse().map_err(|_| PatchError::InvalidIndex)?)
}

impl PatchTarget for TreePatchTarget<'_> {
    type Error = TreeError;

    fn get(&self, path: &[String]) -> Result<Option<Value>, TreeError> {
        let Some((key, parent)) = path.split_last() else {
            return self.base.snapshot().map(Some);
        };
        let node = match self.base.resolve_segments(parent) {
            Ok(node) => node,
            Err(TreeError::PathNotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        match node.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(TreeError::UnknownProperty { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn add(&mut self, path: &[String], value: Value) -> Result<Option<Value>, TreeError> {
        if path.is_empty() {
            return self.replace(path, value).map(Some);
        }
        let (node, key) = self.parent(path)?;
        if let Type::Array(_) = node.node_type()? {
            let index = insert_index(&node, key)?;
            node.insert_slot(index, Arg::Value(value))?;
            return Ok(None);
        }
        Ok(match node.set_slot(key, Arg::Value(value))? {
            Op::Replace { old_value, .. } => old_value,
            _ => None,
        })
    }

    fn remove(&mut self, path: &[String]) -> Result<Value, TreeError> {
        let (node, key) = self.parent(path)?;
        node.delete(key)
    }

    fn replace(&mut self, path: &[String], value: Value) -> Result<Value, TreeError> {
        if path.is_empty() {
            let old = self.base.snapshot()?;
            self.base.replace_content(value)?;
            return Ok(old);
        }
        let (node, key) = self.parent(path)?;
        let old = match node.get(key) {
            Ok(old) => old,
            Err(TreeError::UnknownProperty { .. }) => return Err(PatchError::NotFound.into()),
            Err(err) => return Err(err),
        };
        node.set_slot(key, Arg::Value(value))?;
        Ok(old)
    }
}

/// Applies `ops` to the subtree at `target`, with paths relative to it.
///
/// Runs as the `@APPLY_PATCHES` action, so it is allowed on protected trees
/// and shows up in action recordings with the patch as its only argument.
pub fn apply_patch(target: &Node, ops: &[Op]) -> Result<(), TreeError> {
    let step = RunStep::invoke(target, APPLY_PATCHES);
    let args = [Arg::Value(to_json_patch(ops))];
    action::intercept(target, &step, &args, |cx| {
        let mut subtree = TreePatchTarget { base: cx.node() };
        apply_ops(&mut subtree, ops).map(drop)
    })?
}

/// Replaces the content of `target` with `snapshot`, as the
/// `@APPLY_SNAPSHOT` action.
pub fn apply_snapshot(target: &Node, snapshot: Value) -> Result<(), TreeError> {
    let step = RunStep::invoke(target, APPLY_SNAPSHOT);
    let args = [Arg::Value(snapshot.clone())];
    action::intercept(target, &step, &args, |cx| {
        cx.node().replace_content(snapshot).map(drop)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{array, map, number, string, ModelType};
    use serde_json::json;
    use statetree_patch::from_json_patch;

    fn doc() -> Node {
        ModelType::builder("Doc")
            .prop("title", string())
            .prop("list", array(number()))
            .prop("meta", map(string()))
            .build()
            .create(json!({"title": "t", "list": [1, 2], "meta": {"a": "x"}}))
            .unwrap()
    }

    #[test]
    fn applies_to_protected_tree() {
        let root = doc();
        let ops = from_json_patch(&json!([
            {"op": "replace", "path": "/title", "value": "u"},
            {"op": "add", "path": "/list/-", "value": 3},
            {"op": "remove", "path": "/meta/a"},
            {"op": "add", "path": "/meta/b", "value": "y"}
        ]))
        .unwrap();
        apply_patch(&root, &ops).unwrap();
        assert_eq!(
            root.snapshot().unwrap(),
            json!({"title": "u", "list": [1, 2, 3], "meta": {"b": "y"}})
        );
    }

    #[test]
    fn paths_are_relative_to_target() {
        let root = doc();
        let list = root.child("list").unwrap();
        let ops = from_json_patch(&json!([{"op": "move", "from": "/0", "path": "/1"}])).unwrap();
        apply_patch(&list, &ops).unwrap();
        assert_eq!(list.snapshot().unwrap(), json!([2, 1]));
    }

    #[test]
    fn failed_test_op_is_reported() {
        let root = doc();
        let ops = from_json_patch(&json!([{"op": "test", "path": "/title", "value": "zzz"}])).unwrap();
        assert_eq!(
            apply_patch(&root, &ops),
            Err(TreeError::Patch(PatchError::Test))
        );
    }

    #[test]
    fn replace_missing_map_key_fails() {
        let root = doc();
        let ops = from_json_patch(&json!([{"op": "replace", "path": "/meta/zz", "value": "v"}])).unwrap();
        assert_eq!(
            apply_patch(&root, &ops),
            Err(TreeError::Patch(PatchError::NotFound))
        );
    }

    #[test]
    fn snapshot_keeps_root_identity() {
        let root = doc();
        let handle = root.clone();
        apply_snapshot(&root, json!({"title": "n", "list": [], "meta": {}})).unwrap();
        assert_eq!(handle.get("title").unwrap(), json!("n"));
        assert!(matches!(
            apply_snapshot(&root, json!({"title": 1, "list": [], "meta": {}})),
            Err(TreeError::TypeValidation(_))
        ));
        assert_eq!(handle.get("title").unwrap(), json!("n"));
    }
}
