use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use statetree_patch::Op;
use statetree_path::{format_json_pointer, parse_json_pointer};

use super::{Arena, NodeId, TreeOptions, TreeShared};
use crate::action;
use crate::args::Arg;
use crate::error::{TreeError, TypeValidationError};
use crate::flow::{self, FlowHandle};
use crate::types::{ActionDef, Type};

/// Handle to a node of a live tree.
///
/// Handles are cheap to clone. A handle outlives its node: once the node is
/// removed from the tree, every accessor reports [`TreeError::DeadNode`].
#[derive(Clone)]
pub struct Node {
    pub(crate) tree: Rc<TreeShared>,
    pub(crate) id: NodeId,
}

/// Result of dispatching an action by name.
pub enum Outcome {
    /// A synchronous action finished with this value.
    Done(Value),
    /// An async action started; the handle completes with its final value.
    Pending(FlowHandle),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    /// Waits for the action to finish.
    pub async fn settle(self) -> Result<Value, TreeError> {
        match self {
            Outcome::Done(value) => Ok(value),
            Outcome::Pending(handle) => handle.await,
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done(value) => f.debug_tuple("Done").field(value).finish(),
            Outcome::Pending(handle) => f.debug_tuple("Pending").field(&handle.run_id()).finish(),
        }
    }
}

impl Node {
    pub(crate) fn new_root(ty: &Type, snapshot: Value, options: TreeOptions) -> Node {
        let arena = Arena::with_root(ty, snapshot);
        let id = arena.root();
        Node {
            tree: Rc::new(TreeShared::new(arena, options)),
            id,
        }
    }

    fn at(&self, id: NodeId) -> Node {
        Node {
            tree: self.tree.clone(),
            id,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.tree.arena.borrow().contains(self.id)
    }

    /// True when both handles belong to the same tree.
    pub fn is_same_tree(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree)
    }

    pub fn root(&self) -> Node {
        let root = self.tree.arena.borrow().root();
        self.at(root)
    }

    pub fn is_root(&self) -> bool {
        self.tree.arena.borrow().root() == self.id
    }

    pub fn parent(&self) -> Result<Option<Node>, TreeError> {
        let arena = self.tree.arena.borrow();
        let data = arena.get(self.id).ok_or(TreeError::DeadNode)?;
        Ok(data.parent.map(|id| self.at(id)))
    }

    /// Path from the root, one unescaped segment per step.
    pub fn path_segments(&self) -> Result<Vec<String>, TreeError> {
        self.tree.arena.borrow().path_of(self.id).ok_or(TreeError::DeadNode)
    }

    /// Path from the root as a JSON pointer; the root is `""`.
    pub fn path(&self) -> Result<String, TreeError> {
        Ok(format_json_pointer(&self.path_segments()?))
    }

    pub fn node_type(&self) -> Result<Type, TreeError> {
        let arena = self.tree.arena.borrow();
        let data = arena.get(self.id).ok_or(TreeError::DeadNode)?;
        Ok(data.ty.clone())
    }

    pub fn type_name(&self) -> Result<String, TreeError> {
        Ok(self.node_type()?.to_string())
    }

    /// Immutable plain-data image of this subtree.
    pub fn snapshot(&self) -> Result<Value, TreeError> {
        let arena = self.tree.arena.borrow();
        if !arena.contains(self.id) {
            return Err(TreeError::DeadNode);
        }
        Ok(arena.snapshot(self.id))
    }

    fn missing(&self, key: &str) -> TreeError {
        match self.path() {
            Ok(path) => TreeError::UnknownProperty {
                path,
                key: key.to_string(),
            },
            Err(err) => err,
        }
    }

    /// Plain value stored under `key`. Child nodes are returned as their
    /// snapshot and references as the stored identifier.
    pub fn get(&self, key: &str) -> Result<Value, TreeError> {
        let arena = self.tree.arena.borrow();
        match arena.child_slot(self.id, key) {
            Some(slot) => Ok(arena.slot_value(slot)),
            None => Err(self.missing(key)),
        }
    }

    /// Child node stored under `key`.
    pub fn child(&self, key: &str) -> Result<Node, TreeError> {
        let arena = self.tree.arena.borrow();
        match arena.child_slot(self.id, key) {
            Some(super::arena::Slot::Node(id)) => Ok(self.at(*id)),
            Some(super::arena::Slot::Leaf(_)) => {
                let mut path = arena.path_of(self.id).ok_or(TreeError::DeadNode)?;
                path.push(key.to_string());
                Err(TreeError::WrongKind {
                    path: format_json_pointer(&path),
                    expected: "a node",
                })
            }
            None => Err(self.missing(key)),
        }
    }

    /// Follows the reference stored under `key`. `Ok(None)` when the slot
    /// holds null.
    pub fn get_ref(&self, key: &str) -> Result<Option<Node>, TreeError> {
        let ty = self
            .tree
            .arena
            .borrow()
            .slot_type(self.id, key)
            .ok_or_else(|| self.missing(key))?;
        let target = match &ty {
            Type::Maybe(inner) | Type::Optional(inner, _) => inner.reference_target(),
            other => other.reference_target(),
        };
        let model = target
            .and_then(Type::as_model)
            .ok_or_else(|| TreeError::WrongKind {
                path: self.path().unwrap_or_default(),
                expected: "a reference",
            })?
            .clone();
        let identifier = self.get(key)?;
        if identifier.is_null() {
            return Ok(None);
        }
        let found = self.tree.arena.borrow().find_by_identifier(&model, &identifier);
        match found {
            Some(id) => Ok(Some(self.at(id))),
            None => Err(TreeError::UnresolvedReference {
                type_name: model.name().to_string(),
                identifier: identifier.to_string(),
            }),
        }
    }

    pub fn len(&self) -> Result<usize, TreeError> {
        self.tree.arena.borrow().len(self.id).ok_or(TreeError::DeadNode)
    }

    pub fn is_empty(&self) -> Result<bool, TreeError> {
        Ok(self.len()? == 0)
    }

    /// Property names, map keys or array indices, in order.
    pub fn keys(&self) -> Result<Vec<String>, TreeError> {
        self.tree.arena.borrow().keys(self.id).ok_or(TreeError::DeadNode)
    }

    pub fn identifier(&self) -> Option<Value> {
        self.tree.arena.borrow().identifier_of(self.id)
    }

    pub fn resolve_segments(&self, path: &[String]) -> Result<Node, TreeError> {
        let found = self.tree.arena.borrow().resolve(self.id, path);
        match found {
            Some(id) => Ok(self.at(id)),
            None if !self.is_alive() => Err(TreeError::DeadNode),
            None => Err(TreeError::PathNotFound {
                path: format_json_pointer(path),
            }),
        }
    }

    /// Resolves a JSON pointer relative to this node.
    pub fn resolve_path(&self, pointer: &str) -> Result<Node, TreeError> {
        self.resolve_segments(&parse_json_pointer(pointer))
    }

    pub fn try_resolve(&self, pointer: &str) -> Option<Node> {
        self.resolve_path(pointer).ok()
    }

    /// Resolves a `../`-style path against this node's position.
    pub fn resolve_relative(&self, relative: &str) -> Result<Node, TreeError> {
        let base = self.path_segments()?;
        let target = statetree_path::resolve_relative(&base, relative)?;
        self.root().resolve_segments(&target)
    }

    /// Relative path leading from this node to `other`.
    pub fn relative_path_to(&self, other: &Node) -> Result<String, TreeError> {
        Ok(statetree_path::relative_path(
            &self.path_segments()?,
            &other.path_segments()?,
        ))
    }

    /// Creates an independent tree from this node's snapshot.
    pub fn clone_tree(&self) -> Result<Node, TreeError> {
        let options = TreeOptions {
            protected: self.tree.is_protected(),
        };
        self.node_type()?.create_with(self.snapshot()?, options)
    }

    pub fn set_protected(&self, protected: bool) {
        self.tree.set_protected(protected);
    }

    pub fn is_protected(&self) -> bool {
        self.tree.is_protected()
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Writes `value` under `key`: a model property, a map entry or an
    /// existing array index.
    pub fn set(&self, key: &str, value: impl Into<Arg>) -> Result<(), TreeError> {
        self.set_slot(key, value.into()).map(drop)
    }

    pub fn push(&self, value: impl Into<Arg>) -> Result<(), TreeError> {
        let len = self.len()?;
        self.insert(len, value)
    }

    pub fn insert(&self, index: usize, value: impl Into<Arg>) -> Result<(), TreeError> {
        self.insert_slot(index, value.into()).map(drop)
    }

    /// Removes and returns the array element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<Value, TreeError> {
        self.delete(&index.to_string())
    }

    /// Removes an array element or map entry and returns its last value.
    pub fn delete(&self, key: &str) -> Result<Value, TreeError> {
        match self.remove_slot(key)? {
            Op::Remove {
                old_value: Some(old),
                ..
            } => Ok(old),
            _ => Ok(Value::Null),
        }
    }

    pub(crate) fn set_slot(&self, key: &str, value: Arg) -> Result<Op, TreeError> {
        let value = self.incoming(key, value)?;
        self.write(|arena, id| arena.set(id, key, value))
    }

    pub(crate) fn insert_slot(&self, index: usize, value: Arg) -> Result<Op, TreeError> {
        let value = self.incoming(&index.to_string(), value)?;
        self.write(|arena, id| arena.insert(id, index, value))
    }

    pub(crate) fn remove_slot(&self, key: &str) -> Result<Op, TreeError> {
        self.write(|arena, id| arena.remove(id, key))
    }

    pub(crate) fn replace_content(&self, value: Value) -> Result<Op, TreeError> {
        self.write(|arena, id| arena.replace_content(id, value))
    }

    fn write(
        &self,
        edit: impl FnOnce(&mut Arena, NodeId) -> Result<Op, TreeError>,
    ) -> Result<Op, TreeError> {
        if self.tree.is_protected() && !self.tree.in_action() {
            return Err(TreeError::Protected { path: self.path()? });
        }
        let op = edit(&mut *self.tree.arena.borrow_mut(), self.id)?;
        self.tree.listeners.publish_patch(&self.tree.arena, &op);
        Ok(op)
    }

    /// Converts an argument into the plain value stored under `key`.
    /// Nodes are accepted only by reference slots and are stored as their
    /// identifier.
    fn incoming(&self, key: &str, value: Arg) -> Result<Value, TreeError> {
        let slot_ty = self
            .tree
            .arena
            .borrow()
            .slot_type(self.id, key)
            .ok_or_else(|| {
                if self.is_alive() {
                    self.missing(key)
                } else {
                    TreeError::DeadNode
                }
            })?;
        let mismatch = |actual: String| -> Result<TreeError, TreeError> {
            let mut path = self.path_segments()?;
            path.push(key.to_string());
            Ok(TypeValidationError {
                path: format_json_pointer(&path),
                expected: slot_ty.to_string(),
                actual,
            }
            .into())
        };
        let target = match &slot_ty {
            Type::Maybe(inner) | Type::Optional(inner, _) => inner.reference_target(),
            other => other.reference_target(),
        };
        match (target.and_then(Type::as_model), value) {
            (Some(model), Arg::Node(node)) => {
                if !self.is_same_tree(&node) {
                    return Err(mismatch("a node of another tree".to_string())?);
                }
                let node_ty = node.node_type()?;
                match (node_ty.as_model(), node.identifier()) {
                    (Some(m), Some(identifier)) if Rc::ptr_eq(m, model) => Ok(identifier),
                    _ => Err(mismatch(node_ty.to_string())?),
                }
            }
            (_, Arg::Node(_)) => Err(mismatch("a tree node".to_string())?),
            (_, other) => match other.to_plain_value() {
                Ok(value) => Ok(value),
                Err(kind) => Err(mismatch(kind)?),
            },
        }
    }

    // ── Actions ───────────────────────────────────────────────────────────

    fn action_def(&self, name: &str) -> Result<ActionDef, TreeError> {
        let ty = self.node_type()?;
        ty.as_model()
            .and_then(|model| model.action(name).cloned())
            .ok_or_else(|| TreeError::UnknownAction {
                type_name: ty.to_string(),
                name: name.to_string(),
            })
    }

    /// Runs a synchronous action.
    pub fn call(&self, name: &str, args: Vec<Arg>) -> Result<Value, TreeError> {
        match self.action_def(name)? {
            ActionDef::Sync(body) => action::invoke(self, name, &body, args),
            ActionDef::Flow(_) => Err(TreeError::ActionKind {
                name: name.to_string(),
                usage: "called synchronously, it is asynchronous",
            }),
        }
    }

    /// Starts an async action. Its first segment runs before this returns.
    pub fn spawn(&self, name: &str, args: Vec<Arg>) -> Result<FlowHandle, TreeError> {
        match self.action_def(name)? {
            ActionDef::Flow(factory) => flow::start(self, name, &factory, args),
            ActionDef::Sync(_) => Err(TreeError::ActionKind {
                name: name.to_string(),
                usage: "spawned, it is synchronous",
            }),
        }
    }

    /// Runs an action of either kind.
    pub fn dispatch(&self, name: &str, args: Vec<Arg>) -> Result<Outcome, TreeError> {
        match self.action_def(name)? {
            ActionDef::Sync(body) => action::invoke(self, name, &body, args).map(Outcome::Done),
            ActionDef::Flow(factory) => flow::start(self, name, &factory, args).map(Outcome::Pending),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_tree(other) && self.id == other.id
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Ok(path) => write!(f, "Node({path:?})"),
            Err(_) => f.write_str("Node(<dead>)"),
        }
    }
}
