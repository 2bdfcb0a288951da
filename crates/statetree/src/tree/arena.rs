//! Node storage. Each node owns its content slots; a slot is either a leaf
//! JSON value or the id of a child node. Paths are derived by walking parent
//! links, so they always reflect the current position of a node.

use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;
use statetree_patch::{Op, PatchError};
use statetree_path::format_json_pointer;

use crate::error::TreeError;
use crate::types::{ModelType, Type};

/// Stable identity of a node for its whole lifetime. Ids are never reused
/// within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Leaf(Value),
    Node(NodeId),
}

pub(crate) enum Content {
    Model(IndexMap<String, Slot>),
    Array(Vec<Slot>),
    Map(IndexMap<String, Slot>),
}

impl Content {
    fn children(&self) -> Vec<NodeId> {
        let ids = |slot: &Slot| match slot {
            Slot::Node(id) => Some(*id),
            Slot::Leaf(_) => None,
        };
        match self {
            Content::Model(props) | Content::Map(props) => props.values().filter_map(ids).collect(),
            Content::Array(items) => items.iter().filter_map(ids).collect(),
        }
    }
}

pub(crate) struct NodeData {
    pub parent: Option<NodeId>,
    pub ty: Type,
    pub content: Content,
}

pub(crate) struct Arena {
    nodes: BTreeMap<NodeId, NodeData>,
    next_id: u64,
    root: NodeId,
}

fn join(base: &[String], key: &str) -> Vec<String> {
    let mut path = base.to_vec();
    path.push(key.to_string());
    path
}

fn array_index(key: &str, len: usize) -> Result<usize, TreeError> {
    if !statetree_path::is_valid_index(key) {
        return Err(PatchError::InvalidIndex.into());
    }
    let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex)?;
    if idx >= len {
        return Err(PatchError::NotFound.into());
    }
    Ok(idx)
}

impl Arena {
    /// Builds a tree for an already validated snapshot.
    pub fn with_root(ty: &Type, snapshot: Value) -> Self {
        let mut arena = Arena {
            nodes: BTreeMap::new(),
            next_id: 0,
            root: NodeId(0),
        };
        arena.root = arena.alloc_node(ty, snapshot, None);
        arena
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    // ── Construction ──────────────────────────────────────────────────────

    fn alloc_node(&mut self, ty: &Type, value: Value, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeData {
                parent,
                ty: ty.clone(),
                content: Content::Array(Vec::new()),
            },
        );
        let content = self.build_content(id, ty, value);
        if let Some(data) = self.nodes.get_mut(&id) {
            data.content = content;
        }
        id
    }

    fn build(&mut self, ty: &Type, value: Option<Value>, parent: Option<NodeId>) -> Slot {
        match ty {
            Type::Optional(inner, default) => {
                let value = value.unwrap_or_else(|| default.clone());
                self.build(inner, Some(value), parent)
            }
            Type::Maybe(inner) => match value {
                None | Some(Value::Null) => Slot::Leaf(Value::Null),
                present => self.build(inner, present, parent),
            },
            Type::Model(_) | Type::Array(_) | Type::Map(_) => {
                Slot::Node(self.alloc_node(ty, value.unwrap_or(Value::Null), parent))
            }
            _ => Slot::Leaf(value.unwrap_or(Value::Null)),
        }
    }

    fn build_content(&mut self, id: NodeId, ty: &Type, value: Value) -> Content {
        match (ty, value) {
            (Type::Model(model), value) => {
                let mut props = match value {
                    Value::Object(props) => props,
                    _ => serde_json::Map::new(),
                };
                let mut slots = IndexMap::with_capacity(model.properties().len());
                for (key, prop_ty) in model.properties() {
                    let slot = self.build(prop_ty, props.swap_remove(key), Some(id));
                    slots.insert(key.clone(), slot);
                }
                Content::Model(slots)
            }
            (Type::Array(item), Value::Array(items)) => Content::Array(
                items
                    .into_iter()
                    .map(|v| self.build(item, Some(v), Some(id)))
                    .collect(),
            ),
            (Type::Map(item), Value::Object(entries)) => Content::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, self.build(item, Some(v), Some(id))))
                    .collect(),
            ),
            (Type::Array(_), _) => Content::Array(Vec::new()),
            _ => Content::Map(IndexMap::new()),
        }
    }

    fn free_slot(&mut self, slot: &Slot) {
        if let Slot::Node(id) = slot {
            self.free_node(*id);
        }
    }

    fn free_node(&mut self, id: NodeId) {
        if let Some(data) = self.nodes.remove(&id) {
            for child in data.content.children() {
                self.free_node(child);
            }
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn slot_value(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Leaf(value) => value.clone(),
            Slot::Node(id) => self.snapshot(*id),
        }
    }

    /// Computes the snapshot of `id` from live state.
    pub fn snapshot(&self, id: NodeId) -> Value {
        let Some(data) = self.nodes.get(&id) else {
            return Value::Null;
        };
        match &data.content {
            Content::Model(props) | Content::Map(props) => Value::Object(
                props
                    .iter()
                    .map(|(k, slot)| (k.clone(), self.slot_value(slot)))
                    .collect(),
            ),
            Content::Array(items) => {
                Value::Array(items.iter().map(|slot| self.slot_value(slot)).collect())
            }
        }
    }

    fn key_in_parent(&self, parent: NodeId, child: NodeId) -> Option<String> {
        let is_child = |slot: &Slot| matches!(slot, Slot::Node(c) if *c == child);
        match &self.nodes.get(&parent)?.content {
            Content::Model(props) | Content::Map(props) => props
                .iter()
                .find(|(_, slot)| is_child(slot))
                .map(|(key, _)| key.clone()),
            Content::Array(items) => items.iter().position(is_child).map(|i| i.to_string()),
        }
    }

    /// Root-relative path of a live node; `None` once the node is gone.
    pub fn path_of(&self, id: NodeId) -> Option<Vec<String>> {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes.get(&current)?.parent {
            segments.push(self.key_in_parent(parent, current)?);
            current = parent;
        }
        segments.reverse();
        Some(segments)
    }

    pub fn child_slot(&self, id: NodeId, key: &str) -> Option<&Slot> {
        match &self.nodes.get(&id)?.content {
            Content::Model(props) | Content::Map(props) => props.get(key),
            Content::Array(items) => {
                if !statetree_path::is_valid_index(key) {
                    return None;
                }
                items.get(key.parse::<usize>().ok()?)
            }
        }
    }

    pub fn resolve(&self, from: NodeId, path: &[String]) -> Option<NodeId> {
        let mut current = from;
        for step in path {
            match self.child_slot(current, step)? {
                Slot::Node(child) => current = *child,
                Slot::Leaf(_) => return None,
            }
        }
        self.contains(current).then_some(current)
    }

    /// Declared type of the slot at `key` (element type for arrays and maps).
    pub fn slot_type(&self, id: NodeId, key: &str) -> Option<Type> {
        match &self.nodes.get(&id)?.ty {
            Type::Model(model) => model.property(key).cloned(),
            Type::Array(item) | Type::Map(item) => Some((**item).clone()),
            _ => None,
        }
    }

    pub fn len(&self, id: NodeId) -> Option<usize> {
        Some(match &self.nodes.get(&id)?.content {
            Content::Model(props) | Content::Map(props) => props.len(),
            Content::Array(items) => items.len(),
        })
    }

    pub fn keys(&self, id: NodeId) -> Option<Vec<String>> {
        Some(match &self.nodes.get(&id)?.content {
            Content::Model(props) | Content::Map(props) => props.keys().cloned().collect(),
            Content::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        })
    }

    /// Identifier value of a model node, if its model declares one.
    pub fn identifier_of(&self, id: NodeId) -> Option<Value> {
        let data = self.nodes.get(&id)?;
        let key = data.ty.as_model()?.identifier_key()?;
        match &data.content {
            Content::Model(props) => match props.get(key)? {
                Slot::Leaf(value) => Some(value.clone()),
                Slot::Node(_) => None,
            },
            _ => None,
        }
    }

    pub fn find_by_identifier(&self, model: &Rc<ModelType>, identifier: &Value) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, data)| matches!(&data.ty, Type::Model(m) if Rc::ptr_eq(m, model)))
            .map(|(id, _)| *id)
            .find(|id| self.identifier_of(*id).as_ref() == Some(identifier))
    }

    // ── Mutations ─────────────────────────────────────────────────────────
    //
    // Each mutation validates first, then edits, then returns the patch
    // that describes the edit with a root-relative path.

    fn located(&self, id: NodeId) -> Result<(Vec<String>, &NodeData), TreeError> {
        let data = self.nodes.get(&id).ok_or(TreeError::DeadNode)?;
        let base = self.path_of(id).ok_or(TreeError::DeadNode)?;
        Ok((base, data))
    }

    /// Sets a model property, a map entry (adding it if absent) or an
    /// existing array element.
    pub fn set(&mut self, id: NodeId, key: &str, value: Value) -> Result<Op, TreeError> {
        let (base, data) = self.located(id)?;
        let path = join(&base, key);
        let ty = self.slot_type(id, key).ok_or_else(|| TreeError::UnknownProperty {
            path: format_json_pointer(&base),
            key: key.to_string(),
        })?;
        ty.validate(&value, &format_json_pointer(&path))?;
        let (existing, index) = match &data.content {
            Content::Model(props) | Content::Map(props) => (props.get(key).cloned(), None),
            Content::Array(items) => {
                let idx = array_index(key, items.len())?;
                (Some(items[idx].clone()), Some(idx))
            }
        };

        let old_value = existing.as_ref().map(|slot| self.slot_value(slot));
        if let Some(old) = &existing {
            self.free_slot(old);
        }
        let slot = self.build(&ty, Some(value), Some(id));
        let new_value = self.slot_value(&slot);
        match (self.content_mut(id)?, index) {
            (Content::Array(items), Some(idx)) => items[idx] = slot,
            (Content::Model(props) | Content::Map(props), _) => {
                props.insert(key.to_string(), slot);
            }
            _ => return Err(PatchError::InvalidTarget.into()),
        }
        Ok(match old_value {
            Some(old) => Op::Replace {
                path,
                value: new_value,
                old_value: Some(old),
            },
            None => Op::Add {
                path,
                value: new_value,
            },
        })
    }

    pub fn insert(&mut self, id: NodeId, index: usize, value: Value) -> Result<Op, TreeError> {
        let (base, data) = self.located(id)?;
        let Content::Array(items) = &data.content else {
            return Err(TreeError::WrongKind {
                path: format_json_pointer(&base),
                expected: "an array",
            });
        };
        if index > items.len() {
            return Err(PatchError::InvalidIndex.into());
        }
        let path = join(&base, &index.to_string());
        let ty = self.slot_type(id, "").ok_or(TreeError::DeadNode)?;
        ty.validate(&value, &format_json_pointer(&path))?;
        let slot = self.build(&ty, Some(value), Some(id));
        let new_value = self.slot_value(&slot);
        if let Content::Array(items) = self.content_mut(id)? {
            items.insert(index, slot);
        }
        Ok(Op::Add {
            path,
            value: new_value,
        })
    }

    /// Removes an array element or a map entry.
    pub fn remove(&mut self, id: NodeId, key: &str) -> Result<Op, TreeError> {
        let base = self.path_of(id).ok_or(TreeError::DeadNode)?;
        let removed = match self.content_mut(id)? {
            Content::Array(items) => {
                let idx = array_index(key, items.len())?;
                items.remove(idx)
            }
            Content::Map(props) => props.shift_remove(key).ok_or(PatchError::NotFound)?,
            Content::Model(_) => {
                return Err(TreeError::WrongKind {
                    path: format_json_pointer(&base),
                    expected: "an array or a map",
                })
            }
        };
        let old_value = self.slot_value(&removed);
        self.free_slot(&removed);
        Ok(Op::Remove {
            path: join(&base, key),
            old_value: Some(old_value),
        })
    }

    /// Brings the content of `id` in line with a snapshot. Child nodes whose
    /// kind and identifier still match are updated in place and keep their
    /// ids; the rest are released and rebuilt.
    pub fn replace_content(&mut self, id: NodeId, value: Value) -> Result<Op, TreeError> {
        let (base, data) = self.located(id)?;
        let ty = data.ty.clone();
        ty.validate(&value, &format_json_pointer(&base))?;
        let old_value = self.snapshot(id);
        self.reconcile_content(id, &ty, value);
        Ok(Op::Replace {
            path: base,
            value: self.snapshot(id),
            old_value: Some(old_value),
        })
    }

    fn reconcile_content(&mut self, id: NodeId, ty: &Type, value: Value) {
        let Some(data) = self.nodes.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut data.content, Content::Array(Vec::new()));
        let content = match (ty, previous, value) {
            (Type::Model(model), Content::Model(mut slots), value) => {
                let mut props = match value {
                    Value::Object(props) => props,
                    _ => serde_json::Map::new(),
                };
                let mut next = IndexMap::with_capacity(model.properties().len());
                for (key, prop_ty) in model.properties() {
                    let slot = self.reconcile_slot(
                        slots.swap_remove(key),
                        prop_ty,
                        props.swap_remove(key),
                        id,
                    );
                    next.insert(key.clone(), slot);
                }
                for stale in slots.values() {
                    self.free_slot(stale);
                }
                Content::Model(next)
            }
            (Type::Array(item), Content::Array(slots), Value::Array(items)) => {
                let mut slots = slots.into_iter();
                let next = items
                    .into_iter()
                    .map(|v| {
                        let old = slots.next();
                        self.reconcile_slot(old, item, Some(v), id)
                    })
                    .collect();
                for stale in slots {
                    self.free_slot(&stale);
                }
                Content::Array(next)
            }
            (Type::Map(item), Content::Map(mut slots), Value::Object(entries)) => {
                let next = entries
                    .into_iter()
                    .map(|(k, v)| {
                        let old = slots.swap_remove(&k);
                        let slot = self.reconcile_slot(old, item, Some(v), id);
                        (k, slot)
                    })
                    .collect();
                for stale in slots.values() {
                    self.free_slot(stale);
                }
                Content::Map(next)
            }
            (ty, previous, value) => {
                for child in previous.children() {
                    self.free_node(child);
                }
                self.build_content(id, ty, value)
            }
        };
        if let Some(data) = self.nodes.get_mut(&id) {
            data.content = content;
        }
    }

    fn reconcile_slot(
        &mut self,
        old: Option<Slot>,
        ty: &Type,
        value: Option<Value>,
        parent: NodeId,
    ) -> Slot {
        match ty {
            Type::Optional(inner, default) => {
                let value = value.unwrap_or_else(|| default.clone());
                return self.reconcile_slot(old, inner, Some(value), parent);
            }
            Type::Maybe(inner) if !matches!(value, None | Some(Value::Null)) => {
                return self.reconcile_slot(old, inner, value, parent);
            }
            _ => {}
        }
        if let (Some(Slot::Node(child)), Some(value)) = (&old, &value) {
            if self.can_reuse(*child, ty, value) {
                self.reconcile_content(*child, ty, value.clone());
                return Slot::Node(*child);
            }
        }
        if let Some(old) = &old {
            self.free_slot(old);
        }
        self.build(ty, value, Some(parent))
    }

    /// A node is reused when it has the same kind as `ty` and, for models
    /// with an identifier, the snapshot carries the same identifier.
    fn can_reuse(&self, id: NodeId, ty: &Type, value: &Value) -> bool {
        let Some(data) = self.nodes.get(&id) else {
            return false;
        };
        match (&data.ty, ty) {
            (Type::Model(current), Type::Model(next)) => {
                if !Rc::ptr_eq(current, next) {
                    return false;
                }
                match next.identifier_key() {
                    Some(key) => self.identifier_of(id).as_ref() == value.get(key),
                    None => true,
                }
            }
            (Type::Array(_), Type::Array(_)) => value.is_array(),
            (Type::Map(_), Type::Map(_)) => value.is_object(),
            _ => false,
        }
    }

    fn content_mut(&mut self, id: NodeId) -> Result<&mut Content, TreeError> {
        self.nodes
            .get_mut(&id)
            .map(|data| &mut data.content)
            .ok_or(TreeError::DeadNode)
    }
}
