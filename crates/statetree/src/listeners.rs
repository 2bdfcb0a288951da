//! Action and patch subscriptions.
//!
//! A listener is attached to a node and hears about everything that
//! happens in that node's subtree. Paths in delivered events are rewritten
//! relative to the node the listener is attached to.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use statetree_patch::Op;
use statetree_path::{format_json_pointer, is_within};

use crate::action::ActionEvent;
use crate::tree::{Arena, Node, NodeId, TreeShared};

/// A patch produced by a mutation, with the patch that undoes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchEvent {
    pub patch: Op,
    pub inverse: Option<Op>,
}

type ActionListener = Rc<dyn Fn(&ActionEvent)>;
type PatchListener = Rc<dyn Fn(&PatchEvent)>;

#[derive(Clone)]
enum Listener {
    Action(ActionListener),
    Patch(PatchListener),
}

#[derive(Clone)]
struct Entry {
    scope: NodeId,
    listener: Listener,
}

/// Subscriptions of one tree, keyed by subscription id in registration
/// order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: Cell<u64>,
    entries: RefCell<BTreeMap<u64, Entry>>,
}

impl ListenerRegistry {
    fn add(&self, scope: NodeId, listener: Listener) -> u64 {
        let id = self.next_id.get().saturating_add(1);
        self.next_id.set(id);
        self.entries.borrow_mut().insert(id, Entry { scope, listener });
        id
    }

    fn remove(&self, id: u64) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }

    fn is_subscribed(&self, id: u64) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    /// Copies the current subscriptions so listeners can subscribe or
    /// dispose while an event is being delivered. Listeners added during
    /// delivery miss the event in flight; listeners disposed during
    /// delivery are skipped.
    fn current(&self) -> Vec<(u64, Entry)> {
        self.entries
            .borrow()
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    /// Path of a listener's scope, if the listener should still receive
    /// events and the event at `path` lies inside its scope.
    fn scope_path(
        &self,
        arena: &RefCell<Arena>,
        id: u64,
        scope: NodeId,
        path: &[String],
    ) -> Option<Vec<String>> {
        if !self.is_subscribed(id) {
            return None;
        }
        let scope_path = arena.borrow().path_of(scope)?;
        is_within(&scope_path, path).then_some(scope_path)
    }

    pub(crate) fn publish_action(
        &self,
        arena: &RefCell<Arena>,
        acting: &[String],
        event: &ActionEvent,
    ) {
        for (id, entry) in self.current() {
            let Listener::Action(listener) = &entry.listener else {
                continue;
            };
            let Some(scope_path) = self.scope_path(arena, id, entry.scope, acting) else {
                continue;
            };
            let mut scoped = event.clone();
            scoped.record.path = format_json_pointer(&acting[scope_path.len()..]);
            listener(&scoped);
        }
    }

    pub(crate) fn publish_patch(&self, arena: &RefCell<Arena>, op: &Op) {
        let inverse = op.invert();
        for (id, entry) in self.current() {
            let Listener::Patch(listener) = &entry.listener else {
                continue;
            };
            let Some(scope_path) = self.scope_path(arena, id, entry.scope, op.path()) else {
                continue;
            };
            let depth = scope_path.len();
            listener(&PatchEvent {
                patch: op.rebase(depth),
                inverse: inverse.as_ref().map(|inv| inv.rebase(depth)),
            });
        }
    }
}

/// Cancels a subscription. Dropping a `Disposer` leaves the listener
/// subscribed.
#[derive(Clone)]
pub struct Disposer {
    tree: Weak<TreeShared>,
    id: u64,
}

impl Disposer {
    /// Unsubscribes the listener. Returns `false` if it was already
    /// disposed or the tree is gone.
    pub fn dispose(&self) -> bool {
        let removed = self
            .tree
            .upgrade()
            .is_some_and(|tree| tree.listeners.remove(self.id));
        if removed {
            tracing::trace!(subscription = self.id, "listener disposed");
        }
        removed
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}

fn subscribe(node: &Node, listener: Listener) -> Disposer {
    let id = node.tree.listeners.add(node.id(), listener);
    tracing::trace!(subscription = id, "listener added");
    Disposer {
        tree: Rc::downgrade(&node.tree),
        id,
    }
}

/// Calls `listener` for every outermost action invoked on `node` or its
/// descendants, before the action body runs.
pub fn on_action(node: &Node, listener: impl Fn(&ActionEvent) + 'static) -> Disposer {
    subscribe(node, Listener::Action(Rc::new(listener)))
}

/// Calls `listener` after every mutation inside `node`'s subtree.
pub fn on_patch(node: &Node, listener: impl Fn(&PatchEvent) + 'static) -> Disposer {
    subscribe(node, Listener::Patch(Rc::new(listener)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeOptions;
    use crate::types::{array, map, string, ModelType};
    use serde_json::{json, Value};

    fn open_tree() -> Node {
        ModelType::builder("Root")
            .prop("a", map(string()))
            .prop("b", array(string()))
            .action("touch", |cx, _args| {
                cx.node().child("b")?.push("t")?;
                Ok(Value::Null)
            })
            .build()
            .create_with(json!({"a": {}, "b": []}), TreeOptions { protected: false })
            .unwrap()
    }

    #[test]
    fn patches_are_scoped_and_rebased() {
        let root = open_tree();
        let a = root.child("a").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = on_patch(&a, move |event| sink.borrow_mut().push(event.clone()));

        a.set("k", "v").unwrap();
        root.child("b").unwrap().push("x").unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].patch,
            Op::Add {
                path: vec!["k".into()],
                value: json!("v")
            }
        );
        assert_eq!(
            seen[0].inverse,
            Some(Op::Remove {
                path: vec!["k".into()],
                old_value: Some(json!("v"))
            })
        );
    }

    #[test]
    fn dispose_stops_delivery() {
        let root = open_tree();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let sub = on_patch(&root, move |_| counter.set(counter.get() + 1));
        root.child("b").unwrap().push("x").unwrap();
        assert!(sub.dispose());
        assert!(!sub.dispose());
        root.child("b").unwrap().push("y").unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disposing_a_later_listener_mid_delivery_skips_it() {
        let root = open_tree();
        let later_calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Disposer>>> = Rc::new(RefCell::new(None));

        let target = slot.clone();
        let _first = on_patch(&root, move |_| {
            if let Some(d) = target.borrow().as_ref() {
                d.dispose();
            }
        });
        let calls = later_calls.clone();
        let second = on_patch(&root, move |_| calls.set(calls.get() + 1));
        *slot.borrow_mut() = Some(second);

        root.child("b").unwrap().push("x").unwrap();
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn listener_added_mid_delivery_waits_for_next_event() {
        let root = open_tree();
        let late_calls = Rc::new(Cell::new(0));
        let added = Rc::new(Cell::new(false));

        let handle = root.clone();
        let calls = late_calls.clone();
        let flag = added.clone();
        let _outer = on_patch(&root, move |_| {
            if !flag.replace(true) {
                let calls = calls.clone();
                let _ = on_patch(&handle, move |_| calls.set(calls.get() + 1));
            }
        });

        root.child("b").unwrap().push("x").unwrap();
        assert_eq!(late_calls.get(), 0);
        root.child("b").unwrap().push("y").unwrap();
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn disposing_a_later_action_listener_mid_delivery_skips_it() {
        let root = open_tree();
        let later_calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Disposer>>> = Rc::new(RefCell::new(None));

        let target = slot.clone();
        let _first = on_action(&root, move |_| {
            if let Some(d) = target.borrow().as_ref() {
                d.dispose();
            }
        });
        let calls = later_calls.clone();
        let second = on_action(&root, move |_| calls.set(calls.get() + 1));
        *slot.borrow_mut() = Some(second);

        root.call("touch", vec![]).unwrap();
        assert_eq!(later_calls.get(), 0);
        root.call("touch", vec![]).unwrap();
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn action_listener_added_mid_delivery_waits_for_next_event() {
        let root = open_tree();
        let late_calls = Rc::new(Cell::new(0));
        let added = Rc::new(Cell::new(false));

        let handle = root.clone();
        let calls = late_calls.clone();
        let flag = added.clone();
        let _outer = on_action(&root, move |_| {
            if !flag.replace(true) {
                let calls = calls.clone();
                let _ = on_action(&handle, move |_| calls.set(calls.get() + 1));
            }
        });

        root.call("touch", vec![]).unwrap();
        assert_eq!(late_calls.get(), 0);
        root.call("touch", vec![]).unwrap();
        assert_eq!(late_calls.get(), 1);
        assert_eq!(root.get("b").unwrap(), json!(["t", "t"]));
    }
}
