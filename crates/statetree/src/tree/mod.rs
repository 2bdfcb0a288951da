//! Live trees of model, array and map nodes.

mod arena;
mod node;
mod patch;

use std::cell::{Cell, RefCell};

pub use arena::NodeId;
pub(crate) use arena::Arena;
pub use node::{Node, Outcome};
pub use patch::{apply_patch, apply_snapshot};

use crate::listeners::ListenerRegistry;

/// Options applied when a tree is created.
#[derive(Debug, Clone)]
pub struct TreeOptions {
    /// When set, mutations are only accepted while an action of this tree
    /// is running.
    pub protected: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self { protected: true }
    }
}

/// State shared by every [`Node`] handle of one tree.
pub(crate) struct TreeShared {
    pub(crate) arena: RefCell<Arena>,
    pub(crate) listeners: ListenerRegistry,
    depth: Cell<usize>,
    next_run_id: Cell<u64>,
    protected: Cell<bool>,
}

impl TreeShared {
    fn new(arena: Arena, options: TreeOptions) -> Self {
        Self {
            arena: RefCell::new(arena),
            listeners: ListenerRegistry::default(),
            depth: Cell::new(0),
            next_run_id: Cell::new(0),
            protected: Cell::new(options.protected),
        }
    }

    /// True while any action segment of this tree is executing.
    pub(crate) fn in_action(&self) -> bool {
        self.depth.get() > 0
    }

    pub(crate) fn next_run_id(&self) -> u64 {
        let id = self.next_run_id.get() + 1;
        self.next_run_id.set(id);
        id
    }

    pub(crate) fn is_protected(&self) -> bool {
        self.protected.get()
    }

    pub(crate) fn set_protected(&self, protected: bool) {
        self.protected.set(protected);
    }

    /// Marks an action segment as running until the guard is dropped.
    pub(crate) fn enter(&self) -> ActionScope<'_> {
        self.depth.set(self.depth.get() + 1);
        ActionScope(self)
    }
}

pub(crate) struct ActionScope<'a>(&'a TreeShared);

impl Drop for ActionScope<'_> {
    fn drop(&mut self) {
        self.0.depth.set(self.0.depth.get().saturating_sub(1));
    }
}
