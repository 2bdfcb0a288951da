#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use statetree::{on_action, ActionEvent, Disposer, Node, RunMode};

#[derive(Clone, Default)]
pub struct Captured(Rc<RefCell<Vec<ActionEvent>>>);

impl Captured {
    pub fn events(&self) -> Vec<ActionEvent> {
        self.0.borrow().clone()
    }

    pub fn modes(&self) -> Vec<RunMode> {
        self.0.borrow().iter().map(|e| e.mode).collect()
    }

    pub fn modes_of(&self, run_id: u64) -> Vec<RunMode> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.context.run_id == run_id)
            .map(|e| e.mode)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().iter().map(|e| e.record.name.clone()).collect()
    }
}

/// Subscribes to every action event under `node`.
pub fn capture_actions(node: &Node) -> (Captured, Disposer) {
    let captured = Captured::default();
    let sink = captured.0.clone();
    let disposer = on_action(node, move |event| sink.borrow_mut().push(event.clone()));
    (captured, disposer)
}
