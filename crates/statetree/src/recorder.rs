//! Recording action and patch streams, and replaying them onto other trees.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use statetree_patch::{from_json_patch, Op};

use crate::action::{ActionRecord, RunMode, APPLY_PATCHES, APPLY_SNAPSHOT};
use crate::args::deserialize_arg;
use crate::error::TreeError;
use crate::listeners::{on_action, on_patch, Disposer, PatchEvent};
use crate::tree::{apply_patch, apply_snapshot, Node, Outcome};

/// Collects the outermost action invocations made in a subtree.
pub struct Recorder {
    source: Node,
    log: Rc<RefCell<Vec<ActionRecord>>>,
    subscription: RefCell<Option<Disposer>>,
}

/// Starts recording every outermost action invoked on `node` or below it.
/// Record paths are relative to `node`.
pub fn record_actions(node: &Node) -> Recorder {
    let recorder = Recorder {
        source: node.clone(),
        log: Rc::default(),
        subscription: RefCell::new(None),
    };
    recorder.resume();
    recorder
}

impl Recorder {
    /// Records captured so far, oldest first.
    pub fn actions(&self) -> Vec<ActionRecord> {
        self.log.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.dispose();
            tracing::debug!(records = self.len(), "action recording stopped");
        }
    }

    /// Continues recording after [`stop`](Self::stop). No-op while recording.
    pub fn resume(&self) {
        if self.is_recording() {
            return;
        }
        let log = self.log.clone();
        let disposer = on_action(&self.source, move |event| {
            if event.mode == RunMode::Invoke {
                log.borrow_mut().push(event.record.clone());
            }
        });
        *self.subscription.borrow_mut() = Some(disposer);
        tracing::debug!("action recording started");
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    /// Replays the captured log onto `target`.
    pub async fn replay(&self, target: &Node) -> Result<(), TreeError> {
        replay(&self.actions(), target).await
    }

    /// The log in its JSON wire form.
    pub fn to_json(&self) -> Result<Value, TreeError> {
        log_to_json(&self.log.borrow())
    }
}

pub fn log_to_json(log: &[ActionRecord]) -> Result<Value, TreeError> {
    serde_json::to_value(log).map_err(|err| TreeError::MalformedRecord(err.to_string()))
}

pub fn log_from_json(value: &Value) -> Result<Vec<ActionRecord>, TreeError> {
    Vec::<ActionRecord>::deserialize(value).map_err(|err| TreeError::MalformedRecord(err.to_string()))
}

/// Plain value of the single argument of a built-in record.
fn builtin_payload(record: &ActionRecord) -> Result<Value, TreeError> {
    record
        .args
        .first()
        .and_then(|arg| arg.to_plain())
        .ok_or_else(|| {
            TreeError::MalformedRecord(format!("'{}' needs one plain argument", record.name))
        })
}

/// Performs one recorded action on `target`, the node equivalent to the
/// one the record was observed from.
pub fn apply_action(target: &Node, record: &ActionRecord) -> Result<Outcome, TreeError> {
    let node = target.resolve_path(&record.path)?;
    match record.name.as_str() {
        APPLY_PATCHES => {
            let ops = from_json_patch(&builtin_payload(record)?)?;
            apply_patch(&node, &ops)?;
            Ok(Outcome::Done(Value::Null))
        }
        APPLY_SNAPSHOT => {
            apply_snapshot(&node, builtin_payload(record)?)?;
            Ok(Outcome::Done(Value::Null))
        }
        name => {
            let args = record
                .args
                .iter()
                .map(|arg| deserialize_arg(arg, &node))
                .collect::<Result<Vec<_>, _>>()?;
            node.dispatch(name, args)
        }
    }
}

/// Applies `log` to `target` in order, waiting for each async action to
/// settle before the next record. Stops at the first failure.
pub async fn replay(log: &[ActionRecord], target: &Node) -> Result<(), TreeError> {
    for (position, record) in log.iter().enumerate() {
        tracing::debug!(position, action = %record.name, path = %record.path, "replaying action");
        let result = match apply_action(target, record) {
            Ok(outcome) => outcome.settle().await.map(drop),
            Err(err) => Err(err),
        };
        if let Err(source) = result {
            tracing::warn!(
                position,
                action = %record.name,
                path = %record.path,
                error = %source,
                "replay aborted"
            );
            return Err(TreeError::Replay {
                position,
                name: record.name.clone(),
                path: record.path.clone(),
                source: Box::new(source),
            });
        }
    }
    Ok(())
}

/// Collects the patches produced in a subtree, with their inverses.
pub struct PatchRecorder {
    source: Node,
    events: Rc<RefCell<Vec<PatchEvent>>>,
    subscription: RefCell<Option<Disposer>>,
}

/// Starts recording every patch produced in `node`'s subtree. Paths are
/// relative to `node`.
pub fn record_patches(node: &Node) -> PatchRecorder {
    let recorder = PatchRecorder {
        source: node.clone(),
        events: Rc::default(),
        subscription: RefCell::new(None),
    };
    recorder.resume();
    recorder
}

impl PatchRecorder {
    pub fn patches(&self) -> Vec<Op> {
        self.events.borrow().iter().map(|e| e.patch.clone()).collect()
    }

    /// Inverse patches, newest first, ready to be applied as one undo.
    pub fn inverse_patches(&self) -> Vec<Op> {
        self.events
            .borrow()
            .iter()
            .rev()
            .filter_map(|e| e.inverse.clone())
            .collect()
    }

    pub fn is_recording(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.dispose();
        }
    }

    pub fn resume(&self) {
        if self.is_recording() {
            return;
        }
        let events = self.events.clone();
        let disposer = on_patch(&self.source, move |event| {
            events.borrow_mut().push(event.clone());
        });
        *self.subscription.borrow_mut() = Some(disposer);
    }

    /// Applies the recorded patches to `target`.
    pub fn replay(&self, target: &Node) -> Result<(), TreeError> {
        apply_patch(target, &self.patches())
    }

    /// Reverts the recorded patches on `target`. Undoing while still
    /// recording records the reverting patches too.
    pub fn undo(&self, target: &Node) -> Result<(), TreeError> {
        apply_patch(target, &self.inverse_patches())
    }
}
