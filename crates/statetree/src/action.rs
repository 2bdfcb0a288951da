//! Action invocation and the records it produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use statetree_path::format_json_pointer;

use crate::args::{serialize_args, Arg, SerializedArg};
use crate::error::TreeError;
use crate::tree::Node;
use crate::types::ActionFn;

/// Name under which patch application is recorded.
pub const APPLY_PATCHES: &str = "@APPLY_PATCHES";
/// Name under which snapshot application is recorded.
pub const APPLY_SNAPSHOT: &str = "@APPLY_SNAPSHOT";

/// Serializable description of one action invocation.
///
/// `path` locates the acting node relative to whichever node observed the
/// invocation; references inside `args` are relative to the acting node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub args: Vec<SerializedArg>,
}

impl ActionRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>, args: Vec<SerializedArg>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args,
        }
    }

    /// True for the patch and snapshot pseudo-actions.
    pub fn is_builtin(&self) -> bool {
        self.name == APPLY_PATCHES || self.name == APPLY_SNAPSHOT
    }
}

/// Phase of an action run that an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    Invoke,
    /// An async action resumes after a pending operation succeeded.
    Yield,
    /// An async action resumes after a pending operation failed.
    YieldError,
    Return,
    Throw,
}

/// Identifies the run an event belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub run_id: u64,
    pub name: String,
    /// Root-relative path of the acting node.
    pub root_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionEvent {
    pub record: ActionRecord,
    pub mode: RunMode,
    pub context: RunContext,
}

/// Handed to action bodies while they run.
pub struct ActionContext {
    node: Node,
    name: String,
    run_id: u64,
    mode: RunMode,
}

impl ActionContext {
    /// The node the action runs on.
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

/// One segment of a run: its identity and whether listeners hear about it.
#[derive(Debug, Clone)]
pub(crate) struct RunStep {
    pub name: String,
    pub mode: RunMode,
    pub run_id: u64,
    /// Only outermost invocations are published; actions invoked from
    /// inside another action are part of that action's record.
    pub publish: bool,
}

impl RunStep {
    pub(crate) fn invoke(node: &Node, name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: RunMode::Invoke,
            run_id: node.tree.next_run_id(),
            publish: !node.tree.in_action(),
        }
    }

    pub(crate) fn with_mode(&self, mode: RunMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// Serializes `args`, publishes the step and then runs `body` with the
/// tree marked as inside an action.
pub(crate) fn intercept<R>(
    node: &Node,
    step: &RunStep,
    args: &[Arg],
    body: impl FnOnce(&ActionContext) -> R,
) -> Result<R, TreeError> {
    announce(node, step, args)?;
    let _scope = node.tree.enter();
    let cx = ActionContext {
        node: node.clone(),
        name: step.name.clone(),
        run_id: step.run_id,
        mode: step.mode,
    };
    Ok(body(&cx))
}

/// Serializes `args` and publishes the step without running anything.
pub(crate) fn announce(node: &Node, step: &RunStep, args: &[Arg]) -> Result<(), TreeError> {
    let root_path = node.path_segments()?;
    let args = serialize_args(args, node, &step.name)?;
    if !step.publish {
        return Ok(());
    }
    let pointer = format_json_pointer(&root_path);
    tracing::trace!(
        run_id = step.run_id,
        mode = ?step.mode,
        action = %step.name,
        path = %pointer,
        "action event"
    );
    let event = ActionEvent {
        record: ActionRecord::new(step.name.clone(), pointer.clone(), args),
        mode: step.mode,
        context: RunContext {
            run_id: step.run_id,
            name: step.name.clone(),
            root_path: pointer,
        },
    };
    node.tree.listeners.publish_action(&node.tree.arena, &root_path, &event);
    Ok(())
}

pub(crate) fn invoke(
    node: &Node,
    name: &str,
    body: &ActionFn,
    args: Vec<Arg>,
) -> Result<Value, TreeError> {
    let step = RunStep::invoke(node, name);
    intercept(node, &step, &args, |cx| body(cx, &args))?
}
