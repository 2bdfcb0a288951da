//! Typed, observable state trees with recordable and replayable actions.
//!
//! A tree is created from a [`Type`] and a snapshot. Model types declare
//! actions; every outermost action invocation is announced to
//! [`on_action`] listeners as an [`ActionRecord`] whose arguments are
//! serialized, with tree nodes encoded as relative path references. A
//! [`Recorder`] keeps those records and [`replay`] performs them on another
//! tree.
//!
//! ```
//! use serde_json::json;
//! use statetree::types::{boolean, optional, ModelType};
//! use statetree::{record_actions, Value};
//!
//! let task = ModelType::builder("Task")
//!     .prop("done", optional(boolean(), json!(false)))
//!     .action("toggle", |cx, _args| {
//!         let done = cx.node().get("done")?.as_bool().unwrap_or(false);
//!         cx.node().set("done", !done)?;
//!         Ok(Value::Null)
//!     })
//!     .build();
//!
//! let source = task.create(json!({})).unwrap();
//! let recorder = record_actions(&source);
//! source.call("toggle", vec![]).unwrap();
//! assert_eq!(
//!     recorder.to_json().unwrap(),
//!     json!([{"name": "toggle", "path": "", "args": []}])
//! );
//! ```

pub mod action;
pub mod args;
pub mod error;
pub mod flow;
pub mod listeners;
pub mod recorder;
pub mod tree;
pub mod types;

pub use action::{
    ActionContext, ActionEvent, ActionRecord, RunContext, RunMode, APPLY_PATCHES, APPLY_SNAPSHOT,
};
pub use args::{Arg, SerializedArg};
pub use error::{TreeError, TypeValidationError};
pub use flow::{FlowHandle, FlowSteps, PendingOp, Resume, Step, Yielded};
pub use listeners::{on_action, on_patch, Disposer, PatchEvent};
pub use recorder::{
    apply_action, log_from_json, log_to_json, record_actions, record_patches, replay,
    PatchRecorder, Recorder,
};
pub use tree::{apply_patch, apply_snapshot, Node, NodeId, Outcome, TreeOptions};
pub use types::{ModelType, Type};

pub use serde_json::Value;
pub use statetree_patch::Op;
