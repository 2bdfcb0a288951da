//! Error taxonomy for the state tree.

use statetree_patch::PatchError;
use statetree_path::PathError;
use thiserror::Error;

/// A value does not conform to the type declared for its position.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("value at '{path}' does not conform to {expected}: got {actual}")]
pub struct TypeValidationError {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    #[error("argument {index} of action '{action}' is not serializable: received {kind}")]
    NotSerializable {
        action: String,
        index: usize,
        kind: String,
    },
    #[error("argument {index} of action '{action}' is a node of another tree")]
    CrossTreeReference { action: String, index: usize },
    #[error(transparent)]
    TypeValidation(#[from] TypeValidationError),
    #[error("only pending asynchronous operations can be yielded to an async action ('{action}')")]
    InvalidYield { action: String },
    #[error("failed to resolve reference path '{path}'")]
    BrokenReference { path: String },
    #[error("failed to resolve a reference to {type_name} with identifier {identifier}")]
    UnresolvedReference {
        type_name: String,
        identifier: String,
    },
    #[error("no node at '{path}'")]
    PathNotFound { path: String },
    #[error("node is no longer part of a live tree")]
    DeadNode,
    #[error("cannot modify '{path}', the tree is protected and can only be modified by using an action")]
    Protected { path: String },
    #[error("{type_name} has no action named '{name}'")]
    UnknownAction { type_name: String, name: String },
    #[error("action '{name}' cannot be {usage}")]
    ActionKind { name: String, usage: &'static str },
    #[error("'{path}' has no property '{key}'")]
    UnknownProperty { path: String, key: String },
    #[error("node at '{path}' is not {expected}")]
    WrongKind {
        path: String,
        expected: &'static str,
    },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),
    #[error("malformed action record: {0}")]
    MalformedRecord(String),
    #[error("replay of record {position} ('{name}' at '{path}') failed: {source}")]
    Replay {
        position: usize,
        name: String,
        path: String,
        source: Box<TreeError>,
    },
    #[error("{0}")]
    Failed(String),
}

impl TreeError {
    /// An error raised by user action code.
    pub fn failed(message: impl Into<String>) -> Self {
        TreeError::Failed(message.into())
    }
}
