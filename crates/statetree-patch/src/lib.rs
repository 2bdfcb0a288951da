//! JSON Patch operations (RFC 6902 subset) for state trees.
//!
//! # Operations
//!
//! `add`, `remove`, `replace`, `copy`, `move`, `test`.
//!
//! Operations are applied through the [`PatchTarget`] seam, so the same
//! applicator drives a plain [`serde_json::Value`] document and a live tree.
//! `remove` and `replace` ops may carry the value they overwrote
//! (`oldValue` on the wire), which makes them invertible with [`Op::invert`].

pub mod apply;
pub mod codec;
pub mod types;

pub use apply::{apply_op, apply_ops, PatchTarget};
pub use codec::{from_json, from_json_patch, to_json, to_json_patch};
pub use types::{Op, PatchError};
pub use statetree_path::Path;
