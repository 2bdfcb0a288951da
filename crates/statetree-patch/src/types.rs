//! Core types for the patch module.

use serde_json::Value;
use thiserror::Error;

use statetree_path::Path;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("TEST")]
    Test,
    #[error("INVALID_INDEX")]
    InvalidIndex,
    #[error("INVALID_TARGET")]
    InvalidTarget,
    #[error("INVALID_OP: {0}")]
    InvalidOp(String),
}

/// A single patch operation. Paths are relative to the node the patch is
/// applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add {
        path: Path,
        value: Value,
    },
    Remove {
        path: Path,
        old_value: Option<Value>,
    },
    Replace {
        path: Path,
        value: Value,
        old_value: Option<Value>,
    },
    Copy {
        path: Path,
        from: Path,
    },
    Move {
        path: Path,
        from: Path,
    },
    Test {
        path: Path,
        value: Value,
        not: bool,
    },
}

impl Op {
    pub fn op_name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "add",
            Op::Remove { .. } => "remove",
            Op::Replace { .. } => "replace",
            Op::Copy { .. } => "copy",
            Op::Move { .. } => "move",
            Op::Test { .. } => "test",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Op::Add { path, .. }
            | Op::Remove { path, .. }
            | Op::Replace { path, .. }
            | Op::Copy { path, .. }
            | Op::Move { path, .. }
            | Op::Test { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut Path {
        match self {
            Op::Add { path, .. }
            | Op::Remove { path, .. }
            | Op::Replace { path, .. }
            | Op::Copy { path, .. }
            | Op::Move { path, .. }
            | Op::Test { path, .. } => path,
        }
    }

    /// Builds the operation that undoes this one.
    ///
    /// Returns `None` when the op does not carry enough information
    /// (`remove`/`replace` without an old value, `copy`, `test`).
    pub fn invert(&self) -> Option<Op> {
        match self {
            Op::Add { path, value } => Some(Op::Remove {
                path: path.clone(),
                old_value: Some(value.clone()),
            }),
            Op::Remove {
                path,
                old_value: Some(old),
            } => Some(Op::Add {
                path: path.clone(),
                value: old.clone(),
            }),
            Op::Replace {
                path,
                value,
                old_value: Some(old),
            } => Some(Op::Replace {
                path: path.clone(),
                value: old.clone(),
                old_value: Some(value.clone()),
            }),
            Op::Move { path, from } => Some(Op::Move {
                path: from.clone(),
                from: path.clone(),
            }),
            _ => None,
        }
    }

    /// Drops the first `depth` path segments (and `from` segments for
    /// `copy`/`move`), re-expressing the op relative to a descendant.
    pub fn rebase(&self, depth: usize) -> Op {
        let mut op = self.clone();
        let strip = |p: &mut Path| {
            let n = depth.min(p.len());
            p.drain(..n);
        };
        strip(op.path_mut());
        if let Op::Copy { from, .. } | Op::Move { from, .. } = &mut op {
            strip(from);
        }
        op
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &[&str]) -> Path {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn replace_inverts_to_replace() {
        let op = Op::Replace {
            path: p(&["done"]),
            value: json!(true),
            old_value: Some(json!(false)),
        };
        assert_eq!(
            op.invert(),
            Some(Op::Replace {
                path: p(&["done"]),
                value: json!(false),
                old_value: Some(json!(true)),
            })
        );
    }

    #[test]
    fn remove_without_old_value_is_not_invertible() {
        let op = Op::Remove {
            path: p(&["a"]),
            old_value: None,
        };
        assert_eq!(op.invert(), None);
    }

    #[test]
    fn rebase_strips_prefix() {
        let op = Op::Move {
            path: p(&["todos", "1"]),
            from: p(&["todos", "0"]),
        };
        assert_eq!(
            op.rebase(1),
            Op::Move {
                path: p(&["1"]),
                from: p(&["0"]),
            }
        );
    }
}
