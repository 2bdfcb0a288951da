//! Node-relative paths (`..` segments), used to encode references between
//! nodes of the same tree independently of where the tree is mounted.

use crate::{escape_component, unescape_component, Path, PathError};

/// One step of a relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelativeStep {
    Up,
    Key(String),
}

/// Builds the relative path leading from `from` to `to`.
///
/// Both paths are root-relative. The result climbs with `..` out of every
/// segment of `from` past the common prefix, then descends into the rest of
/// `to`. Identical paths yield the empty string.
///
/// ```
/// use statetree_path::relative_path;
///
/// let s = |p: &[&str]| p.iter().map(|x| x.to_string()).collect::<Vec<_>>();
/// assert_eq!(relative_path(&s(&["a", "b"]), &s(&["a", "c", "d"])), "../c/d");
/// assert_eq!(relative_path(&s(&["a"]), &s(&["a", "b"])), "b");
/// assert_eq!(relative_path(&s(&["a"]), &s(&["a"])), "");
/// ```
pub fn relative_path(from: &[String], to: &[String]) -> String {
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = std::iter::repeat("..".to_string()).take(from.len() - common);
    let downs = to[common..].iter().map(|step| escape_component(step));
    ups.chain(downs).collect::<Vec<_>>().join("/")
}

/// Splits a relative path into steps. The empty string has no steps.
pub fn parse_relative(rel: &str) -> Vec<RelativeStep> {
    if rel.is_empty() {
        return Vec::new();
    }
    rel.split('/')
        .map(|step| match step {
            ".." => RelativeStep::Up,
            other => RelativeStep::Key(unescape_component(other)),
        })
        .collect()
}

/// Applies a relative path to `base`, returning the root-relative target.
///
/// Fails with [`PathError::AboveRoot`] if the path climbs past the root.
pub fn resolve_relative(base: &[String], rel: &str) -> Result<Path, PathError> {
    let mut out = base.to_vec();
    for step in parse_relative(rel) {
        match step {
            RelativeStep::Up => {
                if out.pop().is_none() {
                    return Err(PathError::AboveRoot {
                        path: rel.to_string(),
                    });
                }
            }
            RelativeStep::Key(key) => out.push(key),
        }
    }
    Ok(out)
}
