//! Path addressing for state-tree nodes.
//!
//! Every node in a tree is addressed by the sequence of keys leading to it
//! from the root. Two string forms are used:
//!
//! - a *pointer* (RFC 6901 style), root-relative, e.g. `/customers/0`, with
//!   the empty string denoting the root itself;
//! - a *relative path* between two nodes of the same tree, e.g.
//!   `../../customers/0`, used to encode references in action arguments.
//!
//! # Example
//!
//! ```
//! use statetree_path::{format_json_pointer, parse_json_pointer, relative_path, resolve_relative};
//!
//! let order = parse_json_pointer("/orders/0");
//! let customer = parse_json_pointer("/customers/0");
//!
//! let rel = relative_path(&order, &customer);
//! assert_eq!(rel, "../../customers/0");
//! assert_eq!(resolve_relative(&order, &rel).unwrap(), customer);
//! assert_eq!(format_json_pointer(&customer), "/customers/0");
//! ```

use thiserror::Error;

mod relative;
pub use relative::{relative_path, resolve_relative, RelativeStep, parse_relative};

/// A single key in a node path. Array positions are decimal strings.
pub type PathStep = String;

/// A root-relative node path.
pub type Path = Vec<PathStep>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("the root path has no parent")]
    NoParent,
    #[error("relative path '{path}' walks above the tree root")]
    AboveRoot { path: String },
}

/// Unescapes a path component.
///
/// `~1` is replaced with `/` and `~0` is replaced with `~`.
///
/// ```
/// use statetree_path::unescape_component;
///
/// assert_eq!(unescape_component("a~0b"), "a~b");
/// assert_eq!(unescape_component("c~1d"), "c/d");
/// ```
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // ~1 first, otherwise "~01" would decode to "/"
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes a path component.
///
/// `~` is replaced with `~0` and `/` is replaced with `~1`.
///
/// ```
/// use statetree_path::escape_component;
///
/// assert_eq!(escape_component("a~b"), "a~0b");
/// assert_eq!(escape_component("c/d"), "c~1d");
/// assert_eq!(escape_component("plain"), "plain");
/// ```
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    component.replace('~', "~0").replace('/', "~1")
}

/// Parses a pointer string into path components.
///
/// The empty string is the root. The leading `/` is stripped and each
/// component is unescaped.
///
/// ```
/// use statetree_path::parse_json_pointer;
///
/// assert_eq!(parse_json_pointer(""), Vec::<String>::new());
/// assert_eq!(parse_json_pointer("/todos/3/title"), vec!["todos", "3", "title"]);
/// ```
pub fn parse_json_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return Vec::new();
    }
    let body = pointer.strip_prefix('/').unwrap_or(pointer);
    body.split('/').map(unescape_component).collect()
}

/// Formats path components into a pointer string.
///
/// ```
/// use statetree_path::format_json_pointer;
///
/// assert_eq!(format_json_pointer(&[]), "");
/// assert_eq!(format_json_pointer(&["a/b".to_string(), "0".to_string()]), "/a~1b/0");
/// ```
pub fn format_json_pointer(path: &[String]) -> String {
    let mut out = String::with_capacity(path.len() * 8);
    for component in path {
        out.push('/');
        out.push_str(&escape_component(component));
    }
    out
}

/// Returns `true` if `child` lies strictly below `parent`.
///
/// ```
/// use statetree_path::is_child;
///
/// let parent = vec!["todos".to_string()];
/// let child = vec!["todos".to_string(), "0".to_string()];
/// assert!(is_child(&parent, &child));
/// assert!(!is_child(&child, &parent));
/// assert!(!is_child(&parent, &parent));
/// ```
pub fn is_child(parent: &[String], child: &[String]) -> bool {
    parent.len() < child.len() && child.starts_with(parent)
}

/// Returns `true` if `path` equals `ancestor` or lies below it.
pub fn is_within(ancestor: &[String], path: &[String]) -> bool {
    path.starts_with(ancestor)
}

/// Returns the parent of `path`.
///
/// ```
/// use statetree_path::parent;
///
/// assert_eq!(parent(&["a".to_string(), "b".to_string()]).unwrap(), vec!["a"]);
/// assert!(parent(&[]).is_err());
/// ```
pub fn parent(path: &[String]) -> Result<Path, PathError> {
    match path.split_last() {
        Some((_, init)) => Ok(init.to_vec()),
        None => Err(PathError::NoParent),
    }
}

/// Checks whether `step` is a canonical array index (no sign, no leading zero).
///
/// ```
/// use statetree_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("42"));
/// assert!(!is_valid_index("07"));
/// assert!(!is_valid_index("-1"));
/// ```
pub fn is_valid_index(step: &str) -> bool {
    let bytes = step.as_bytes();
    if bytes.is_empty() || (bytes.len() > 1 && bytes[0] == b'0') {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}
