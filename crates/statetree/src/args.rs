//! Action arguments and their serialized form.
//!
//! Arguments passed to actions are [`Arg`]s. Before an action runs, each
//! argument is turned into a [`SerializedArg`]: plain data stays as-is and
//! nodes of the acting tree become path references relative to the node
//! the action runs on. Anything else makes the invocation fail before the
//! action body executes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::TreeError;
use crate::tree::Node;

const REF_KEY: &str = "$ref";
const ESCAPE_KEY: &str = "$object";

/// A live action argument.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Node(Node),
    List(Vec<Arg>),
    Object(IndexMap<String, Arg>),
    /// Shared, mutable structure. May form cycles, which are rejected when
    /// the argument is serialized.
    Shared(Rc<RefCell<Arg>>),
    /// A value that has no plain-data form, described by its kind
    /// (e.g. `"Buffer"`).
    Opaque(String),
}

impl Arg {
    pub fn shared(inner: Arg) -> Arg {
        Arg::Shared(Rc::new(RefCell::new(inner)))
    }

    pub fn opaque(kind: impl Into<String>) -> Arg {
        Arg::Opaque(kind.into())
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value()?.as_str()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_value()?.as_f64()
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_value()?.as_i64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value()?.as_bool()
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Arg::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Plain JSON form of an argument that holds no nodes. On failure,
    /// returns a description of the offending part.
    pub fn to_plain_value(&self) -> Result<Value, String> {
        let mut converter = Converter::default();
        converter.plain(self)
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{value}"),
            Arg::Node(node) => fmt::Debug::fmt(node, f),
            Arg::List(items) => f.debug_list().entries(items).finish(),
            Arg::Object(entries) => f.debug_map().entries(entries).finish(),
            Arg::Shared(cell) => match cell.try_borrow() {
                Ok(inner) => f.debug_tuple("Shared").field(&*inner).finish(),
                Err(_) => f.write_str("Shared(<borrowed>)"),
            },
            Arg::Opaque(kind) => write!(f, "<{kind}>"),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Value(Value::from(value))
    }
}

impl From<Node> for Arg {
    fn from(node: Node) -> Self {
        Arg::Node(node)
    }
}

impl From<&Node> for Arg {
    fn from(node: &Node) -> Self {
        Arg::Node(node.clone())
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::List(items)
    }
}

/// Serialized action argument.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedArg {
    Primitive(Value),
    /// Path of a node, relative to the node the action ran on.
    Reference(String),
    List(Vec<SerializedArg>),
    Object(IndexMap<String, SerializedArg>),
}

impl SerializedArg {
    /// Wraps plain data, splitting composites so nested objects that look
    /// like references stay plain data.
    pub fn plain(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                SerializedArg::List(items.into_iter().map(SerializedArg::plain).collect())
            }
            Value::Object(entries) => SerializedArg::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, SerializedArg::plain(v)))
                    .collect(),
            ),
            primitive => SerializedArg::Primitive(primitive),
        }
    }

    pub fn reference(path: impl Into<String>) -> Self {
        SerializedArg::Reference(path.into())
    }

    /// Plain value of an argument that holds no references.
    pub fn to_plain(&self) -> Option<Value> {
        match self {
            SerializedArg::Primitive(value) => Some(value.clone()),
            SerializedArg::Reference(_) => None,
            SerializedArg::List(items) => items
                .iter()
                .map(SerializedArg::to_plain)
                .collect::<Option<_>>()
                .map(Value::Array),
            SerializedArg::Object(entries) => entries
                .iter()
                .map(|(k, a)| Some((k.clone(), a.to_plain()?)))
                .collect::<Option<Map<_, _>>>()
                .map(Value::Object),
        }
    }

    /// JSON wire form. References are `{"$ref": path}`; plain objects that
    /// would be mistaken for a reference or an escape are wrapped as
    /// `{"$object": {...}}`.
    pub fn to_json(&self) -> Value {
        match self {
            SerializedArg::Primitive(value) => value.clone(),
            SerializedArg::Reference(path) => {
                let mut obj = Map::new();
                obj.insert(REF_KEY.to_string(), Value::String(path.clone()));
                Value::Object(obj)
            }
            SerializedArg::List(items) => {
                Value::Array(items.iter().map(SerializedArg::to_json).collect())
            }
            SerializedArg::Object(entries) => {
                let obj: Map<String, Value> =
                    entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                if needs_escape(&obj) {
                    let mut wrapper = Map::new();
                    wrapper.insert(ESCAPE_KEY.to_string(), Value::Object(obj));
                    Value::Object(wrapper)
                } else {
                    Value::Object(obj)
                }
            }
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, TreeError> {
        match value {
            Value::Array(items) => Ok(SerializedArg::List(
                items.iter().map(SerializedArg::from_json).collect::<Result<_, _>>()?,
            )),
            Value::Object(obj) if obj.len() == 1 && obj.contains_key(REF_KEY) => {
                match &obj[REF_KEY] {
                    Value::String(path) => Ok(SerializedArg::Reference(path.clone())),
                    other => Err(TreeError::MalformedRecord(format!(
                        "reference path must be a string, got {other}"
                    ))),
                }
            }
            Value::Object(obj) if obj.len() == 1 && obj.contains_key(ESCAPE_KEY) => {
                match &obj[ESCAPE_KEY] {
                    Value::Object(inner) => object_from_json(inner),
                    other => Err(TreeError::MalformedRecord(format!(
                        "escaped object must be an object, got {other}"
                    ))),
                }
            }
            Value::Object(obj) => object_from_json(obj),
            primitive => Ok(SerializedArg::Primitive(primitive.clone())),
        }
    }
}

fn needs_escape(obj: &Map<String, Value>) -> bool {
    obj.len() == 1 && (obj.contains_key(REF_KEY) || obj.contains_key(ESCAPE_KEY))
}

fn object_from_json(obj: &Map<String, Value>) -> Result<SerializedArg, TreeError> {
    Ok(SerializedArg::Object(
        obj.iter()
            .map(|(k, v)| Ok((k.clone(), SerializedArg::from_json(v)?)))
            .collect::<Result<_, TreeError>>()?,
    ))
}

impl Serialize for SerializedArg {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SerializedArg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SerializedArg::from_json(&value).map_err(serde::de::Error::custom)
    }
}

// ── Conversion ────────────────────────────────────────────────────────────

/// Walks an argument, tracking the shared cells on the current path so
/// cycles are reported instead of recursed into.
#[derive(Default)]
struct Converter {
    visiting: Vec<*const RefCell<Arg>>,
}

const CYCLIC: &str = "a cyclic structure";

impl Converter {
    fn enter(&mut self, cell: &Rc<RefCell<Arg>>) -> Result<(), String> {
        let ptr = Rc::as_ptr(cell);
        if self.visiting.contains(&ptr) {
            return Err(CYCLIC.to_string());
        }
        self.visiting.push(ptr);
        Ok(())
    }

    fn plain(&mut self, arg: &Arg) -> Result<Value, String> {
        match arg {
            Arg::Value(value) => Ok(value.clone()),
            Arg::Node(_) => Err("a tree node".to_string()),
            Arg::List(items) => Ok(Value::Array(
                items.iter().map(|a| self.plain(a)).collect::<Result<_, _>>()?,
            )),
            Arg::Object(entries) => Ok(Value::Object(
                entries
                    .iter()
                    .map(|(k, a)| Ok((k.clone(), self.plain(a)?)))
                    .collect::<Result<_, String>>()?,
            )),
            Arg::Shared(cell) => {
                self.enter(cell)?;
                let inner = cell.try_borrow().map_err(|_| CYCLIC.to_string())?;
                let value = self.plain(&inner);
                self.visiting.pop();
                value
            }
            Arg::Opaque(kind) => Err(format!("a {kind}")),
        }
    }

    fn serialize(&mut self, arg: &Arg, context: &Node) -> Result<SerializedArg, Rejection> {
        match arg {
            Arg::Value(value) => Ok(SerializedArg::plain(value.clone())),
            Arg::Node(node) => {
                if !node.is_same_tree(context) {
                    return Err(Rejection::CrossTree);
                }
                context
                    .relative_path_to(node)
                    .map(SerializedArg::Reference)
                    .map_err(|_| Rejection::Kind("a detached node".to_string()))
            }
            Arg::List(items) => Ok(SerializedArg::List(
                items
                    .iter()
                    .map(|a| self.serialize(a, context))
                    .collect::<Result<_, _>>()?,
            )),
            Arg::Object(entries) => Ok(SerializedArg::Object(
                entries
                    .iter()
                    .map(|(k, a)| Ok((k.clone(), self.serialize(a, context)?)))
                    .collect::<Result<_, Rejection>>()?,
            )),
            Arg::Shared(cell) => {
                self.enter(cell).map_err(Rejection::Kind)?;
                let inner = cell
                    .try_borrow()
                    .map_err(|_| Rejection::Kind(CYCLIC.to_string()))?;
                let serialized = self.serialize(&inner, context);
                self.visiting.pop();
                serialized
            }
            Arg::Opaque(kind) => Err(Rejection::Kind(format!("a {kind}"))),
        }
    }
}

enum Rejection {
    CrossTree,
    Kind(String),
}

/// Serializes every argument of an invocation of `action` on `context`.
/// Fails on the first argument that cannot be serialized.
pub(crate) fn serialize_args(
    args: &[Arg],
    context: &Node,
    action: &str,
) -> Result<Vec<SerializedArg>, TreeError> {
    args.iter()
        .enumerate()
        .map(|(index, arg)| {
            Converter::default()
                .serialize(arg, context)
                .map_err(|rejection| match rejection {
                    Rejection::CrossTree => TreeError::CrossTreeReference {
                        action: action.to_string(),
                        index,
                    },
                    Rejection::Kind(kind) => TreeError::NotSerializable {
                        action: action.to_string(),
                        index,
                        kind,
                    },
                })
        })
        .collect()
}

/// Rebuilds a live argument, resolving references against `context`.
pub(crate) fn deserialize_arg(arg: &SerializedArg, context: &Node) -> Result<Arg, TreeError> {
    match arg {
        SerializedArg::Primitive(value) => Ok(Arg::Value(value.clone())),
        SerializedArg::Reference(path) => context
            .resolve_relative(path)
            .map(Arg::Node)
            .map_err(|_| TreeError::BrokenReference { path: path.clone() }),
        composite => match composite.to_plain() {
            Some(value) => Ok(Arg::Value(value)),
            None => match composite {
                SerializedArg::List(items) => Ok(Arg::List(
                    items
                        .iter()
                        .map(|a| deserialize_arg(a, context))
                        .collect::<Result<_, _>>()?,
                )),
                SerializedArg::Object(entries) => Ok(Arg::Object(
                    entries
                        .iter()
                        .map(|(k, a)| Ok((k.clone(), deserialize_arg(a, context)?)))
                        .collect::<Result<_, TreeError>>()?,
                )),
                _ => Err(TreeError::MalformedRecord(format!("{composite:?}"))),
            },
        },
    }
}
