//! Structural type definitions.
//!
//! A [`Type`] describes which values a position in the tree accepts and,
//! for models, which actions the node exposes. Types validate snapshots
//! before anything is instantiated, so a failed validation never leaves a
//! half-built subtree behind.

mod model;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

pub use model::{ActionFn, FlowFactory, ModelBuilder, ModelType};
pub(crate) use model::ActionDef;

use crate::error::{TreeError, TypeValidationError};
use crate::tree::{Node, TreeOptions};

#[derive(Clone)]
pub enum Type {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    /// A string that uniquely identifies a model instance within its tree.
    Identifier,
    /// Any JSON value, stored as-is.
    Frozen,
    Literal(Value),
    /// Falls back to the default when the value is absent.
    Optional(Box<Type>, Value),
    /// Accepts `null` (or absence) in addition to the inner type.
    Maybe(Box<Type>),
    Array(Box<Type>),
    Map(Box<Type>),
    Model(Rc<ModelType>),
    /// Stores the identifier of a model instance of the target type.
    Reference(Box<Type>),
}

pub fn string() -> Type {
    Type::String
}

pub fn number() -> Type {
    Type::Number
}

pub fn integer() -> Type {
    Type::Integer
}

pub fn boolean() -> Type {
    Type::Boolean
}

pub fn null() -> Type {
    Type::Null
}

pub fn identifier() -> Type {
    Type::Identifier
}

pub fn frozen() -> Type {
    Type::Frozen
}

pub fn literal(value: Value) -> Type {
    Type::Literal(value)
}

pub fn optional(inner: Type, default: Value) -> Type {
    Type::Optional(Box::new(inner), default)
}

pub fn maybe(inner: Type) -> Type {
    Type::Maybe(Box::new(inner))
}

pub fn array(item: Type) -> Type {
    Type::Array(Box::new(item))
}

pub fn map(item: Type) -> Type {
    Type::Map(Box::new(item))
}

pub fn reference(target: &Type) -> Type {
    Type::Reference(Box::new(target.clone()))
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
        other => other.to_string(),
    }
}

fn child_path(path: &str, key: &str) -> String {
    format!("{path}/{}", statetree_path::escape_component(key))
}

impl Type {
    pub fn as_model(&self) -> Option<&Rc<ModelType>> {
        match self {
            Type::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Models, arrays and maps become nodes; everything else is a leaf.
    pub fn is_node_type(&self) -> bool {
        matches!(self, Type::Model(_) | Type::Array(_) | Type::Map(_))
    }

    /// The model type this position references, looking through
    /// `optional` and `maybe` wrappers.
    pub fn reference_target(&self) -> Option<&Type> {
        match self {
            Type::Reference(target) => Some(target),
            Type::Optional(inner, _) | Type::Maybe(inner) => inner.reference_target(),
            _ => None,
        }
    }

    fn accepts_absence(&self) -> bool {
        matches!(self, Type::Optional(..) | Type::Maybe(_))
    }

    /// Checks `value` against this type. `path` locates the value in error
    /// messages.
    pub fn validate(&self, value: &Value, path: &str) -> Result<(), TypeValidationError> {
        let mismatch = || TypeValidationError {
            path: path.to_string(),
            expected: self.to_string(),
            actual: describe_value(value),
        };
        match self {
            Type::String => value.is_string().then_some(()).ok_or_else(mismatch),
            Type::Number => value.is_number().then_some(()).ok_or_else(mismatch),
            Type::Integer => {
                let ok = value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0);
                ok.then_some(()).ok_or_else(mismatch)
            }
            Type::Boolean => value.is_boolean().then_some(()).ok_or_else(mismatch),
            Type::Null => value.is_null().then_some(()).ok_or_else(mismatch),
            Type::Identifier => value.is_string().then_some(()).ok_or_else(mismatch),
            Type::Frozen => Ok(()),
            Type::Literal(expected) => (value == expected).then_some(()).ok_or_else(mismatch),
            Type::Optional(inner, _) => inner.validate(value, path),
            Type::Maybe(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate(value, path)
                }
            }
            Type::Array(item) => {
                let items = value.as_array().ok_or_else(mismatch)?;
                for (idx, v) in items.iter().enumerate() {
                    item.validate(v, &child_path(path, &idx.to_string()))?;
                }
                Ok(())
            }
            Type::Map(item) => {
                let entries = value.as_object().ok_or_else(mismatch)?;
                for (key, v) in entries {
                    item.validate(v, &child_path(path, key))?;
                }
                Ok(())
            }
            Type::Model(model) => {
                let props = value.as_object().ok_or_else(mismatch)?;
                for (key, ty) in model.properties() {
                    match props.get(key) {
                        Some(v) => ty.validate(v, &child_path(path, key))?,
                        None if ty.accepts_absence() => {}
                        None => {
                            return Err(TypeValidationError {
                                path: child_path(path, key),
                                expected: ty.to_string(),
                                actual: "undefined".to_string(),
                            })
                        }
                    }
                }
                Ok(())
            }
            Type::Reference(target) => {
                if target.as_model().is_none() {
                    return Err(mismatch());
                }
                value.is_string().then_some(()).ok_or_else(mismatch)
            }
        }
    }

    /// Instantiates a new tree from `snapshot`.
    pub fn create(&self, snapshot: Value) -> Result<Node, TreeError> {
        self.create_with(snapshot, TreeOptions::default())
    }

    pub fn create_with(&self, snapshot: Value, options: TreeOptions) -> Result<Node, TreeError> {
        if !self.is_node_type() {
            return Err(TypeValidationError {
                path: String::new(),
                expected: "a model, array or map type".to_string(),
                actual: self.to_string(),
            }
            .into());
        }
        self.validate(&snapshot, "")?;
        Ok(Node::new_root(self, snapshot, options))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => f.write_str("string"),
            Type::Number => f.write_str("number"),
            Type::Integer => f.write_str("integer"),
            Type::Boolean => f.write_str("boolean"),
            Type::Null => f.write_str("null"),
            Type::Identifier => f.write_str("identifier"),
            Type::Frozen => f.write_str("frozen"),
            Type::Literal(v) => write!(f, "{v}"),
            Type::Optional(inner, _) => write!(f, "{inner}"),
            Type::Maybe(inner) => write!(f, "({inner} | null)"),
            Type::Array(item) => write!(f, "{item}[]"),
            Type::Map(item) => write!(f, "map<{item}>"),
            Type::Model(model) => f.write_str(model.name()),
            Type::Reference(target) => write!(f, "reference({target})"),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo() -> Type {
        ModelType::builder("Todo")
            .prop("id", identifier())
            .prop("title", string())
            .prop("done", optional(boolean(), json!(false)))
            .prop("tags", maybe(array(string())))
            .build()
    }

    #[test]
    fn model_accepts_missing_optional_and_maybe() {
        todo()
            .validate(&json!({"id": "t1", "title": "x"}), "")
            .unwrap();
    }

    #[test]
    fn model_reports_missing_required_prop() {
        let err = todo().validate(&json!({"id": "t1"}), "").unwrap_err();
        assert_eq!(err.path, "/title");
        assert_eq!(err.expected, "string");
        assert_eq!(err.actual, "undefined");
    }

    #[test]
    fn nested_error_path() {
        let list = array(todo());
        let err = list
            .validate(&json!([{"id": "a", "title": "x", "tags": ["ok", 3]}]), "")
            .unwrap_err();
        assert_eq!(err.path, "/0/tags/1");
    }

    #[test]
    fn integer_rejects_fraction() {
        assert!(integer().validate(&json!(2), "").is_ok());
        assert!(integer().validate(&json!(2.5), "").is_err());
    }

    #[test]
    fn reference_must_target_a_model() {
        assert!(reference(&string()).validate(&json!("x"), "").is_err());
        assert!(reference(&todo()).validate(&json!("x"), "").is_ok());
        assert!(reference(&todo()).validate(&json!(1), "").is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(maybe(reference(&todo())).to_string(), "(reference(Todo) | null)");
        assert_eq!(map(array(number())).to_string(), "map<number[]>");
    }

    #[test]
    fn leaf_types_cannot_be_created() {
        assert!(string().create(json!("x")).is_err());
    }
}
