//! Runtime values produced by expression evaluation.
//!
//! [`Value`] mirrors the closed [`TypeInfo`](crate::types::TypeInfo)
//! classification. List results carry their elements in [`ListValue`], a
//! typed sequence whose storage is reference counted, so cloning a computed
//! value never copies element data.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::corpus::{Container, Item};
use crate::expression::error::{EvalError, EvalResult};
use crate::types::{MemberKind, TypeInfo};

/// A single runtime value.
#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Arc<str>),
    List(ListValue),
    Item(Item),
    Container(Container),
    Generic(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn text(text: impl Into<Arc<str>>) -> Value {
        Value::Text(text.into())
    }

    pub fn generic(payload: impl Any + Send + Sync) -> Value {
        Value::Generic(Arc::new(payload))
    }

    /// The `TypeInfo` this value belongs to.
    pub fn type_info(&self) -> TypeInfo {
        match self {
            Value::Int(_) => TypeInfo::Integer,
            Value::Float(_) => TypeInfo::FloatingPoint,
            Value::Bool(_) => TypeInfo::Boolean,
            Value::Text(_) => TypeInfo::Text,
            Value::List(list) => TypeInfo::list_of(list.element_type()),
            Value::Item(_) => TypeInfo::Member(MemberKind::Item),
            Value::Container(_) => TypeInfo::Member(MemberKind::Container),
            Value::Generic(_) => TypeInfo::Generic,
        }
    }

    pub fn as_int(&self) -> EvalResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(EvalError::type_mismatch(
                "integer access",
                TypeInfo::Integer,
                other.type_info(),
            )),
        }
    }

    /// Floating access widens integer values.
    pub fn as_float(&self) -> EvalResult<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(EvalError::type_mismatch(
                "floating-point access",
                TypeInfo::FloatingPoint,
                other.type_info(),
            )),
        }
    }

    pub fn as_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(EvalError::type_mismatch(
                "boolean access",
                TypeInfo::Boolean,
                other.type_info(),
            )),
        }
    }

    pub fn as_text(&self) -> EvalResult<Arc<str>> {
        match self {
            Value::Text(v) => Ok(Arc::clone(v)),
            other => Err(EvalError::type_mismatch(
                "text access",
                TypeInfo::Text,
                other.type_info(),
            )),
        }
    }

    pub fn as_list(&self) -> EvalResult<&ListValue> {
        match self {
            Value::List(v) => Ok(v),
            other => Err(EvalError::type_mismatch(
                "list access",
                "list",
                other.type_info(),
            )),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::Bool(v) => write!(f, "Bool({})", v),
            Value::Text(v) => write!(f, "Text({:?})", v),
            Value::List(v) => write!(f, "List({:?})", v),
            Value::Item(v) => write!(f, "Item({:?})", v),
            Value::Container(v) => write!(f, "Container({:?})", v),
            Value::Generic(_) => write!(f, "Generic(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Item(a), Value::Item(b)) => a.same_item(b),
            (Value::Container(a), Value::Container(b)) => a.same_container(b),
            // Opaque payloads compare by identity.
            (Value::Generic(a), Value::Generic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(Arc::from(v))
    }
}

/// Typed, immutable sequence storage for list-valued results.
#[derive(Clone, PartialEq)]
pub enum ListValue {
    Int(Arc<[i64]>),
    Float(Arc<[f64]>),
    Bool(Arc<[bool]>),
    Text(Arc<[Arc<str>]>),
    Generic(Arc<[Value]>),
}

impl ListValue {
    pub fn ints(values: Vec<i64>) -> ListValue {
        ListValue::Int(values.into())
    }

    pub fn floats(values: Vec<f64>) -> ListValue {
        ListValue::Float(values.into())
    }

    pub fn bools(values: Vec<bool>) -> ListValue {
        ListValue::Bool(values.into())
    }

    pub fn texts(values: Vec<Arc<str>>) -> ListValue {
        ListValue::Text(values.into())
    }

    pub fn generics(values: Vec<Value>) -> ListValue {
        ListValue::Generic(values.into())
    }

    pub fn len(&self) -> usize {
        match self {
            ListValue::Int(v) => v.len(),
            ListValue::Float(v) => v.len(),
            ListValue::Bool(v) => v.len(),
            ListValue::Text(v) => v.len(),
            ListValue::Generic(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> TypeInfo {
        match self {
            ListValue::Int(_) => TypeInfo::Integer,
            ListValue::Float(_) => TypeInfo::FloatingPoint,
            ListValue::Bool(_) => TypeInfo::Boolean,
            ListValue::Text(_) => TypeInfo::Text,
            ListValue::Generic(_) => TypeInfo::Generic,
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            ListValue::Int(v) => v.get(index).copied().map(Value::Int),
            ListValue::Float(v) => v.get(index).copied().map(Value::Float),
            ListValue::Bool(v) => v.get(index).copied().map(Value::Bool),
            ListValue::Text(v) => v.get(index).cloned().map(Value::Text),
            ListValue::Generic(v) => v.get(index).cloned(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| {
            self.get(i)
                .expect("index within bounds by construction")
        })
    }

    /// Append all elements, flattening nested lists one level.
    ///
    /// This is the "expand" semantics used by set predicates and multi-key
    /// annotation access when scanning for containment or inferring types.
    pub fn expand_into(&self, out: &mut Vec<Value>) {
        for value in self.iter() {
            match value {
                Value::List(inner) => out.extend(inner.iter()),
                other => out.push(other),
            }
        }
    }
}

impl fmt::Debug for ListValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListValue::Int(v) => write!(f, "{:?}", v),
            ListValue::Float(v) => write!(f, "{:?}", v),
            ListValue::Bool(v) => write!(f, "{:?}", v),
            ListValue::Text(v) => write!(f, "{:?}", v),
            ListValue::Generic(v) => write!(f, "{:?}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_info() {
        assert_eq!(Value::Int(1).type_info(), TypeInfo::Integer);
        assert_eq!(Value::Float(1.5).type_info(), TypeInfo::FloatingPoint);
        assert_eq!(Value::Bool(true).type_info(), TypeInfo::Boolean);
        assert_eq!(Value::text("x").type_info(), TypeInfo::Text);
        assert_eq!(
            Value::List(ListValue::ints(vec![1, 2])).type_info(),
            TypeInfo::list_of(TypeInfo::Integer)
        );
    }

    #[test]
    fn test_typed_access() {
        assert_eq!(Value::Int(7).as_int().unwrap(), 7);
        assert_eq!(Value::Int(7).as_float().unwrap(), 7.0);
        assert_eq!(Value::Float(2.5).as_float().unwrap(), 2.5);
        assert!(Value::Float(2.5).as_int().is_err());
        assert!(Value::Bool(true).as_bool().unwrap());
        assert_eq!(Value::text("abc").as_text().unwrap().as_ref(), "abc");
        assert!(matches!(
            Value::text("abc").as_int(),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_list_value_access() {
        let list = ListValue::ints(vec![10, 20, 30]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.element_type(), TypeInfo::Integer);
        assert_eq!(list.get(1), Some(Value::Int(20)));
        assert_eq!(list.get(3), None);

        let texts = ListValue::texts(vec![Arc::from("a"), Arc::from("b")]);
        assert_eq!(texts.get(0), Some(Value::text("a")));

        let collected: Vec<Value> = list.iter().collect();
        assert_eq!(
            collected,
            vec![Value::Int(10), Value::Int(20), Value::Int(30)]
        );
    }

    #[test]
    fn test_expand_flattens_one_level() {
        let nested = ListValue::generics(vec![
            Value::Int(1),
            Value::List(ListValue::ints(vec![2, 3])),
            Value::Int(4),
        ]);
        let mut out = Vec::new();
        nested.expand_into(&mut out);
        assert_eq!(
            out,
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );
    }

    #[test]
    fn test_generic_identity_equality() {
        let payload = Arc::new(42u32);
        let a = Value::Generic(payload.clone() as Arc<dyn std::any::Any + Send + Sync>);
        let b = Value::Generic(payload as Arc<dyn std::any::Any + Send + Sync>);
        let c = Value::generic(42u32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
