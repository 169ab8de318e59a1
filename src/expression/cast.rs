//! Explicit value conversion nodes.
//!
//! Casts are inserted by the factory layer when the `autocast` switch is
//! enabled and by ternary type resolution when branch types only share an
//! auto-castable category. Conversion is checked statically where the
//! source type is known and re-checked against the runtime value for
//! generic-typed sources.

use std::any::Any;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::TypeInfo;

/// True when a value of type `from` can be converted to `to`.
pub fn is_castable(from: &TypeInfo, to: &TypeInfo) -> bool {
    if from == to || from.is_generic() || to.is_generic() {
        return true;
    }
    match to {
        TypeInfo::Integer | TypeInfo::FloatingPoint => {
            from.is_numeric() || from.is_boolean() || from.is_text()
        }
        TypeInfo::Boolean => from.is_numeric() || from.is_text(),
        TypeInfo::Text => from.is_numeric() || from.is_boolean(),
        // Lists and members convert only to themselves or generic.
        _ => false,
    }
}

fn convert(value: Value, target: &TypeInfo) -> EvalResult<Value> {
    if target.is_generic() || &value.type_info() == target {
        return Ok(value);
    }
    match target {
        TypeInfo::Integer => match value {
            Value::Int(v) => Ok(Value::Int(v)),
            Value::Float(v) => Ok(Value::Int(v as i64)),
            Value::Bool(v) => Ok(Value::Int(i64::from(v))),
            Value::Text(v) => v.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                EvalError::InvalidLiteral {
                    kind: "integer",
                    text: v.to_string(),
                }
            }),
            other => Err(EvalError::type_mismatch(
                "cast",
                TypeInfo::Integer,
                other.type_info(),
            )),
        },
        TypeInfo::FloatingPoint => match value {
            Value::Float(v) => Ok(Value::Float(v)),
            Value::Int(v) => Ok(Value::Float(v as f64)),
            Value::Bool(v) => Ok(Value::Float(if v { 1.0 } else { 0.0 })),
            Value::Text(v) => v.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                EvalError::InvalidLiteral {
                    kind: "float",
                    text: v.to_string(),
                }
            }),
            other => Err(EvalError::type_mismatch(
                "cast",
                TypeInfo::FloatingPoint,
                other.type_info(),
            )),
        },
        TypeInfo::Boolean => match value {
            Value::Bool(v) => Ok(Value::Bool(v)),
            Value::Int(v) => Ok(Value::Bool(v != 0)),
            Value::Float(v) => Ok(Value::Bool(v != 0.0)),
            Value::Text(v) => match v.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(EvalError::InvalidLiteral {
                    kind: "boolean",
                    text: v.to_string(),
                }),
            },
            other => Err(EvalError::type_mismatch(
                "cast",
                TypeInfo::Boolean,
                other.type_info(),
            )),
        },
        TypeInfo::Text => match value {
            Value::Text(v) => Ok(Value::Text(v)),
            Value::Int(v) => Ok(Value::text(v.to_string().as_str())),
            Value::Float(v) => Ok(Value::text(v.to_string().as_str())),
            Value::Bool(v) => Ok(Value::text(if v { "true" } else { "false" })),
            other => Err(EvalError::type_mismatch(
                "cast",
                TypeInfo::Text,
                other.type_info(),
            )),
        },
        target => {
            let actual = value.type_info();
            Err(EvalError::type_mismatch("cast", target.clone(), actual))
        }
    }
}

/// Converts its operand to a fixed target type.
pub struct Cast {
    target: TypeInfo,
    inner: ExprBox,
}

impl Cast {
    pub fn new(target: TypeInfo, inner: ExprBox) -> EvalResult<Cast> {
        let from = inner.result_type();
        if !is_castable(&from, &target) {
            return Err(EvalError::type_mismatch("cast", target, from));
        }
        Ok(Cast { target, inner })
    }

    /// Wrap `inner` only when its type differs from `target`.
    pub fn wrap_if_needed(target: TypeInfo, inner: ExprBox) -> EvalResult<ExprBox> {
        if inner.result_type() == target {
            Ok(inner)
        } else {
            Ok(Box::new(Cast::new(target, inner)?))
        }
    }
}

impl Expression for Cast {
    fn result_type(&self) -> TypeInfo {
        self.target.clone()
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        let value = self.inner.compute(state)?;
        convert(value, &self.target)
    }

    fn is_constant(&self) -> bool {
        self.inner.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.inner, ctx)?;
        if self.is_constant() {
            let value = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(value)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(Cast {
            target: self.target.clone(),
            inner: self.inner.duplicate(ctx)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberKind;

    fn cast_value(target: TypeInfo, value: Value) -> EvalResult<Value> {
        convert(value, &target)
    }

    #[test]
    fn test_numeric_casts() {
        assert_eq!(
            cast_value(TypeInfo::FloatingPoint, Value::Int(3)).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            cast_value(TypeInfo::Integer, Value::Float(3.9)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            cast_value(TypeInfo::Integer, Value::text(" 42 ")).unwrap(),
            Value::Int(42)
        );
        assert!(matches!(
            cast_value(TypeInfo::Integer, Value::text("4x")),
            Err(EvalError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_boolean_casts() {
        assert_eq!(
            cast_value(TypeInfo::Boolean, Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            cast_value(TypeInfo::Boolean, Value::Float(0.0)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            cast_value(TypeInfo::Boolean, Value::text("true")).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            cast_value(TypeInfo::Boolean, Value::text("yes")),
            Err(EvalError::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_text_casts() {
        assert_eq!(
            cast_value(TypeInfo::Text, Value::Int(-5)).unwrap(),
            Value::text("-5")
        );
        assert_eq!(
            cast_value(TypeInfo::Text, Value::Bool(false)).unwrap(),
            Value::text("false")
        );
    }

    #[test]
    fn test_static_rejection() {
        assert!(is_castable(&TypeInfo::Integer, &TypeInfo::Text));
        assert!(is_castable(&TypeInfo::Generic, &TypeInfo::Integer));
        assert!(!is_castable(
            &TypeInfo::Member(MemberKind::Item),
            &TypeInfo::Integer
        ));
        assert!(!is_castable(
            &TypeInfo::list_of(TypeInfo::Integer),
            &TypeInfo::Integer
        ));

        // Boolean casts to integer are permitted.
        assert!(Cast::new(TypeInfo::Integer, Box::new(Literal::boolean(true))).is_ok());
    }

    #[test]
    fn test_cast_node_folds() {
        let ctx = crate::context::test_support::test_context();
        let node = Cast::new(TypeInfo::Text, Box::new(Literal::int(12))).unwrap();
        let mut folded = Box::new(node).optimize(&ctx).unwrap();
        assert!(folded.as_any().is::<Literal>());
        assert_eq!(
            folded.compute(&mut EvalState::empty()).unwrap(),
            Value::text("12")
        );
    }

    #[test]
    fn test_wrap_if_needed_passthrough() {
        let same = Cast::wrap_if_needed(TypeInfo::Integer, Box::new(Literal::int(1))).unwrap();
        assert!(same.as_any().is::<Literal>());
        let wrapped = Cast::wrap_if_needed(TypeInfo::Text, Box::new(Literal::int(1))).unwrap();
        assert!(wrapped.as_any().is::<Cast>());
    }
}
