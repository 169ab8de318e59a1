//! Unary operator nodes.

use std::any::Any;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::binary::NumericKind;
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::TypeInfo;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Numeric negation.
    Negate,
    /// Logical negation.
    Not,
    /// Bitwise complement, integer-only.
    BitNot,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

/// Unary operation over a single operand.
pub struct UnaryExpression {
    op: UnaryOp,
    ty: TypeInfo,
    inner: ExprBox,
}

impl std::fmt::Debug for UnaryExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnaryExpression")
            .field("op", &self.op)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl UnaryExpression {
    pub fn new(op: UnaryOp, inner: ExprBox) -> EvalResult<UnaryExpression> {
        let inner_ty = inner.result_type();
        let ty = match op {
            UnaryOp::Negate => {
                if !inner_ty.is_numeric() {
                    return Err(EvalError::type_mismatch(
                        "operator -",
                        "numeric",
                        inner_ty,
                    ));
                }
                inner_ty
            }
            UnaryOp::Not => {
                if !inner_ty.is_boolean() {
                    return Err(EvalError::type_mismatch(
                        "operator !",
                        TypeInfo::Boolean,
                        inner_ty,
                    ));
                }
                TypeInfo::Boolean
            }
            UnaryOp::BitNot => {
                if !inner_ty.is_integer() {
                    return Err(EvalError::type_mismatch(
                        "operator ~",
                        TypeInfo::Integer,
                        inner_ty,
                    ));
                }
                TypeInfo::Integer
            }
        };
        Ok(UnaryExpression { op, ty, inner })
    }

    fn numeric_kind(&self) -> NumericKind {
        if self.ty.is_floating_point() {
            NumericKind::FloatingPoint
        } else {
            NumericKind::Integer
        }
    }
}

impl Expression for UnaryExpression {
    fn result_type(&self) -> TypeInfo {
        self.ty.clone()
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        match self.op {
            UnaryOp::Negate => match self.numeric_kind() {
                NumericKind::Integer => self.compute_int(state).map(Value::Int),
                NumericKind::FloatingPoint => self.compute_float(state).map(Value::Float),
            },
            UnaryOp::Not => self.compute_bool(state).map(Value::Bool),
            UnaryOp::BitNot => self.compute_int(state).map(Value::Int),
        }
    }

    fn compute_int(&mut self, state: &mut EvalState) -> EvalResult<i64> {
        match self.op {
            UnaryOp::Negate if self.ty.is_integer() => {
                Ok(self.inner.compute_int(state)?.wrapping_neg())
            }
            UnaryOp::BitNot => Ok(!self.inner.compute_int(state)?),
            _ => Err(EvalError::type_mismatch(
                "compute_int",
                TypeInfo::Integer,
                self.ty.clone(),
            )),
        }
    }

    fn compute_float(&mut self, state: &mut EvalState) -> EvalResult<f64> {
        match self.op {
            UnaryOp::Negate => Ok(-self.inner.compute_float(state)?),
            _ => Err(EvalError::type_mismatch(
                "compute_float",
                TypeInfo::FloatingPoint,
                self.ty.clone(),
            )),
        }
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        match self.op {
            UnaryOp::Not => Ok(!self.inner.compute_bool(state)?),
            _ => Err(EvalError::type_mismatch(
                "compute_bool",
                TypeInfo::Boolean,
                self.ty.clone(),
            )),
        }
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
        Ok(Box::new(UnaryExpression {
            op: self.op,
            ty: self.ty.clone(),
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
    use crate::context::test_support::test_context;

    #[test]
    fn test_negate() {
        let mut state = EvalState::empty();
        let mut node =
            UnaryExpression::new(UnaryOp::Negate, Box::new(Literal::int(42))).unwrap();
        assert_eq!(node.result_type(), TypeInfo::Integer);
        assert_eq!(node.compute_int(&mut state).unwrap(), -42);

        let mut node =
            UnaryExpression::new(UnaryOp::Negate, Box::new(Literal::float(1.5))).unwrap();
        assert_eq!(node.result_type(), TypeInfo::FloatingPoint);
        assert_eq!(node.compute_float(&mut state).unwrap(), -1.5);
        // Integer fast path refuses the floating form.
        assert!(node.compute_int(&mut state).is_err());
    }

    #[test]
    fn test_not() {
        let mut state = EvalState::empty();
        let mut node =
            UnaryExpression::new(UnaryOp::Not, Box::new(Literal::boolean(true))).unwrap();
        assert!(!node.compute_bool(&mut state).unwrap());

        let err = UnaryExpression::new(UnaryOp::Not, Box::new(Literal::int(1))).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_bit_not_integer_only() {
        let mut state = EvalState::empty();
        let mut node =
            UnaryExpression::new(UnaryOp::BitNot, Box::new(Literal::int(0))).unwrap();
        assert_eq!(node.compute_int(&mut state).unwrap(), -1);

        let err =
            UnaryExpression::new(UnaryOp::BitNot, Box::new(Literal::float(1.0))).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_constant_folding() {
        let ctx = test_context();
        let node = UnaryExpression::new(UnaryOp::Negate, Box::new(Literal::int(5))).unwrap();
        let mut folded = Box::new(node).optimize(&ctx).unwrap();
        assert!(folded.as_any().is::<Literal>());
        assert_eq!(folded.compute_int(&mut EvalState::empty()).unwrap(), -5);
    }
}
