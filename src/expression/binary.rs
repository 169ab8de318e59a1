//! Binary arithmetic and comparison nodes.
//!
//! The integer-vs-floating implementation of a node is chosen once at
//! construction from the static operand types: either operand being
//! floating-point makes the whole node floating-point. This is a
//! correctness rule, not an optimization.

use std::any::Any;
use std::cmp::Ordering;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::strings::{text_compare, text_equal, StringMode};
use crate::expression::value::Value;
use crate::types::TypeInfo;

/// Numeric implementation selected for an arithmetic or comparison node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Integer,
    FloatingPoint,
}

/// Promotion rule shared by all numeric operators.
pub(crate) fn numeric_kind(left: &TypeInfo, right: &TypeInfo) -> NumericKind {
    if left.is_floating_point() || right.is_floating_point() {
        NumericKind::FloatingPoint
    } else {
        NumericKind::Integer
    }
}

fn require_numeric(ty: &TypeInfo, context: &str) -> EvalResult<()> {
    if ty.is_numeric() {
        Ok(())
    } else {
        Err(EvalError::type_mismatch(context, "numeric", ty.clone()))
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl ArithmeticOp {
    /// Bitwise and shift operators have no floating-point form.
    pub fn is_integer_only(&self) -> bool {
        matches!(
            self,
            ArithmeticOp::BitAnd
                | ArithmeticOp::BitOr
                | ArithmeticOp::BitXor
                | ArithmeticOp::ShiftLeft
                | ArithmeticOp::ShiftRight
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
            ArithmeticOp::BitAnd => "&",
            ArithmeticOp::BitOr => "|",
            ArithmeticOp::BitXor => "^",
            ArithmeticOp::ShiftLeft => "<<",
            ArithmeticOp::ShiftRight => ">>",
        }
    }
}

/// Binary arithmetic over two numeric operands.
pub struct BinaryArithmetic {
    op: ArithmeticOp,
    kind: NumericKind,
    left: ExprBox,
    right: ExprBox,
}

impl std::fmt::Debug for BinaryArithmetic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryArithmetic")
            .field("op", &self.op)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl BinaryArithmetic {
    pub fn new(op: ArithmeticOp, left: ExprBox, right: ExprBox) -> EvalResult<BinaryArithmetic> {
        let left_ty = left.result_type();
        let right_ty = right.result_type();
        require_numeric(&left_ty, "arithmetic operand")?;
        require_numeric(&right_ty, "arithmetic operand")?;
        let kind = numeric_kind(&left_ty, &right_ty);
        if kind == NumericKind::FloatingPoint && op.is_integer_only() {
            return Err(EvalError::type_mismatch(
                format!("operator {}", op.as_str()),
                TypeInfo::Integer,
                TypeInfo::FloatingPoint,
            ));
        }
        Ok(BinaryArithmetic {
            op,
            kind,
            left,
            right,
        })
    }

    fn apply_int(&self, left: i64, right: i64) -> EvalResult<i64> {
        Ok(match self.op {
            ArithmeticOp::Add => left.wrapping_add(right),
            ArithmeticOp::Sub => left.wrapping_sub(right),
            ArithmeticOp::Mul => left.wrapping_mul(right),
            ArithmeticOp::Div => {
                if right == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                left.wrapping_div(right)
            }
            ArithmeticOp::Mod => {
                if right == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                left.wrapping_rem(right)
            }
            ArithmeticOp::BitAnd => left & right,
            ArithmeticOp::BitOr => left | right,
            ArithmeticOp::BitXor => left ^ right,
            ArithmeticOp::ShiftLeft => left.wrapping_shl(right as u32),
            ArithmeticOp::ShiftRight => left.wrapping_shr(right as u32),
        })
    }

    fn apply_float(&self, left: f64, right: f64) -> EvalResult<f64> {
        Ok(match self.op {
            ArithmeticOp::Add => left + right,
            ArithmeticOp::Sub => left - right,
            ArithmeticOp::Mul => left * right,
            ArithmeticOp::Div => left / right,
            ArithmeticOp::Mod => left % right,
            _ => {
                return Err(EvalError::internal(format!(
                    "integer-only operator {} constructed as floating-point",
                    self.op.as_str()
                )))
            }
        })
    }
}

impl Expression for BinaryArithmetic {
    fn result_type(&self) -> TypeInfo {
        match self.kind {
            NumericKind::Integer => TypeInfo::Integer,
            NumericKind::FloatingPoint => TypeInfo::FloatingPoint,
        }
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        match self.kind {
            NumericKind::Integer => self.compute_int(state).map(Value::Int),
            NumericKind::FloatingPoint => self.compute_float(state).map(Value::Float),
        }
    }

    fn compute_int(&mut self, state: &mut EvalState) -> EvalResult<i64> {
        if self.kind != NumericKind::Integer {
            return Err(EvalError::type_mismatch(
                "compute_int",
                TypeInfo::Integer,
                TypeInfo::FloatingPoint,
            ));
        }
        let left = self.left.compute_int(state)?;
        let right = self.right.compute_int(state)?;
        self.apply_int(left, right)
    }

    fn compute_float(&mut self, state: &mut EvalState) -> EvalResult<f64> {
        match self.kind {
            NumericKind::Integer => Ok(self.compute_int(state)? as f64),
            NumericKind::FloatingPoint => {
                let left = self.left.compute_float(state)?;
                let right = self.right.compute_float(state)?;
                self.apply_float(left, right)
            }
        }
    }

    fn is_constant(&self) -> bool {
        self.left.is_constant() && self.right.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.left, ctx)?;
        optimize_in_place(&mut self.right, ctx)?;
        if self.is_constant() {
            let value = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(value)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(BinaryArithmetic {
            op: self.op,
            kind: self.kind,
            left: self.left.duplicate(ctx)?,
            right: self.right.duplicate(ctx)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    fn matches(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::Ne => ordering != Ordering::Equal,
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::Le => ordering != Ordering::Greater,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareKind {
    Integer,
    FloatingPoint,
    Boolean,
    Text,
}

/// Comparison of two operands of a shared kind.
pub struct Comparison {
    op: ComparisonOp,
    kind: CompareKind,
    mode: StringMode,
    left: ExprBox,
    right: ExprBox,
}

impl std::fmt::Debug for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparison")
            .field("op", &self.op)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Comparison {
    pub fn new(
        op: ComparisonOp,
        left: ExprBox,
        right: ExprBox,
        mode: StringMode,
    ) -> EvalResult<Comparison> {
        let left_ty = left.result_type();
        let right_ty = right.result_type();
        let kind = if left_ty.is_numeric() && right_ty.is_numeric() {
            match numeric_kind(&left_ty, &right_ty) {
                NumericKind::Integer => CompareKind::Integer,
                NumericKind::FloatingPoint => CompareKind::FloatingPoint,
            }
        } else if left_ty.is_text() && right_ty.is_text() {
            CompareKind::Text
        } else if left_ty.is_boolean() && right_ty.is_boolean() {
            CompareKind::Boolean
        } else {
            return Err(EvalError::type_mismatch(
                format!("operator {}", op.as_str()),
                left_ty,
                right_ty,
            ));
        };
        Ok(Comparison {
            op,
            kind,
            mode,
            left,
            right,
        })
    }
}

impl Expression for Comparison {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Boolean
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_bool(state).map(Value::Bool)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        match self.kind {
            CompareKind::Integer => {
                let left = self.left.compute_int(state)?;
                let right = self.right.compute_int(state)?;
                Ok(self.op.matches(left.cmp(&right)))
            }
            CompareKind::FloatingPoint => {
                let left = self.left.compute_float(state)?;
                let right = self.right.compute_float(state)?;
                match left.partial_cmp(&right) {
                    Some(ordering) => Ok(self.op.matches(ordering)),
                    // NaN compares unequal to everything.
                    None => Ok(self.op == ComparisonOp::Ne),
                }
            }
            CompareKind::Boolean => {
                let left = self.left.compute_bool(state)?;
                let right = self.right.compute_bool(state)?;
                Ok(self.op.matches(left.cmp(&right)))
            }
            CompareKind::Text => {
                let left = self.left.compute(state)?.as_text()?;
                let right = self.right.compute(state)?.as_text()?;
                match self.op {
                    ComparisonOp::Eq => Ok(text_equal(&left, &right, self.mode)),
                    ComparisonOp::Ne => Ok(!text_equal(&left, &right, self.mode)),
                    _ => Ok(self.op.matches(text_compare(&left, &right, self.mode))),
                }
            }
        }
    }

    fn is_constant(&self) -> bool {
        self.left.is_constant() && self.right.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.left, ctx)?;
        optimize_in_place(&mut self.right, ctx)?;
        if self.is_constant() {
            let value = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(value)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(Comparison {
            op: self.op,
            kind: self.kind,
            mode: self.mode,
            left: self.left.duplicate(ctx)?,
            right: self.right.duplicate(ctx)?,
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

    fn state() -> EvalState {
        EvalState::empty()
    }

    #[test]
    fn test_integer_arithmetic() {
        let mut state = state();
        let cases = [
            (ArithmeticOp::Add, 10, 3, 13),
            (ArithmeticOp::Sub, 10, 3, 7),
            (ArithmeticOp::Mul, 10, 3, 30),
            (ArithmeticOp::Div, 10, 3, 3),
            (ArithmeticOp::Mod, 10, 3, 1),
            (ArithmeticOp::BitAnd, 0b1100, 0b1010, 0b1000),
            (ArithmeticOp::BitOr, 0b1100, 0b1010, 0b1110),
            (ArithmeticOp::BitXor, 0b1100, 0b1010, 0b0110),
            (ArithmeticOp::ShiftLeft, 1, 4, 16),
            (ArithmeticOp::ShiftRight, 16, 2, 4),
        ];
        for (op, left, right, expected) in cases {
            let mut node = BinaryArithmetic::new(
                op,
                Box::new(Literal::int(left)),
                Box::new(Literal::int(right)),
            )
            .unwrap();
            assert_eq!(node.result_type(), TypeInfo::Integer);
            assert_eq!(node.compute_int(&mut state).unwrap(), expected, "{:?}", op);
        }
    }

    #[test]
    fn test_floating_promotion() {
        let mut state = state();
        // One floating operand makes the whole node floating-point.
        let mut node = BinaryArithmetic::new(
            ArithmeticOp::Div,
            Box::new(Literal::int(1)),
            Box::new(Literal::float(2.0)),
        )
        .unwrap();
        assert_eq!(node.result_type(), TypeInfo::FloatingPoint);
        assert_eq!(node.compute_float(&mut state).unwrap(), 0.5);
        assert!(node.compute_int(&mut state).is_err());
    }

    #[test]
    fn test_bitwise_rejects_floating_operands() {
        let err = BinaryArithmetic::new(
            ArithmeticOp::BitAnd,
            Box::new(Literal::float(1.0)),
            Box::new(Literal::int(2)),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));

        let err = BinaryArithmetic::new(
            ArithmeticOp::ShiftLeft,
            Box::new(Literal::int(1)),
            Box::new(Literal::float(2.0)),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_division_by_zero() {
        let mut state = state();
        let mut node = BinaryArithmetic::new(
            ArithmeticOp::Div,
            Box::new(Literal::int(1)),
            Box::new(Literal::int(0)),
        )
        .unwrap();
        assert_eq!(
            node.compute_int(&mut state).unwrap_err(),
            EvalError::DivisionByZero
        );

        // IEEE semantics for the floating form.
        let mut node = BinaryArithmetic::new(
            ArithmeticOp::Div,
            Box::new(Literal::float(1.0)),
            Box::new(Literal::float(0.0)),
        )
        .unwrap();
        assert_eq!(node.compute_float(&mut state).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_arithmetic_rejects_non_numeric() {
        let err = BinaryArithmetic::new(
            ArithmeticOp::Add,
            Box::new(Literal::text("a")),
            Box::new(Literal::int(1)),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_constant_folding_add() {
        let ctx = test_context();
        let node = BinaryArithmetic::new(
            ArithmeticOp::Add,
            Box::new(Literal::int(3)),
            Box::new(Literal::int(4)),
        )
        .unwrap();
        let mut folded = Box::new(node).optimize(&ctx).unwrap();
        assert!(folded.is_constant());
        assert_eq!(folded.result_type(), TypeInfo::Integer);
        let literal = folded.as_any().downcast_ref::<Literal>().unwrap();
        assert_eq!(literal.value(), &Value::Int(7));
        assert_eq!(folded.compute_int(&mut state()).unwrap(), 7);
    }

    #[test]
    fn test_non_constant_survives_optimize() {
        let ctx = test_context();
        let var = ctx.variable("x");
        // Variables are generic; wrap through a cast to use in arithmetic.
        let cast =
            crate::expression::cast::Cast::new(TypeInfo::Integer, Box::new(var)).unwrap();
        let node = BinaryArithmetic::new(
            ArithmeticOp::Add,
            Box::new(cast),
            Box::new(Literal::int(4)),
        )
        .unwrap();
        let folded = Box::new(node).optimize(&ctx).unwrap();
        assert!(!folded.is_constant());
        assert!(folded.as_any().is::<BinaryArithmetic>());
    }

    #[test]
    fn test_integer_comparison() {
        let mut state = state();
        let cases = [
            (ComparisonOp::Eq, 5, 5, true),
            (ComparisonOp::Ne, 5, 3, true),
            (ComparisonOp::Lt, 3, 5, true),
            (ComparisonOp::Le, 5, 5, true),
            (ComparisonOp::Gt, 5, 3, true),
            (ComparisonOp::Ge, 3, 5, false),
        ];
        for (op, left, right, expected) in cases {
            let mut node = Comparison::new(
                op,
                Box::new(Literal::int(left)),
                Box::new(Literal::int(right)),
                StringMode::default(),
            )
            .unwrap();
            assert_eq!(node.compute_bool(&mut state).unwrap(), expected, "{:?}", op);
        }
    }

    #[test]
    fn test_mixed_numeric_comparison() {
        let mut state = state();
        let mut node = Comparison::new(
            ComparisonOp::Lt,
            Box::new(Literal::int(1)),
            Box::new(Literal::float(1.5)),
            StringMode::default(),
        )
        .unwrap();
        assert!(node.compute_bool(&mut state).unwrap());
    }

    #[test]
    fn test_nan_comparisons() {
        let mut state = state();
        for (op, expected) in [
            (ComparisonOp::Eq, false),
            (ComparisonOp::Ne, true),
            (ComparisonOp::Lt, false),
            (ComparisonOp::Ge, false),
        ] {
            let mut node = Comparison::new(
                op,
                Box::new(Literal::float(f64::NAN)),
                Box::new(Literal::float(1.0)),
                StringMode::default(),
            )
            .unwrap();
            assert_eq!(node.compute_bool(&mut state).unwrap(), expected, "{:?}", op);
        }
    }

    #[test]
    fn test_text_comparison_modes() {
        let mut state = state();
        let ci = StringMode {
            unicode: true,
            case_insensitive: true,
        };
        let mut node = Comparison::new(
            ComparisonOp::Eq,
            Box::new(Literal::text("Hello")),
            Box::new(Literal::text("hello")),
            ci,
        )
        .unwrap();
        assert!(node.compute_bool(&mut state).unwrap());

        let mut node = Comparison::new(
            ComparisonOp::Eq,
            Box::new(Literal::text("Hello")),
            Box::new(Literal::text("hello")),
            StringMode::default(),
        )
        .unwrap();
        assert!(!node.compute_bool(&mut state).unwrap());

        let mut node = Comparison::new(
            ComparisonOp::Lt,
            Box::new(Literal::text("abc")),
            Box::new(Literal::text("abd")),
            StringMode::default(),
        )
        .unwrap();
        assert!(node.compute_bool(&mut state).unwrap());
    }

    #[test]
    fn test_comparison_rejects_mixed_kinds() {
        let err = Comparison::new(
            ComparisonOp::Eq,
            Box::new(Literal::int(1)),
            Box::new(Literal::text("1")),
            StringMode::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }
}
