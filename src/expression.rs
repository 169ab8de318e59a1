//! Typed expression trees for query evaluation.
//!
//! This module provides:
//! - The [`Expression`](core::Expression) contract with primitive fast
//!   paths, constant folding and per-worker duplication
//! - The value model shared by all nodes
//! - Array/list nodes, operators, set predicates and annotation access

pub mod annotation;
pub mod binary;
pub mod cast;
pub mod core;
pub mod error;
pub mod list;
pub mod logical;
pub mod set;
pub mod strings;
pub mod unary;
pub mod value;

pub use annotation::{annotation_access, multi_annotation_access, AnnotationList};
pub use binary::{ArithmeticOp, BinaryArithmetic, Comparison, ComparisonOp};
pub use cast::Cast;
pub use self::core::{ExprBox, Expression, ListExprBox, ListExpression, Literal, ProxyExpression};
pub use error::{EvalError, EvalResult};
pub use list::{ArrayLiteral, BatchAccess, IndexAccess, ListAdapter, ListWrapper};
pub use logical::{Conditional, LogicalOp, NaryLogical};
pub use set::{SetMode, SetPredicate};
pub use strings::{Concat, RegexMatch, StringMode};
pub use unary::{UnaryExpression, UnaryOp};
pub use value::{ListValue, Value};

#[cfg(test)]
pub(crate) mod test_support {
    use std::any::Any;

    use crate::context::{EvalState, EvaluationContext};
    use crate::expression::core::{ExprBox, Expression};
    use crate::expression::error::EvalResult;
    use crate::expression::value::Value;
    use crate::types::TypeInfo;

    /// Fixed value behind a non-constant node, for exercising the dynamic
    /// paths of optimizers and accessors.
    pub(crate) struct Opaque {
        value: Value,
    }

    impl Opaque {
        pub(crate) fn new(value: Value) -> Opaque {
            Opaque { value }
        }

        pub(crate) fn int(value: i64) -> ExprBox {
            Box::new(Opaque::new(Value::Int(value)))
        }

        pub(crate) fn text(value: &str) -> ExprBox {
            Box::new(Opaque::new(Value::from(value)))
        }
    }

    impl Expression for Opaque {
        fn result_type(&self) -> TypeInfo {
            self.value.type_info()
        }

        fn compute(&mut self, _state: &mut EvalState) -> EvalResult<Value> {
            Ok(self.value.clone())
        }

        fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
            Ok(self)
        }

        fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
            Ok(Box::new(Opaque {
                value: self.value.clone(),
            }))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    }
}
