//! The expression contract and shared node plumbing.
//!
//! An expression tree is built once per query compilation, optionally
//! constant-folded via [`Expression::optimize`], duplicated once per worker
//! thread via [`Expression::duplicate`], and then evaluated repeatedly with
//! one of the `compute*` entry points against that worker's
//! [`EvalState`](crate::context::EvalState).

use std::any::Any;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::{ListValue, Value};
use crate::types::TypeInfo;

/// Boxed expression node.
pub type ExprBox = Box<dyn Expression>;

/// Boxed list-typed expression node.
pub type ListExprBox = Box<dyn ListExpression>;

/// A typed, re-evaluatable unit of computation.
///
/// Nodes are not thread-safe: a tree used from several worker threads must
/// be duplicated once per thread before that thread's first evaluation.
pub trait Expression: Send {
    /// The declared result type. Pure and stable for the node's lifetime.
    fn result_type(&self) -> TypeInfo;

    /// Evaluate against the current per-worker state.
    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value>;

    /// Integer fast path. Fails with a type mismatch unless the declared
    /// type is integer.
    fn compute_int(&mut self, state: &mut EvalState) -> EvalResult<i64> {
        let ty = self.result_type();
        if !ty.is_integer() {
            return Err(EvalError::type_mismatch(
                "compute_int",
                TypeInfo::Integer,
                ty,
            ));
        }
        self.compute(state)?.as_int()
    }

    /// Floating fast path. Integer-typed nodes widen; everything else is a
    /// type mismatch.
    fn compute_float(&mut self, state: &mut EvalState) -> EvalResult<f64> {
        let ty = self.result_type();
        if !ty.is_numeric() {
            return Err(EvalError::type_mismatch(
                "compute_float",
                TypeInfo::FloatingPoint,
                ty,
            ));
        }
        self.compute(state)?.as_float()
    }

    /// Boolean fast path. Fails with a type mismatch unless the declared
    /// type is boolean.
    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        let ty = self.result_type();
        if !ty.is_boolean() {
            return Err(EvalError::type_mismatch(
                "compute_bool",
                TypeInfo::Boolean,
                ty,
            ));
        }
        self.compute(state)?.as_bool()
    }

    /// True when repeated `compute` calls can never observe a different
    /// result. Constant folding may pre-evaluate such nodes freely.
    fn is_constant(&self) -> bool {
        false
    }

    /// Marker: node reads live backend storage (annotations, items).
    fn accesses_backend(&self) -> bool {
        false
    }

    /// Marker: unresolved placeholder that must be replaced before any
    /// evaluation.
    fn is_proxy(&self) -> bool {
        false
    }

    /// Constant-fold this subtree. Composite nodes optimize their children
    /// bottom-up and collapse to a literal when every child is constant;
    /// leaves return themselves unchanged.
    fn optimize(self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox>;

    /// Produce a clone safe for use on another worker thread. Shared
    /// immutable sub-data (compiled patterns, constant storage) is
    /// referenced, never copied; anything mutable is fresh.
    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// An expression whose result is an ordered, 0-indexed, random-access
/// sequence with a fixed element type.
pub trait ListExpression: Expression {
    /// Element type, fixed for the node's lifetime.
    fn element_type(&self) -> TypeInfo;

    /// Whether the size can change between evaluations.
    fn size_is_fixed(&self) -> bool;

    /// Statically known size, if any. Fixed-size nodes report their length
    /// without evaluating.
    fn fixed_size(&self) -> Option<usize> {
        None
    }

    /// Current number of elements.
    fn size(&mut self, state: &mut EvalState) -> EvalResult<usize>;

    /// Materialize the whole sequence.
    fn compute_list(&mut self, state: &mut EvalState) -> EvalResult<ListValue>;

    /// Evaluate a single element. `index` is already bounds-resolved.
    fn compute_item(&mut self, state: &mut EvalState, index: usize) -> EvalResult<Value>;

    fn compute_item_int(&mut self, state: &mut EvalState, index: usize) -> EvalResult<i64> {
        self.compute_item(state, index)?.as_int()
    }

    fn compute_item_float(&mut self, state: &mut EvalState, index: usize) -> EvalResult<f64> {
        self.compute_item(state, index)?.as_float()
    }

    fn compute_item_bool(&mut self, state: &mut EvalState, index: usize) -> EvalResult<bool> {
        self.compute_item(state, index)?.as_bool()
    }

    /// List-preserving counterpart of [`Expression::optimize`].
    fn optimize_list(self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ListExprBox>;

    /// List-preserving counterpart of [`Expression::duplicate`].
    fn duplicate_list(&self, ctx: &EvaluationContext) -> EvalResult<ListExprBox>;
}

/// Constant scalar (or pre-materialized list) value.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    value: Value,
    ty: TypeInfo,
}

impl Literal {
    pub fn new(value: Value) -> Literal {
        let ty = value.type_info();
        Literal { value, ty }
    }

    pub fn int(value: i64) -> Literal {
        Literal::new(Value::Int(value))
    }

    pub fn float(value: f64) -> Literal {
        Literal::new(Value::Float(value))
    }

    pub fn boolean(value: bool) -> Literal {
        Literal::new(Value::Bool(value))
    }

    pub fn text(value: impl Into<std::sync::Arc<str>>) -> Literal {
        Literal::new(Value::Text(value.into()))
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Expression for Literal {
    fn result_type(&self) -> TypeInfo {
        self.ty.clone()
    }

    fn compute(&mut self, _state: &mut EvalState) -> EvalResult<Value> {
        Ok(self.value.clone())
    }

    fn compute_int(&mut self, _state: &mut EvalState) -> EvalResult<i64> {
        self.value.as_int()
    }

    fn compute_float(&mut self, _state: &mut EvalState) -> EvalResult<f64> {
        self.value.as_float()
    }

    fn compute_bool(&mut self, _state: &mut EvalState) -> EvalResult<bool> {
        self.value.as_bool()
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Placeholder for a construct the factory has not resolved yet.
///
/// Proxies carry a name for diagnostics and refuse every evaluation
/// entry point.
#[derive(Debug, Clone)]
pub struct ProxyExpression {
    name: String,
    ty: TypeInfo,
}

impl ProxyExpression {
    pub fn new(name: impl Into<String>, ty: TypeInfo) -> ProxyExpression {
        ProxyExpression {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Expression for ProxyExpression {
    fn result_type(&self) -> TypeInfo {
        self.ty.clone()
    }

    fn compute(&mut self, _state: &mut EvalState) -> EvalResult<Value> {
        Err(EvalError::incorrect_use(format!(
            "proxy expression '{}' evaluated before resolution",
            self.name
        )))
    }

    fn is_proxy(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Err(EvalError::incorrect_use(format!(
            "proxy expression '{}' duplicated before resolution",
            self.name
        )))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Optimize a child slot in place, reporting whether every surviving child
/// of the caller can still be constant.
pub(crate) fn optimize_in_place(
    slot: &mut ExprBox,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let expr = std::mem::replace(
        slot,
        Box::new(ProxyExpression::new("optimize scratch", TypeInfo::Generic)),
    );
    *slot = expr.optimize(ctx)?;
    Ok(())
}

/// List-preserving variant of [`optimize_in_place`].
pub(crate) fn optimize_list_in_place(
    slot: &mut ListExprBox,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let expr = std::mem::replace(slot, Box::new(EmptyListScratch));
    *slot = expr.optimize_list(ctx)?;
    Ok(())
}

/// Evaluate a constant node once, outside any worker state.
///
/// Safe because constant nodes by definition read no per-item state.
pub(crate) fn evaluate_constant(expr: &mut dyn Expression) -> EvalResult<Value> {
    expr.compute(&mut EvalState::empty())
}

/// Zero-size stand-in used only while a list slot is being optimized.
struct EmptyListScratch;

impl Expression for EmptyListScratch {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(TypeInfo::Generic)
    }

    fn compute(&mut self, _state: &mut EvalState) -> EvalResult<Value> {
        Err(EvalError::internal("list scratch node evaluated"))
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Err(EvalError::internal("list scratch node duplicated"))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ListExpression for EmptyListScratch {
    fn element_type(&self) -> TypeInfo {
        TypeInfo::Generic
    }

    fn size_is_fixed(&self) -> bool {
        true
    }

    fn size(&mut self, _state: &mut EvalState) -> EvalResult<usize> {
        Err(EvalError::internal("list scratch node evaluated"))
    }

    fn compute_list(&mut self, _state: &mut EvalState) -> EvalResult<ListValue> {
        Err(EvalError::internal("list scratch node evaluated"))
    }

    fn compute_item(&mut self, _state: &mut EvalState, _index: usize) -> EvalResult<Value> {
        Err(EvalError::internal("list scratch node evaluated"))
    }

    fn optimize_list(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(self)
    }

    fn duplicate_list(&self, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Err(EvalError::internal("list scratch node duplicated"))
    }
}
