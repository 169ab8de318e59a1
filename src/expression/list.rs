//! Array literals, list views and index-based access.
//!
//! Index semantics are shared across every node here: a negative index `i`
//! resolves to `size + i`, and anything still out of range after that
//! wraparound is an [`EvalError::IndexOutOfBounds`], never clamped.

use std::any::Any;
use std::sync::Arc;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::core::{
    evaluate_constant, optimize_in_place, optimize_list_in_place, ExprBox, Expression,
    ListExprBox, ListExpression, Literal,
};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::{ListValue, Value};
use crate::types::TypeInfo;

/// Resolve a possibly negative index against the current size.
pub(crate) fn resolve_index(index: i64, size: usize) -> EvalResult<usize> {
    let adjusted = if index < 0 {
        index + size as i64
    } else {
        index
    };
    if adjusted < 0 || adjusted >= size as i64 {
        return Err(EvalError::IndexOutOfBounds { index, size });
    }
    Ok(adjusted as usize)
}

fn check_element_type(element_type: &TypeInfo) -> EvalResult<()> {
    match element_type {
        TypeInfo::Integer
        | TypeInfo::FloatingPoint
        | TypeInfo::Boolean
        | TypeInfo::Text
        | TypeInfo::Generic => Ok(()),
        other => Err(EvalError::unsupported(format!(
            "list element type {}; use generic elements instead",
            other
        ))),
    }
}

/// Fixed-size constant array.
#[derive(Clone)]
pub struct ArrayLiteral {
    values: ListValue,
}

impl ArrayLiteral {
    pub fn from_list(values: ListValue) -> ArrayLiteral {
        ArrayLiteral { values }
    }

    pub fn ints(values: Vec<i64>) -> ArrayLiteral {
        ArrayLiteral::from_list(ListValue::ints(values))
    }

    pub fn floats(values: Vec<f64>) -> ArrayLiteral {
        ArrayLiteral::from_list(ListValue::floats(values))
    }

    pub fn bools(values: Vec<bool>) -> ArrayLiteral {
        ArrayLiteral::from_list(ListValue::bools(values))
    }

    pub fn texts(values: Vec<Arc<str>>) -> ArrayLiteral {
        ArrayLiteral::from_list(ListValue::texts(values))
    }

    pub fn generics(values: Vec<Value>) -> ArrayLiteral {
        ArrayLiteral::from_list(ListValue::generics(values))
    }

    pub fn values(&self) -> &ListValue {
        &self.values
    }
}

impl Expression for ArrayLiteral {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(self.values.element_type())
    }

    fn compute(&mut self, _state: &mut EvalState) -> EvalResult<Value> {
        Ok(Value::List(self.values.clone()))
    }

    fn is_constant(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        // The storage is shared, not copied.
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ListExpression for ArrayLiteral {
    fn element_type(&self) -> TypeInfo {
        self.values.element_type()
    }

    fn size_is_fixed(&self) -> bool {
        true
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(self.values.len())
    }

    fn size(&mut self, _state: &mut EvalState) -> EvalResult<usize> {
        Ok(self.values.len())
    }

    fn compute_list(&mut self, _state: &mut EvalState) -> EvalResult<ListValue> {
        Ok(self.values.clone())
    }

    fn compute_item(&mut self, _state: &mut EvalState, index: usize) -> EvalResult<Value> {
        self.values
            .get(index)
            .ok_or(EvalError::IndexOutOfBounds {
                index: index as i64,
                size: self.values.len(),
            })
    }

    fn compute_item_int(&mut self, _state: &mut EvalState, index: usize) -> EvalResult<i64> {
        match &self.values {
            ListValue::Int(values) => {
                values
                    .get(index)
                    .copied()
                    .ok_or(EvalError::IndexOutOfBounds {
                        index: index as i64,
                        size: values.len(),
                    })
            }
            _ => Err(EvalError::type_mismatch(
                "compute_item_int",
                TypeInfo::Integer,
                self.values.element_type(),
            )),
        }
    }

    fn optimize_list(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(self)
    }

    fn duplicate_list(&self, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(Box::new(self.clone()))
    }
}

/// Fixed-size list view over N scalar expressions.
pub struct ListWrapper {
    element_type: TypeInfo,
    elements: Vec<ExprBox>,
}

impl ListWrapper {
    pub fn new(element_type: TypeInfo, elements: Vec<ExprBox>) -> EvalResult<ListWrapper> {
        check_element_type(&element_type)?;
        if elements.is_empty() {
            return Err(EvalError::incorrect_use(
                "list wrapper requires at least one element",
            ));
        }
        for element in &elements {
            let ty = element.result_type();
            if ty != element_type && !element_type.is_generic() && !ty.is_generic() {
                return Err(EvalError::type_mismatch(
                    "list element",
                    element_type.clone(),
                    ty,
                ));
            }
        }
        Ok(ListWrapper {
            element_type,
            elements,
        })
    }

    /// Evaluate all elements into typed storage and, on the constant path,
    /// back an [`ArrayLiteral`].
    fn materialize(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        match self.element_type {
            TypeInfo::Integer => {
                let mut out = Vec::with_capacity(self.elements.len());
                for element in &mut self.elements {
                    out.push(element.compute_int(state)?);
                }
                Ok(ListValue::ints(out))
            }
            TypeInfo::FloatingPoint => {
                let mut out = Vec::with_capacity(self.elements.len());
                for element in &mut self.elements {
                    out.push(element.compute_float(state)?);
                }
                Ok(ListValue::floats(out))
            }
            TypeInfo::Boolean => {
                let mut out = Vec::with_capacity(self.elements.len());
                for element in &mut self.elements {
                    out.push(element.compute_bool(state)?);
                }
                Ok(ListValue::bools(out))
            }
            TypeInfo::Text => {
                let mut out = Vec::with_capacity(self.elements.len());
                for element in &mut self.elements {
                    out.push(element.compute(state)?.as_text()?);
                }
                Ok(ListValue::texts(out))
            }
            _ => {
                let mut out = Vec::with_capacity(self.elements.len());
                for element in &mut self.elements {
                    out.push(element.compute(state)?);
                }
                Ok(ListValue::generics(out))
            }
        }
    }

    fn fold(&mut self, ctx: &EvaluationContext) -> EvalResult<Option<ListValue>> {
        for element in &mut self.elements {
            optimize_in_place(element, ctx)?;
        }
        if self.elements.iter().all(|e| e.is_constant()) {
            return self.materialize(&mut EvalState::empty()).map(Some);
        }
        Ok(None)
    }
}

impl Expression for ListWrapper {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(self.element_type.clone())
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.materialize(state).map(Value::List)
    }

    fn is_constant(&self) -> bool {
        self.elements.iter().all(|e| e.is_constant())
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        match self.fold(ctx)? {
            Some(values) => Ok(Box::new(ArrayLiteral::from_list(values))),
            None => Ok(self),
        }
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.duplicate_parts(ctx)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ListWrapper {
    fn duplicate_parts(&self, ctx: &EvaluationContext) -> EvalResult<ListWrapper> {
        let elements = self
            .elements
            .iter()
            .map(|e| e.duplicate(ctx))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(ListWrapper {
            element_type: self.element_type.clone(),
            elements,
        })
    }
}

impl ListExpression for ListWrapper {
    fn element_type(&self) -> TypeInfo {
        self.element_type.clone()
    }

    fn size_is_fixed(&self) -> bool {
        true
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(self.elements.len())
    }

    fn size(&mut self, _state: &mut EvalState) -> EvalResult<usize> {
        Ok(self.elements.len())
    }

    fn compute_list(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        self.materialize(state)
    }

    fn compute_item(&mut self, state: &mut EvalState, index: usize) -> EvalResult<Value> {
        let size = self.elements.len();
        let element = self
            .elements
            .get_mut(index)
            .ok_or(EvalError::IndexOutOfBounds {
                index: index as i64,
                size,
            })?;
        element.compute(state)
    }

    fn compute_item_int(&mut self, state: &mut EvalState, index: usize) -> EvalResult<i64> {
        let size = self.elements.len();
        let element = self
            .elements
            .get_mut(index)
            .ok_or(EvalError::IndexOutOfBounds {
                index: index as i64,
                size,
            })?;
        element.compute_int(state)
    }

    fn optimize_list(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        match self.fold(ctx)? {
            Some(values) => Ok(Box::new(ArrayLiteral::from_list(values))),
            None => Ok(self),
        }
    }

    fn duplicate_list(&self, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(Box::new(self.duplicate_parts(ctx)?))
    }
}

/// Single-element access into a list source.
pub struct IndexAccess {
    source: ListExprBox,
    index: ExprBox,
}

impl std::fmt::Debug for IndexAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexAccess").finish_non_exhaustive()
    }
}

impl IndexAccess {
    pub fn new(source: ListExprBox, index: ExprBox) -> EvalResult<IndexAccess> {
        let index_ty = index.result_type();
        if !index_ty.is_integer() {
            return Err(EvalError::type_mismatch(
                "list index",
                TypeInfo::Integer,
                index_ty,
            ));
        }
        Ok(IndexAccess { source, index })
    }

    fn resolved_index(&mut self, state: &mut EvalState) -> EvalResult<usize> {
        let size = self.source.size(state)?;
        let raw = self.index.compute_int(state)?;
        resolve_index(raw, size)
    }
}

impl Expression for IndexAccess {
    fn result_type(&self) -> TypeInfo {
        self.source.element_type()
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        let index = self.resolved_index(state)?;
        self.source.compute_item(state, index)
    }

    fn compute_int(&mut self, state: &mut EvalState) -> EvalResult<i64> {
        let ty = self.source.element_type();
        if !ty.is_integer() {
            return Err(EvalError::type_mismatch(
                "compute_int",
                TypeInfo::Integer,
                ty,
            ));
        }
        let index = self.resolved_index(state)?;
        self.source.compute_item_int(state, index)
    }

    fn compute_float(&mut self, state: &mut EvalState) -> EvalResult<f64> {
        let ty = self.source.element_type();
        if !ty.is_numeric() {
            return Err(EvalError::type_mismatch(
                "compute_float",
                TypeInfo::FloatingPoint,
                ty,
            ));
        }
        let index = self.resolved_index(state)?;
        self.source.compute_item_float(state, index)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        let ty = self.source.element_type();
        if !ty.is_boolean() {
            return Err(EvalError::type_mismatch(
                "compute_bool",
                TypeInfo::Boolean,
                ty,
            ));
        }
        let index = self.resolved_index(state)?;
        self.source.compute_item_bool(state, index)
    }

    fn is_constant(&self) -> bool {
        self.source.is_constant() && self.index.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_list_in_place(&mut self.source, ctx)?;
        optimize_in_place(&mut self.index, ctx)?;
        if self.is_constant() {
            let value = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(value)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(IndexAccess {
            source: self.source.duplicate_list(ctx)?,
            index: self.index.duplicate(ctx)?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Batch/filtered access: the elements of a source list selected by an
/// index list, in index-list order.
///
/// With a dynamic-size index list a fresh result buffer is allocated on
/// every call; that cost is inherent to the dynamic shape.
pub struct BatchAccess {
    source: ListExprBox,
    indices: ListExprBox,
}

impl std::fmt::Debug for BatchAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchAccess").finish_non_exhaustive()
    }
}

impl BatchAccess {
    pub fn new(source: ListExprBox, indices: ListExprBox) -> EvalResult<BatchAccess> {
        let index_ty = indices.element_type();
        if !index_ty.is_integer() {
            return Err(EvalError::type_mismatch(
                "index list",
                TypeInfo::Integer,
                index_ty,
            ));
        }
        if indices.fixed_size() == Some(0) {
            return Err(EvalError::incorrect_use("empty index list"));
        }
        Ok(BatchAccess { source, indices })
    }

    fn gather(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        let source_size = self.source.size(state)?;
        let count = self.indices.size(state)?;
        match self.source.element_type() {
            TypeInfo::Integer => {
                let mut out = Vec::with_capacity(count);
                for k in 0..count {
                    let raw = self.indices.compute_item_int(state, k)?;
                    let index = resolve_index(raw, source_size)?;
                    out.push(self.source.compute_item_int(state, index)?);
                }
                Ok(ListValue::ints(out))
            }
            TypeInfo::FloatingPoint => {
                let mut out = Vec::with_capacity(count);
                for k in 0..count {
                    let raw = self.indices.compute_item_int(state, k)?;
                    let index = resolve_index(raw, source_size)?;
                    out.push(self.source.compute_item_float(state, index)?);
                }
                Ok(ListValue::floats(out))
            }
            TypeInfo::Boolean => {
                let mut out = Vec::with_capacity(count);
                for k in 0..count {
                    let raw = self.indices.compute_item_int(state, k)?;
                    let index = resolve_index(raw, source_size)?;
                    out.push(self.source.compute_item_bool(state, index)?);
                }
                Ok(ListValue::bools(out))
            }
            TypeInfo::Text => {
                let mut out = Vec::with_capacity(count);
                for k in 0..count {
                    let raw = self.indices.compute_item_int(state, k)?;
                    let index = resolve_index(raw, source_size)?;
                    out.push(self.source.compute_item(state, index)?.as_text()?);
                }
                Ok(ListValue::texts(out))
            }
            _ => {
                let mut out = Vec::with_capacity(count);
                for k in 0..count {
                    let raw = self.indices.compute_item_int(state, k)?;
                    let index = resolve_index(raw, source_size)?;
                    out.push(self.source.compute_item(state, index)?);
                }
                Ok(ListValue::generics(out))
            }
        }
    }

    fn fold(&mut self, ctx: &EvaluationContext) -> EvalResult<Option<ListValue>> {
        optimize_list_in_place(&mut self.source, ctx)?;
        optimize_list_in_place(&mut self.indices, ctx)?;
        if self.source.is_constant() && self.indices.is_constant() {
            return self.gather(&mut EvalState::empty()).map(Some);
        }
        Ok(None)
    }

    fn duplicate_parts(&self, ctx: &EvaluationContext) -> EvalResult<BatchAccess> {
        Ok(BatchAccess {
            source: self.source.duplicate_list(ctx)?,
            indices: self.indices.duplicate_list(ctx)?,
        })
    }
}

impl Expression for BatchAccess {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(self.source.element_type())
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.gather(state).map(Value::List)
    }

    fn is_constant(&self) -> bool {
        self.source.is_constant() && self.indices.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        match self.fold(ctx)? {
            Some(values) => Ok(Box::new(ArrayLiteral::from_list(values))),
            None => Ok(self),
        }
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.duplicate_parts(ctx)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ListExpression for BatchAccess {
    fn element_type(&self) -> TypeInfo {
        self.source.element_type()
    }

    fn size_is_fixed(&self) -> bool {
        self.indices.size_is_fixed()
    }

    fn fixed_size(&self) -> Option<usize> {
        self.indices.fixed_size()
    }

    fn size(&mut self, state: &mut EvalState) -> EvalResult<usize> {
        self.indices.size(state)
    }

    fn compute_list(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        self.gather(state)
    }

    fn compute_item(&mut self, state: &mut EvalState, index: usize) -> EvalResult<Value> {
        let source_size = self.source.size(state)?;
        let raw = self.indices.compute_item_int(state, index)?;
        let resolved = resolve_index(raw, source_size)?;
        self.source.compute_item(state, resolved)
    }

    fn optimize_list(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        match self.fold(ctx)? {
            Some(values) => Ok(Box::new(ArrayLiteral::from_list(values))),
            None => Ok(self),
        }
    }

    fn duplicate_list(&self, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(Box::new(self.duplicate_parts(ctx)?))
    }
}

/// Adapter presenting any list-typed expression through the
/// [`ListExpression`] interface.
///
/// The delegate is re-evaluated per call, so size and elements always
/// reflect the current input; this is the dynamic-size flavor.
pub struct ListAdapter {
    element_type: TypeInfo,
    inner: ExprBox,
}

impl std::fmt::Debug for ListAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListAdapter")
            .field("element_type", &self.element_type)
            .finish_non_exhaustive()
    }
}

impl ListAdapter {
    pub fn new(inner: ExprBox) -> EvalResult<ListAdapter> {
        let ty = inner.result_type();
        let element_type = match ty.element_type() {
            Some(element) => element.clone(),
            None => {
                return Err(EvalError::type_mismatch("list adapter", "list", ty));
            }
        };
        Ok(ListAdapter {
            element_type,
            inner,
        })
    }
}

impl Expression for ListAdapter {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(self.element_type.clone())
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.inner.compute(state)
    }

    fn is_constant(&self) -> bool {
        self.inner.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.inner, ctx)?;
        if self.inner.is_constant() {
            let value = evaluate_constant(self.inner.as_mut())?;
            return Ok(Box::new(ArrayLiteral::from_list(value.as_list()?.clone())));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(ListAdapter {
            element_type: self.element_type.clone(),
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

impl ListExpression for ListAdapter {
    fn element_type(&self) -> TypeInfo {
        self.element_type.clone()
    }

    fn size_is_fixed(&self) -> bool {
        false
    }

    fn size(&mut self, state: &mut EvalState) -> EvalResult<usize> {
        Ok(self.inner.compute(state)?.as_list()?.len())
    }

    fn compute_list(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        Ok(self.inner.compute(state)?.as_list()?.clone())
    }

    fn compute_item(&mut self, state: &mut EvalState, index: usize) -> EvalResult<Value> {
        let list = self.inner.compute(state)?;
        let list = list.as_list()?;
        list.get(index).ok_or(EvalError::IndexOutOfBounds {
            index: index as i64,
            size: list.len(),
        })
    }

    fn optimize_list(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        optimize_in_place(&mut self.inner, ctx)?;
        if self.inner.is_constant() {
            let value = evaluate_constant(self.inner.as_mut())?;
            return Ok(Box::new(ArrayLiteral::from_list(value.as_list()?.clone())));
        }
        Ok(self)
    }

    fn duplicate_list(&self, ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(Box::new(ListAdapter {
            element_type: self.element_type.clone(),
            inner: self.inner.duplicate(ctx)?,
        }))
    }
}
