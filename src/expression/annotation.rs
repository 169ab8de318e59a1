//! Per-item annotation access.
//!
//! Single-key access dispatches on the annotation's declared type to one of
//! four specializations, each holding a typed accessor resolved once from
//! the corpus. Multi-key access batches several keys into one list-valued
//! node, kind-specialized when all keys agree and generic otherwise.

use std::any::Any;
use std::sync::Arc;

use crate::context::{EvalState, EvaluationContext};
use crate::corpus::{
    AnnotationFetch, AnnotationInfo, BoolFetch, FloatFetch, IntFetch, Item, ValueFetch,
};
use crate::expression::core::{ExprBox, Expression, ListExprBox, ListExpression};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::{ListValue, Value};
use crate::types::TypeInfo;

fn current_item<'a>(state: &'a EvalState, slot: usize, key: &str) -> EvalResult<&'a Item> {
    state.item(slot).ok_or_else(|| {
        EvalError::incorrect_use(format!(
            "no current item for annotation access '{}'",
            key
        ))
    })
}

/// Build the access node for one annotation key, specialized by the
/// annotation's declared type.
pub fn annotation_access(ctx: &EvaluationContext, key: &str) -> EvalResult<ExprBox> {
    let info = ctx.annotation(key)?;
    let slot = ctx
        .item_slot()
        .ok_or_else(|| EvalError::incorrect_use("annotation access outside an element scope"))?;
    Ok(match info.fetch() {
        AnnotationFetch::Integer(fetch) => Box::new(IntegerAnnotationAccess {
            key: Arc::from(key),
            fetch: Arc::clone(fetch),
            slot,
        }),
        AnnotationFetch::FloatingPoint(fetch) => Box::new(FloatAnnotationAccess {
            key: Arc::from(key),
            fetch: Arc::clone(fetch),
            slot,
        }),
        AnnotationFetch::Boolean(fetch) => Box::new(BooleanAnnotationAccess {
            key: Arc::from(key),
            fetch: Arc::clone(fetch),
            slot,
        }),
        AnnotationFetch::Generic(fetch) => Box::new(ObjectAnnotationAccess {
            key: Arc::from(key),
            value_type: info.value_type().clone(),
            fetch: Arc::clone(fetch),
            slot,
        }),
    })
}

/// Build one list-valued node over several annotation keys.
pub fn multi_annotation_access(
    ctx: &EvaluationContext,
    keys: &[&str],
) -> EvalResult<ListExprBox> {
    if keys.is_empty() {
        return Err(EvalError::incorrect_use(
            "multi-key annotation access requires at least one key",
        ));
    }
    let slot = ctx
        .item_slot()
        .ok_or_else(|| EvalError::incorrect_use("annotation access outside an element scope"))?;
    let entries = keys
        .iter()
        .map(|key| ctx.annotation(key))
        .collect::<EvalResult<Vec<_>>>()?;
    for entry in &entries {
        if entry.value_type().is_list() {
            return Err(EvalError::unsupported(format!(
                "list type as annotation result for '{}'",
                entry.key()
            )));
        }
    }
    let element_type = uniform_kind(&entries);
    Ok(Box::new(AnnotationList {
        element_type,
        entries,
        slot,
    }))
}

/// The shared element kind of a key set: the primitive kind when all keys
/// agree, generic otherwise.
fn uniform_kind(entries: &[AnnotationInfo]) -> TypeInfo {
    let mut kinds = entries.iter().map(|entry| match entry.fetch() {
        AnnotationFetch::Integer(_) => TypeInfo::Integer,
        AnnotationFetch::FloatingPoint(_) => TypeInfo::FloatingPoint,
        AnnotationFetch::Boolean(_) => TypeInfo::Boolean,
        AnnotationFetch::Generic(_) => TypeInfo::Generic,
    });
    let first = kinds.next().expect("entries checked non-empty");
    if first.is_generic() || kinds.any(|kind| kind != first) {
        TypeInfo::Generic
    } else {
        first
    }
}

fn fetch_value(info: &AnnotationInfo, item: &Item) -> Value {
    match info.fetch() {
        AnnotationFetch::Integer(fetch) => Value::Int((fetch.as_ref())(item)),
        AnnotationFetch::FloatingPoint(fetch) => Value::Float((fetch.as_ref())(item)),
        AnnotationFetch::Boolean(fetch) => Value::Bool((fetch.as_ref())(item)),
        AnnotationFetch::Generic(fetch) => (fetch.as_ref())(item),
    }
}

/// Integer-valued single-key access.
#[derive(Clone)]
pub struct IntegerAnnotationAccess {
    key: Arc<str>,
    fetch: IntFetch,
    slot: usize,
}

impl Expression for IntegerAnnotationAccess {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Integer
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_int(state).map(Value::Int)
    }

    fn compute_int(&mut self, state: &mut EvalState) -> EvalResult<i64> {
        let item = current_item(state, self.slot, &self.key)?;
        Ok((self.fetch.as_ref())(item))
    }

    fn accesses_backend(&self) -> bool {
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

/// Float-valued single-key access.
#[derive(Clone)]
pub struct FloatAnnotationAccess {
    key: Arc<str>,
    fetch: FloatFetch,
    slot: usize,
}

impl Expression for FloatAnnotationAccess {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::FloatingPoint
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_float(state).map(Value::Float)
    }

    fn compute_float(&mut self, state: &mut EvalState) -> EvalResult<f64> {
        let item = current_item(state, self.slot, &self.key)?;
        Ok((self.fetch.as_ref())(item))
    }

    fn accesses_backend(&self) -> bool {
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

/// Boolean-valued single-key access.
#[derive(Clone)]
pub struct BooleanAnnotationAccess {
    key: Arc<str>,
    fetch: BoolFetch,
    slot: usize,
}

impl Expression for BooleanAnnotationAccess {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Boolean
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_bool(state).map(Value::Bool)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        let item = current_item(state, self.slot, &self.key)?;
        Ok((self.fetch.as_ref())(item))
    }

    fn accesses_backend(&self) -> bool {
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

/// Object-valued single-key access (text, member or generic payloads).
#[derive(Clone)]
pub struct ObjectAnnotationAccess {
    key: Arc<str>,
    value_type: TypeInfo,
    fetch: ValueFetch,
    slot: usize,
}

impl Expression for ObjectAnnotationAccess {
    fn result_type(&self) -> TypeInfo {
        self.value_type.clone()
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        let item = current_item(state, self.slot, &self.key)?;
        Ok((self.fetch.as_ref())(item))
    }

    fn accesses_backend(&self) -> bool {
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

/// List view over several annotation keys of one item.
pub struct AnnotationList {
    element_type: TypeInfo,
    entries: Vec<AnnotationInfo>,
    slot: usize,
}

impl AnnotationList {
    fn duplicate_parts(&self) -> AnnotationList {
        AnnotationList {
            element_type: self.element_type.clone(),
            entries: self.entries.clone(),
            slot: self.slot,
        }
    }

    fn typed_fetch_error(&self, index: usize) -> EvalError {
        EvalError::internal(format!(
            "annotation '{}' does not match the uniform kind {}",
            self.entries[index].key(),
            self.element_type
        ))
    }
}

impl Expression for AnnotationList {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::list_of(self.element_type.clone())
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_list(state).map(Value::List)
    }

    fn accesses_backend(&self) -> bool {
        true
    }

    fn optimize(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(self)
    }

    fn duplicate(&self, _ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(self.duplicate_parts()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl ListExpression for AnnotationList {
    fn element_type(&self) -> TypeInfo {
        self.element_type.clone()
    }

    fn size_is_fixed(&self) -> bool {
        true
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(self.entries.len())
    }

    fn size(&mut self, _state: &mut EvalState) -> EvalResult<usize> {
        Ok(self.entries.len())
    }

    fn compute_list(&mut self, state: &mut EvalState) -> EvalResult<ListValue> {
        let item = current_item(state, self.slot, "batch")?.clone();
        match &self.element_type {
            TypeInfo::Integer => {
                let mut out = Vec::with_capacity(self.entries.len());
                for (index, entry) in self.entries.iter().enumerate() {
                    match entry.fetch() {
                        AnnotationFetch::Integer(fetch) => out.push((fetch.as_ref())(&item)),
                        _ => return Err(self.typed_fetch_error(index)),
                    }
                }
                Ok(ListValue::ints(out))
            }
            TypeInfo::FloatingPoint => {
                let mut out = Vec::with_capacity(self.entries.len());
                for (index, entry) in self.entries.iter().enumerate() {
                    match entry.fetch() {
                        AnnotationFetch::FloatingPoint(fetch) => out.push((fetch.as_ref())(&item)),
                        _ => return Err(self.typed_fetch_error(index)),
                    }
                }
                Ok(ListValue::floats(out))
            }
            TypeInfo::Boolean => {
                let mut out = Vec::with_capacity(self.entries.len());
                for (index, entry) in self.entries.iter().enumerate() {
                    match entry.fetch() {
                        AnnotationFetch::Boolean(fetch) => out.push((fetch.as_ref())(&item)),
                        _ => return Err(self.typed_fetch_error(index)),
                    }
                }
                Ok(ListValue::bools(out))
            }
            _ => {
                // Mixed kinds: every accessor is wrapped to its value form.
                let out = self
                    .entries
                    .iter()
                    .map(|entry| fetch_value(entry, &item))
                    .collect();
                Ok(ListValue::generics(out))
            }
        }
    }

    fn compute_item(&mut self, state: &mut EvalState, index: usize) -> EvalResult<Value> {
        let size = self.entries.len();
        let entry = self.entries.get(index).ok_or(EvalError::IndexOutOfBounds {
            index: index as i64,
            size,
        })?;
        let item = current_item(state, self.slot, entry.key())?;
        Ok(fetch_value(entry, item))
    }

    fn compute_item_int(&mut self, state: &mut EvalState, index: usize) -> EvalResult<i64> {
        self.compute_item(state, index)?.as_int()
    }

    fn optimize_list(self: Box<Self>, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(self)
    }

    fn duplicate_list(&self, _ctx: &EvaluationContext) -> EvalResult<ListExprBox> {
        Ok(Box::new(self.duplicate_parts()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::corpus::{ElementInfo, SimpleCorpus};
    use crate::types::MemberKind;

    struct Token {
        pos: i64,
        frequency: f64,
        content: &'static str,
        is_verb: bool,
    }

    fn token_corpus() -> SimpleCorpus {
        SimpleCorpus::new()
            .with_layer("tokens")
            .with_annotation(AnnotationInfo::integer("pos", |item| {
                item.downcast_ref::<Token>().map(|t| t.pos).unwrap_or(0)
            }))
            .with_annotation(AnnotationInfo::floating_point("freq", |item| {
                item.downcast_ref::<Token>()
                    .map(|t| t.frequency)
                    .unwrap_or(0.0)
            }))
            .with_annotation(AnnotationInfo::boolean("verb", |item| {
                item.downcast_ref::<Token>()
                    .map(|t| t.is_verb)
                    .unwrap_or(false)
            }))
            .with_annotation(
                AnnotationInfo::generic("form", TypeInfo::Text, |item| {
                    Value::text(
                        item.downcast_ref::<Token>()
                            .map(|t| t.content)
                            .unwrap_or(""),
                    )
                })
                .expect("text is a valid annotation type"),
            )
    }

    fn element_context() -> Arc<EvaluationContext> {
        let root = EvaluationContext::builder()
            .corpus(Arc::new(token_corpus()))
            .build()
            .unwrap();
        let lane = root.lane_builder().lane_named("tokens").build().unwrap();
        lane.element_builder()
            .element(ElementInfo::new(MemberKind::Item, vec![]))
            .build()
            .unwrap()
    }

    fn token_item() -> Item {
        Item::new(Token {
            pos: 11,
            frequency: 0.25,
            content: "run",
            is_verb: true,
        })
    }

    #[test]
    fn test_single_key_specializations() {
        let ctx = element_context();
        let mut state = ctx.new_state().unwrap();
        state.set_item(ctx.item_slot().unwrap(), token_item());

        let mut pos = annotation_access(&ctx, "pos").unwrap();
        assert!(pos.result_type().is_integer());
        assert!(pos.accesses_backend());
        assert_eq!(pos.compute_int(&mut state).unwrap(), 11);

        let mut freq = annotation_access(&ctx, "freq").unwrap();
        assert_eq!(freq.compute_float(&mut state).unwrap(), 0.25);

        let mut verb = annotation_access(&ctx, "verb").unwrap();
        assert!(verb.compute_bool(&mut state).unwrap());

        let mut form = annotation_access(&ctx, "form").unwrap();
        assert_eq!(form.result_type(), TypeInfo::Text);
        assert_eq!(form.compute(&mut state).unwrap(), Value::text("run"));
    }

    #[test]
    fn test_unknown_key() {
        let ctx = element_context();
        assert!(matches!(
            annotation_access(&ctx, "missing"),
            Err(EvalError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_access_requires_element_scope() {
        let root = EvaluationContext::builder()
            .corpus(Arc::new(token_corpus()))
            .build()
            .unwrap();
        assert!(matches!(
            annotation_access(&root, "pos"),
            Err(EvalError::IncorrectUse(_))
        ));
    }

    #[test]
    fn test_access_without_item_fails() {
        let ctx = element_context();
        let mut state = ctx.new_state().unwrap();
        let mut pos = annotation_access(&ctx, "pos").unwrap();
        assert!(matches!(
            pos.compute_int(&mut state),
            Err(EvalError::IncorrectUse(_))
        ));
    }

    #[test]
    fn test_multi_key_uniform() {
        let ctx = element_context();
        let mut state = ctx.new_state().unwrap();
        state.set_item(ctx.item_slot().unwrap(), token_item());

        let mut batch = multi_annotation_access(&ctx, &["pos", "pos"]).unwrap();
        assert_eq!(batch.element_type(), TypeInfo::Integer);
        assert_eq!(
            batch.compute_list(&mut state).unwrap(),
            ListValue::ints(vec![11, 11])
        );
        assert_eq!(batch.compute_item_int(&mut state, 0).unwrap(), 11);
    }

    #[test]
    fn test_multi_key_mixed_wraps_to_generic() {
        let ctx = element_context();
        let mut state = ctx.new_state().unwrap();
        state.set_item(ctx.item_slot().unwrap(), token_item());

        let mut batch = multi_annotation_access(&ctx, &["pos", "form", "verb"]).unwrap();
        assert_eq!(batch.element_type(), TypeInfo::Generic);
        assert_eq!(
            batch.compute_list(&mut state).unwrap(),
            ListValue::generics(vec![Value::Int(11), Value::text("run"), Value::Bool(true)])
        );
    }

    #[test]
    fn test_multi_key_empty_rejected() {
        let ctx = element_context();
        assert!(matches!(
            multi_annotation_access(&ctx, &[]),
            Err(EvalError::IncorrectUse(_))
        ));
    }

    #[test]
    fn test_duplicate_reads_own_state() {
        let ctx = element_context();
        let node = annotation_access(&ctx, "pos").unwrap();
        let mut dup = node.duplicate(&ctx).unwrap();

        let mut other_state = ctx.new_state().unwrap();
        other_state.set_item(
            ctx.item_slot().unwrap(),
            Item::new(Token {
                pos: 99,
                frequency: 0.0,
                content: "walk",
                is_verb: false,
            }),
        );
        assert_eq!(dup.compute_int(&mut other_state).unwrap(), 99);
    }
}
