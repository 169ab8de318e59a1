//! Set containment predicates.
//!
//! The right-hand operand list is partitioned at construction into a fixed
//! hash set of pre-evaluated constants, still-dynamic scalar expressions
//! and still-dynamic list expressions. Evaluation probes the fixed set
//! first, then the dynamic scalars, then the dynamic lists, with
//! short-circuit OR semantics. `optimize` re-partitions after folding, so
//! operands that become constant migrate into the fixed set.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::TypeInfo;

/// Evaluation mode of a set predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Scalar target, true when the target is in the set.
    Single,
    /// List target, true when any element is in the set.
    Expand,
    /// List target, true when all elements are in the set.
    ExpandExhaustive,
    /// List target, true when no element is in the set.
    ExpandExhaustiveNegated,
}

impl SetMode {
    pub fn is_expanding(&self) -> bool {
        !matches!(self, SetMode::Single)
    }

    fn is_exhaustive(&self) -> bool {
        matches!(
            self,
            SetMode::ExpandExhaustive | SetMode::ExpandExhaustiveNegated
        )
    }
}

/// Element kind the predicate is specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetKind {
    Integer,
    FloatingPoint,
    Text,
}

impl SetKind {
    fn of(ty: &TypeInfo, context: &str) -> EvalResult<SetKind> {
        match ty {
            TypeInfo::Integer => Ok(SetKind::Integer),
            TypeInfo::FloatingPoint => Ok(SetKind::FloatingPoint),
            TypeInfo::Text => Ok(SetKind::Text),
            other => Err(EvalError::type_mismatch(
                context,
                "integer, float or text",
                other.clone(),
            )),
        }
    }

    fn accepts_operand(&self, ty: &TypeInfo) -> bool {
        match self {
            SetKind::Integer => ty.is_integer(),
            // Integer operands promote into a floating set.
            SetKind::FloatingPoint => ty.is_numeric(),
            SetKind::Text => ty.is_text(),
        }
    }
}

/// Canonical bit pattern used to key floating-point set members; negative
/// zero joins positive zero, NaN joins by representation.
fn float_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Pre-evaluated constant members with kind-appropriate hashing.
#[derive(Debug, Clone)]
enum FixedSet {
    Integer(HashSet<i64>),
    FloatingPoint(HashSet<u64>),
    Text(HashSet<Arc<str>>),
}

impl FixedSet {
    fn empty(kind: SetKind) -> FixedSet {
        match kind {
            SetKind::Integer => FixedSet::Integer(HashSet::new()),
            SetKind::FloatingPoint => FixedSet::FloatingPoint(HashSet::new()),
            SetKind::Text => FixedSet::Text(HashSet::new()),
        }
    }

    fn insert(&mut self, value: &Value) -> EvalResult<()> {
        match self {
            FixedSet::Integer(set) => {
                set.insert(value.as_int()?);
            }
            FixedSet::FloatingPoint(set) => {
                set.insert(float_key(value.as_float()?));
            }
            FixedSet::Text(set) => {
                set.insert(value.as_text()?);
            }
        }
        Ok(())
    }

    fn contains(&self, value: &Value) -> EvalResult<bool> {
        match self {
            FixedSet::Integer(set) => Ok(set.contains(&value.as_int()?)),
            FixedSet::FloatingPoint(set) => Ok(set.contains(&float_key(value.as_float()?))),
            FixedSet::Text(set) => Ok(set.contains(&value.as_text()?)),
        }
    }

    fn len(&self) -> usize {
        match self {
            FixedSet::Integer(set) => set.len(),
            FixedSet::FloatingPoint(set) => set.len(),
            FixedSet::Text(set) => set.len(),
        }
    }
}

fn values_equal(kind: SetKind, a: &Value, b: &Value) -> EvalResult<bool> {
    match kind {
        SetKind::Integer => Ok(a.as_int()? == b.as_int()?),
        SetKind::FloatingPoint => Ok(float_key(a.as_float()?) == float_key(b.as_float()?)),
        SetKind::Text => Ok(a.as_text()? == b.as_text()?),
    }
}

/// Containment test of a target value (or list of values) against a set of
/// operands.
pub struct SetPredicate {
    mode: SetMode,
    kind: SetKind,
    target: ExprBox,
    fixed: Arc<FixedSet>,
    dynamic_scalars: Vec<ExprBox>,
    dynamic_lists: Vec<ExprBox>,
}

impl std::fmt::Debug for SetPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetPredicate")
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SetPredicate {
    pub fn new(mode: SetMode, target: ExprBox, operands: Vec<ExprBox>) -> EvalResult<SetPredicate> {
        let target_ty = target.result_type();
        let kind = if mode.is_expanding() {
            let element = target_ty.element_type().ok_or_else(|| {
                EvalError::type_mismatch("set predicate target", "list", target_ty.clone())
            })?;
            if element.is_generic() {
                // Generic lists carry mixed runtime kinds; pick by first
                // use is not possible statically.
                return Err(EvalError::type_mismatch(
                    "set predicate target",
                    "typed list",
                    target_ty.clone(),
                ));
            }
            SetKind::of(element, "set predicate target")?
        } else {
            SetKind::of(&target_ty, "set predicate target")?
        };

        if mode.is_exhaustive() && operands.len() == 1 && !operands[0].is_constant() {
            return Err(EvalError::incorrect_use(
                "exhaustive set predicate with a single operand requires a constant",
            ));
        }

        let mut fixed = FixedSet::empty(kind);
        let mut dynamic_scalars = Vec::new();
        let mut dynamic_lists = Vec::new();
        for mut operand in operands {
            let ty = operand.result_type();
            let element_ty = ty.element_type().cloned();
            match &element_ty {
                Some(element) => {
                    if !kind.accepts_operand(element) && !element.is_generic() {
                        return Err(EvalError::type_mismatch(
                            "set operand",
                            target_ty.clone(),
                            ty,
                        ));
                    }
                }
                None => {
                    if !kind.accepts_operand(&ty) && !ty.is_generic() {
                        return Err(EvalError::type_mismatch(
                            "set operand",
                            target_ty.clone(),
                            ty,
                        ));
                    }
                }
            }
            if operand.is_constant() {
                merge_constant(&mut fixed, evaluate_constant(operand.as_mut())?)?;
            } else if element_ty.is_some() {
                dynamic_lists.push(operand);
            } else {
                dynamic_scalars.push(operand);
            }
        }
        Ok(SetPredicate {
            mode,
            kind,
            target,
            fixed: Arc::new(fixed),
            dynamic_scalars,
            dynamic_lists,
        })
    }

    pub fn mode(&self) -> SetMode {
        self.mode
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn dynamic_operand_count(&self) -> usize {
        self.dynamic_scalars.len() + self.dynamic_lists.len()
    }

    fn contains(&mut self, state: &mut EvalState, value: &Value) -> EvalResult<bool> {
        if self.fixed.contains(value)? {
            return Ok(true);
        }
        for scalar in &mut self.dynamic_scalars {
            if values_equal(self.kind, value, &scalar.compute(state)?)? {
                return Ok(true);
            }
        }
        for list in &mut self.dynamic_lists {
            let computed = list.compute(state)?;
            let mut elements = Vec::new();
            computed.as_list()?.expand_into(&mut elements);
            for element in &elements {
                if values_equal(self.kind, value, element)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn target_elements(&mut self, state: &mut EvalState) -> EvalResult<Vec<Value>> {
        let computed = self.target.compute(state)?;
        let mut elements = Vec::new();
        computed.as_list()?.expand_into(&mut elements);
        Ok(elements)
    }
}

/// Drain newly-constant operands from `bucket` into the merged fixed set,
/// keeping the rest.
fn repartition(
    bucket: &mut Vec<ExprBox>,
    fixed: &Arc<FixedSet>,
    merged: &mut Option<FixedSet>,
    ctx: &EvaluationContext,
) -> EvalResult<()> {
    let mut kept = Vec::with_capacity(bucket.len());
    for mut operand in bucket.drain(..) {
        optimize_in_place(&mut operand, ctx)?;
        if operand.is_constant() {
            if merged.is_none() {
                *merged = Some(fixed.as_ref().clone());
            }
            let target = merged.as_mut().expect("initialized above");
            merge_constant(target, evaluate_constant(operand.as_mut())?)?;
        } else {
            kept.push(operand);
        }
    }
    *bucket = kept;
    Ok(())
}

fn merge_constant(fixed: &mut FixedSet, value: Value) -> EvalResult<()> {
    match value {
        Value::List(list) => {
            let mut elements = Vec::new();
            list.expand_into(&mut elements);
            for element in elements {
                fixed.insert(&element)?;
            }
            Ok(())
        }
        scalar => fixed.insert(&scalar),
    }
}

impl Expression for SetPredicate {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Boolean
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_bool(state).map(Value::Bool)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        match self.mode {
            SetMode::Single => {
                let value = self.target.compute(state)?;
                self.contains(state, &value)
            }
            SetMode::Expand => {
                let elements = self.target_elements(state)?;
                for element in &elements {
                    if self.contains(state, element)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            SetMode::ExpandExhaustive => {
                let elements = self.target_elements(state)?;
                for element in &elements {
                    if !self.contains(state, element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            SetMode::ExpandExhaustiveNegated => {
                let elements = self.target_elements(state)?;
                for element in &elements {
                    if self.contains(state, element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn is_constant(&self) -> bool {
        self.target.is_constant()
            && self.dynamic_scalars.iter().all(|op| op.is_constant())
            && self.dynamic_lists.iter().all(|op| op.is_constant())
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.target, ctx)?;

        // Fold any operand that has become constant into the fixed set.
        let mut merged: Option<FixedSet> = None;
        repartition(&mut self.dynamic_scalars, &self.fixed, &mut merged, ctx)?;
        repartition(&mut self.dynamic_lists, &self.fixed, &mut merged, ctx)?;
        if let Some(merged) = merged {
            self.fixed = Arc::new(merged);
        }

        if self.target.is_constant()
            && self.dynamic_scalars.is_empty()
            && self.dynamic_lists.is_empty()
        {
            let result = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(result)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(SetPredicate {
            mode: self.mode,
            kind: self.kind,
            target: self.target.duplicate(ctx)?,
            // The fixed set is immutable after construction and shared.
            fixed: Arc::clone(&self.fixed),
            dynamic_scalars: self
                .dynamic_scalars
                .iter()
                .map(|op| op.duplicate(ctx))
                .collect::<EvalResult<Vec<_>>>()?,
            dynamic_lists: self
                .dynamic_lists
                .iter()
                .map(|op| op.duplicate(ctx))
                .collect::<EvalResult<Vec<_>>>()?,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
