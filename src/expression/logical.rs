//! Logical conjunction/disjunction and the ternary conditional.

use std::any::Any;

use log::debug;

use crate::context::{EvalState, EvaluationContext};
use crate::expression::cast::{is_castable, Cast};
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::TypeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }

    /// The operand value that decides the result early.
    fn deciding(&self) -> bool {
        matches!(self, LogicalOp::Or)
    }

    /// The value of the empty conjunction/disjunction.
    fn neutral(&self) -> bool {
        matches!(self, LogicalOp::And)
    }
}

/// N-ary logical conjunction or disjunction.
///
/// With `early_exit` the first deciding operand short-circuits; without it
/// every operand is evaluated on every call, preserving operand side
/// effects.
pub struct NaryLogical {
    op: LogicalOp,
    operands: Vec<ExprBox>,
    early_exit: bool,
}

impl NaryLogical {
    pub fn new(op: LogicalOp, operands: Vec<ExprBox>, early_exit: bool) -> EvalResult<NaryLogical> {
        if operands.is_empty() {
            return Err(EvalError::incorrect_use(format!(
                "operator {} requires at least one operand",
                op.as_str()
            )));
        }
        for operand in &operands {
            let ty = operand.result_type();
            if !ty.is_boolean() {
                return Err(EvalError::type_mismatch(
                    format!("operator {}", op.as_str()),
                    TypeInfo::Boolean,
                    ty,
                ));
            }
        }
        Ok(NaryLogical {
            op,
            operands,
            early_exit,
        })
    }

    pub fn conjunction(operands: Vec<ExprBox>, early_exit: bool) -> EvalResult<NaryLogical> {
        NaryLogical::new(LogicalOp::And, operands, early_exit)
    }

    pub fn disjunction(operands: Vec<ExprBox>, early_exit: bool) -> EvalResult<NaryLogical> {
        NaryLogical::new(LogicalOp::Or, operands, early_exit)
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }
}

impl Expression for NaryLogical {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Boolean
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_bool(state).map(Value::Bool)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        let deciding = self.op.deciding();
        let mut result = self.op.neutral();
        for operand in &mut self.operands {
            if operand.compute_bool(state)? == deciding {
                result = deciding;
                if self.early_exit {
                    return Ok(result);
                }
            }
        }
        Ok(result)
    }

    fn is_constant(&self) -> bool {
        self.operands.iter().all(|op| op.is_constant())
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        let deciding = self.op.deciding();
        let mut kept: Vec<ExprBox> = Vec::with_capacity(self.operands.len());
        for mut operand in self.operands.drain(..) {
            optimize_in_place(&mut operand, ctx)?;
            if operand.is_constant() {
                if evaluate_constant(operand.as_mut())?.as_bool()? == deciding {
                    // A short-circuiting constant decides the whole node.
                    debug!(
                        "operator {} collapsed by constant operand",
                        self.op.as_str()
                    );
                    return Ok(Box::new(Literal::boolean(deciding)));
                }
                // Neutral constants are dropped.
                continue;
            }
            kept.push(operand);
        }
        match kept.len() {
            0 => Ok(Box::new(Literal::boolean(self.op.neutral()))),
            1 => Ok(kept.pop().expect("length checked")),
            _ => {
                self.operands = kept;
                Ok(self)
            }
        }
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        let operands = self
            .operands
            .iter()
            .map(|op| op.duplicate(ctx))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(Box::new(NaryLogical {
            op: self.op,
            operands,
            early_exit: self.early_exit,
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Ternary conditional with static result-type resolution.
///
/// The result type is the exact branch type when both agree; otherwise the
/// highest shared auto-castable category (text over boolean over
/// floating-point over integer) with both branches cast explicitly;
/// otherwise generic. Branch types that cannot meet (differing list types)
/// are rejected at construction.
pub struct Conditional {
    condition: ExprBox,
    then_branch: ExprBox,
    else_branch: ExprBox,
    ty: TypeInfo,
}

impl std::fmt::Debug for Conditional {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conditional")
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl Conditional {
    pub fn new(
        condition: ExprBox,
        then_branch: ExprBox,
        else_branch: ExprBox,
    ) -> EvalResult<Conditional> {
        let cond_ty = condition.result_type();
        if !cond_ty.is_boolean() {
            return Err(EvalError::type_mismatch(
                "ternary condition",
                TypeInfo::Boolean,
                cond_ty,
            ));
        }
        let then_ty = then_branch.result_type();
        let else_ty = else_branch.result_type();
        if then_ty == else_ty {
            return Ok(Conditional {
                condition,
                then_branch,
                else_branch,
                ty: then_ty,
            });
        }
        let shared_category = [
            TypeInfo::Text,
            TypeInfo::Boolean,
            TypeInfo::FloatingPoint,
            TypeInfo::Integer,
        ]
        .into_iter()
        .find(|category| {
            (then_ty == *category || else_ty == *category)
                && is_castable(&then_ty, category)
                && is_castable(&else_ty, category)
        });
        if let Some(category) = shared_category {
            return Ok(Conditional {
                condition,
                then_branch: Cast::wrap_if_needed(category.clone(), then_branch)?,
                else_branch: Cast::wrap_if_needed(category.clone(), else_branch)?,
                ty: category,
            });
        }
        if then_ty.is_list() || else_ty.is_list() {
            return Err(EvalError::type_mismatch(
                "ternary branches",
                then_ty,
                else_ty,
            ));
        }
        Ok(Conditional {
            condition,
            then_branch,
            else_branch,
            ty: TypeInfo::Generic,
        })
    }
}

impl Expression for Conditional {
    fn result_type(&self) -> TypeInfo {
        self.ty.clone()
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        if self.condition.compute_bool(state)? {
            self.then_branch.compute(state)
        } else {
            self.else_branch.compute(state)
        }
    }

    fn is_constant(&self) -> bool {
        self.condition.is_constant()
            && self.then_branch.is_constant()
            && self.else_branch.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.condition, ctx)?;
        optimize_in_place(&mut self.then_branch, ctx)?;
        optimize_in_place(&mut self.else_branch, ctx)?;
        if self.condition.is_constant() {
            // The untaken branch disappears entirely.
            let taken = evaluate_constant(self.condition.as_mut())?.as_bool()?;
            return Ok(if taken {
                self.then_branch
            } else {
                self.else_branch
            });
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(Conditional {
            condition: self.condition.duplicate(ctx)?,
            then_branch: self.then_branch.duplicate(ctx)?,
            else_branch: self.else_branch.duplicate(ctx)?,
            ty: self.ty.clone(),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
