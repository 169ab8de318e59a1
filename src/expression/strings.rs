//! Text comparison modes, string concatenation and regex matching.

use std::any::Any;
use std::cmp::Ordering;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::context::{EvalState, EvaluationContext};
use crate::expression::core::{evaluate_constant, optimize_in_place, ExprBox, Expression, Literal};
use crate::expression::error::{EvalError, EvalResult};
use crate::expression::value::Value;
use crate::types::TypeInfo;

/// Per-session text comparison mode.
///
/// `unicode` selects comparison by code points; without it, text compares
/// by raw UTF-16 units, which sorts supplementary characters differently.
/// `case_insensitive` selects the caseless comparator on either axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StringMode {
    pub unicode: bool,
    pub case_insensitive: bool,
}

/// Caseless equality of two code points.
///
/// Tests the raw, lowercased and uppercased forms, which keeps characters
/// whose case mappings differ in length comparable.
pub(crate) fn char_equals_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase()) || a.to_uppercase().eq(b.to_uppercase())
}

fn unit_equals_ignore_case(a: u16, b: u16) -> bool {
    if a == b {
        return true;
    }
    match (char::from_u32(a as u32), char::from_u32(b as u32)) {
        (Some(a), Some(b)) => char_equals_ignore_case(a, b),
        _ => false,
    }
}

/// Lowercased form of one UTF-16 unit, when the mapping stays a single
/// BMP unit; surrogates and expanding mappings are left untouched.
fn lower_unit(unit: u16) -> u16 {
    match char::from_u32(unit as u32) {
        Some(c) => {
            let mut lowered = c.to_lowercase();
            match (lowered.next(), lowered.next()) {
                (Some(l), None) if (l as u32) <= 0xFFFF => l as u32 as u16,
                _ => unit,
            }
        }
        None => unit,
    }
}

/// Equality of two text values under the given mode.
pub fn text_equal(a: &str, b: &str, mode: StringMode) -> bool {
    match (mode.unicode, mode.case_insensitive) {
        (_, false) => a == b,
        (true, true) => {
            let mut ia = a.chars();
            let mut ib = b.chars();
            loop {
                match (ia.next(), ib.next()) {
                    (None, None) => return true,
                    (Some(x), Some(y)) if char_equals_ignore_case(x, y) => {}
                    _ => return false,
                }
            }
        }
        (false, true) => {
            let mut ia = a.encode_utf16();
            let mut ib = b.encode_utf16();
            loop {
                match (ia.next(), ib.next()) {
                    (None, None) => return true,
                    (Some(x), Some(y)) if unit_equals_ignore_case(x, y) => {}
                    _ => return false,
                }
            }
        }
    }
}

/// Total order over two text values under the given mode.
pub fn text_compare(a: &str, b: &str, mode: StringMode) -> Ordering {
    match (mode.unicode, mode.case_insensitive) {
        (true, false) => a.chars().cmp(b.chars()),
        (true, true) => a
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(b.chars().flat_map(char::to_lowercase)),
        (false, false) => a.encode_utf16().cmp(b.encode_utf16()),
        (false, true) => a
            .encode_utf16()
            .map(lower_unit)
            .cmp(b.encode_utf16().map(lower_unit)),
    }
}

/// Concatenation of two or more text operands.
///
/// Nested concatenations are flattened away at construction time.
pub struct Concat {
    operands: Vec<ExprBox>,
}

impl std::fmt::Debug for Concat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Concat")
            .field("operands", &self.operands.len())
            .finish_non_exhaustive()
    }
}

impl Concat {
    pub fn new(operands: Vec<ExprBox>) -> EvalResult<Concat> {
        if operands.len() < 2 {
            return Err(EvalError::incorrect_use(
                "concatenation requires at least two operands",
            ));
        }
        let mut flat: Vec<ExprBox> = Vec::with_capacity(operands.len());
        for operand in operands {
            if operand.as_any().is::<Concat>() {
                let inner = operand
                    .into_any()
                    .downcast::<Concat>()
                    .map_err(|_| EvalError::internal("concat downcast failed"))?;
                flat.extend(inner.operands);
            } else {
                let ty = operand.result_type();
                if !ty.is_text() {
                    return Err(EvalError::type_mismatch(
                        "string concatenation",
                        TypeInfo::Text,
                        ty,
                    ));
                }
                flat.push(operand);
            }
        }
        Ok(Concat { operands: flat })
    }

    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Merge `pending` into `out`: runs of two or more constants become one
    /// literal chunk, a single constant is kept as itself.
    fn flush_constants(
        pending: &mut Vec<ExprBox>,
        pending_text: &mut String,
        out: &mut Vec<ExprBox>,
    ) {
        match pending.len() {
            0 => {}
            1 => out.push(pending.pop().expect("length checked")),
            _ => {
                out.push(Box::new(Literal::text(std::mem::take(pending_text).as_str())));
                pending.clear();
            }
        }
        pending_text.clear();
    }
}

impl Expression for Concat {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Text
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        let mut buffer = String::new();
        for operand in &mut self.operands {
            buffer.push_str(&operand.compute(state)?.as_text()?);
        }
        Ok(Value::text(buffer.as_str()))
    }

    fn is_constant(&self) -> bool {
        self.operands.iter().all(|op| op.is_constant())
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        for operand in &mut self.operands {
            optimize_in_place(operand, ctx)?;
        }
        if self.is_constant() {
            return Ok(Box::new(Literal::new(evaluate_constant(self.as_mut())?)));
        }
        let mut out: Vec<ExprBox> = Vec::with_capacity(self.operands.len());
        let mut pending: Vec<ExprBox> = Vec::new();
        let mut pending_text = String::new();
        for mut operand in self.operands.drain(..) {
            if operand.is_constant() {
                pending_text.push_str(&evaluate_constant(operand.as_mut())?.as_text()?);
                pending.push(operand);
            } else {
                Concat::flush_constants(&mut pending, &mut pending_text, &mut out);
                out.push(operand);
            }
        }
        Concat::flush_constants(&mut pending, &mut pending_text, &mut out);
        if out.len() == 1 {
            return Ok(out.pop().expect("length checked"));
        }
        Ok(Box::new(Concat { operands: out }))
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        let operands = self
            .operands
            .iter()
            .map(|op| op.duplicate(ctx))
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(Box::new(Concat { operands }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Regex match of a text operand against a constant pattern.
///
/// The pattern is compiled once at construction; duplicates share the
/// compiled regex and only clone the target subtree.
pub struct RegexMatch {
    pattern: Arc<Regex>,
    raw: Arc<str>,
    target: ExprBox,
}

impl std::fmt::Debug for RegexMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegexMatch")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl RegexMatch {
    pub fn new(target: ExprBox, pattern: ExprBox, mode: StringMode) -> EvalResult<RegexMatch> {
        let target_ty = target.result_type();
        if !target_ty.is_text() {
            return Err(EvalError::type_mismatch(
                "regex target",
                TypeInfo::Text,
                target_ty,
            ));
        }
        let pattern_ty = pattern.result_type();
        if !pattern_ty.is_text() {
            return Err(EvalError::type_mismatch(
                "regex pattern",
                TypeInfo::Text,
                pattern_ty,
            ));
        }
        if !pattern.is_constant() {
            return Err(EvalError::incorrect_use(
                "regex pattern must be a constant expression",
            ));
        }
        let mut pattern = pattern;
        let raw = evaluate_constant(pattern.as_mut())?.as_text()?;
        let compiled = RegexBuilder::new(&raw)
            .case_insensitive(mode.case_insensitive)
            .build()
            .map_err(|_| EvalError::InvalidLiteral {
                kind: "regex",
                text: raw.to_string(),
            })?;
        Ok(RegexMatch {
            pattern: Arc::new(compiled),
            raw,
            target,
        })
    }

    pub fn pattern_text(&self) -> &str {
        &self.raw
    }
}

impl Expression for RegexMatch {
    fn result_type(&self) -> TypeInfo {
        TypeInfo::Boolean
    }

    fn compute(&mut self, state: &mut EvalState) -> EvalResult<Value> {
        self.compute_bool(state).map(Value::Bool)
    }

    fn compute_bool(&mut self, state: &mut EvalState) -> EvalResult<bool> {
        let text = self.target.compute(state)?.as_text()?;
        Ok(self.pattern.is_match(&text))
    }

    fn is_constant(&self) -> bool {
        self.target.is_constant()
    }

    fn optimize(mut self: Box<Self>, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        optimize_in_place(&mut self.target, ctx)?;
        if self.target.is_constant() {
            let result = evaluate_constant(self.as_mut())?;
            return Ok(Box::new(Literal::new(result)));
        }
        Ok(self)
    }

    fn duplicate(&self, ctx: &EvaluationContext) -> EvalResult<ExprBox> {
        Ok(Box::new(RegexMatch {
            pattern: Arc::clone(&self.pattern),
            raw: Arc::clone(&self.raw),
            target: self.target.duplicate(ctx)?,
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

    const UNICODE: StringMode = StringMode {
        unicode: true,
        case_insensitive: false,
    };
    const UNICODE_CI: StringMode = StringMode {
        unicode: true,
        case_insensitive: true,
    };
    const CHARS: StringMode = StringMode {
        unicode: false,
        case_insensitive: false,
    };
    const CHARS_CI: StringMode = StringMode {
        unicode: false,
        case_insensitive: true,
    };

    #[test]
    fn test_case_sensitive_equality() {
        assert!(text_equal("abc", "abc", UNICODE));
        assert!(!text_equal("abc", "Abc", UNICODE));
        assert!(text_equal("abc", "abc", CHARS));
    }

    #[test]
    fn test_case_insensitive_equality_ascii() {
        for mode in [UNICODE_CI, CHARS_CI] {
            assert!(text_equal("Hello", "hELLO", mode));
            assert!(!text_equal("Hello", "Hella", mode));
            // Symmetry and reflexivity.
            assert!(text_equal("hELLO", "Hello", mode));
            assert!(text_equal("Hello", "Hello", mode));
        }
    }

    #[test]
    fn test_case_insensitive_equality_supplementary() {
        // Deseret capital/small letter long I (U+10400 / U+10428) live
        // outside the BMP and still fold onto each other in unicode mode.
        assert!(text_equal("\u{10400}", "\u{10428}", UNICODE_CI));
        assert!(text_equal("\u{10428}", "\u{10400}", UNICODE_CI));
        assert!(text_equal("a\u{10400}b", "A\u{10428}B", UNICODE_CI));
    }

    #[test]
    fn test_unit_mode_orders_by_utf16() {
        // U+FFFD is below U+10000 by code point but above its surrogate
        // representation (0xD800 0xDC00) by UTF-16 unit.
        assert_eq!(text_compare("\u{FFFD}", "\u{10000}", UNICODE), Ordering::Less);
        assert_eq!(
            text_compare("\u{FFFD}", "\u{10000}", CHARS),
            Ordering::Greater
        );
    }

    #[test]
    fn test_case_insensitive_ordering() {
        assert_eq!(text_compare("abc", "ABD", UNICODE_CI), Ordering::Less);
        assert_eq!(text_compare("ABC", "abc", UNICODE_CI), Ordering::Equal);
        assert_eq!(text_compare("ABC", "abc", CHARS_CI), Ordering::Equal);
        assert_eq!(text_compare("b", "A", CHARS_CI), Ordering::Greater);
    }

    #[test]
    fn test_concat_flattens_nested() {
        let inner = Concat::new(vec![
            Box::new(Literal::text("a")),
            Box::new(Literal::text("b")),
        ])
        .unwrap();
        let outer = Concat::new(vec![Box::new(inner), Box::new(Literal::text("c"))]).unwrap();
        assert_eq!(outer.operand_count(), 3);

        let mut outer = outer;
        assert_eq!(
            outer.compute(&mut EvalState::empty()).unwrap(),
            Value::text("abc")
        );
    }

    #[test]
    fn test_concat_rejects_non_text() {
        let err = Concat::new(vec![
            Box::new(Literal::text("a")),
            Box::new(Literal::int(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_concat_all_constant_folds_to_literal() {
        let ctx = test_context();
        let concat = Concat::new(vec![
            Box::new(Literal::text("ab")),
            Box::new(Literal::text("cd")),
        ])
        .unwrap();
        let mut folded = Box::new(concat).optimize(&ctx).unwrap();
        assert!(folded.is_constant());
        assert!(folded.as_any().is::<Literal>());
        assert_eq!(
            folded.compute(&mut EvalState::empty()).unwrap(),
            Value::text("abcd")
        );
    }

    #[test]
    fn test_regex_pattern_must_be_constant_text() {
        let ctx = test_context();
        let var = ctx.variable("p");
        let err = RegexMatch::new(
            Box::new(Literal::text("foo")),
            Box::new(var),
            StringMode::default(),
        )
        .unwrap_err();
        // Variables are generic-typed, so the type check fires first.
        assert!(matches!(err, EvalError::TypeMismatch { .. }));

        let err = RegexMatch::new(
            Box::new(Literal::text("foo")),
            Box::new(Literal::int(3)),
            StringMode::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { .. }));
    }

    #[test]
    fn test_regex_invalid_pattern() {
        let err = RegexMatch::new(
            Box::new(Literal::text("foo")),
            Box::new(Literal::text("[unclosed")),
            StringMode::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidLiteral { kind: "regex", .. }));
    }

    #[test]
    fn test_regex_match() {
        let mut state = EvalState::empty();
        let mut node = RegexMatch::new(
            Box::new(Literal::text("foobar")),
            Box::new(Literal::text("^foo.*$")),
            StringMode::default(),
        )
        .unwrap();
        assert!(node.compute_bool(&mut state).unwrap());

        let mut node = RegexMatch::new(
            Box::new(Literal::text("FOO")),
            Box::new(Literal::text("foo")),
            StringMode {
                unicode: false,
                case_insensitive: true,
            },
        )
        .unwrap();
        assert!(node.compute_bool(&mut state).unwrap());
    }

    #[test]
    fn test_regex_constant_target_folds() {
        let ctx = test_context();
        let node = RegexMatch::new(
            Box::new(Literal::text("abc")),
            Box::new(Literal::text("b")),
            StringMode::default(),
        )
        .unwrap();
        let mut folded = Box::new(node).optimize(&ctx).unwrap();
        assert!(folded.as_any().is::<Literal>());
        assert_eq!(
            folded.compute(&mut EvalState::empty()).unwrap(),
            Value::Bool(true)
        );
    }
}
