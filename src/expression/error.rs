//! Error types for expression construction and evaluation.

use std::fmt;

use thiserror::Error;

/// Errors surfaced by expression construction or evaluation.
///
/// All of these report programmer or query-author mistakes and are raised
/// immediately; nothing is retried and there is no degraded-result mode.
/// [`EvalError::Internal`] is the exception: it signals an engine bug.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: String,
    },

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("incorrect use: {0}")]
    IncorrectUse(String),

    #[error("invalid {kind} literal: {text}")]
    InvalidLiteral { kind: &'static str, text: String },

    #[error("index {index} out of bounds for list of size {size}")]
    IndexOutOfBounds { index: i64, size: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        EvalError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
            context: context.into(),
        }
    }

    pub fn incorrect_use(message: impl Into<String>) -> Self {
        EvalError::IncorrectUse(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        EvalError::UnsupportedFeature(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EvalError::Internal(message.into())
    }
}

/// Result type for expression operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeInfo;

    #[test]
    fn test_error_display() {
        let err = EvalError::type_mismatch("compute_int", TypeInfo::Integer, TypeInfo::Text);
        assert_eq!(
            err.to_string(),
            "type mismatch in compute_int: expected integer, got text"
        );

        let err = EvalError::UnknownIdentifier("frequency".to_string());
        assert_eq!(err.to_string(), "unknown identifier: frequency");

        let err = EvalError::IndexOutOfBounds { index: -7, size: 3 };
        assert_eq!(err.to_string(), "index -7 out of bounds for list of size 3");

        let err = EvalError::InvalidLiteral {
            kind: "regex",
            text: "[unclosed".to_string(),
        };
        assert_eq!(err.to_string(), "invalid regex literal: [unclosed");

        assert_eq!(EvalError::DivisionByZero.to_string(), "division by zero");
    }
}
