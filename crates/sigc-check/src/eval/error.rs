//! Evaluation errors for synthesized contract checks.
//!
//! A failed check is not an error: it is reported as a
//! [`ContractViolation`](crate::contracts::ContractViolation). These
//! variants cover checks that could not be evaluated at all.

use serde::{Deserialize, Serialize};

use sigc_core::ConstraintId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EvalError {
    #[error("unbound name `{name}` in check {constraint}")]
    UnboundSymbol {
        constraint: ConstraintId,
        name: String,
    },

    #[error("type mismatch in check {constraint}: expected {expected}, got {got}")]
    TypeMismatch {
        constraint: ConstraintId,
        expected: String,
        got: String,
    },

    #[error("record has no field `{field}` in check {constraint}")]
    MissingField {
        constraint: ConstraintId,
        field: String,
    },

    #[error("integer overflow in check {constraint}")]
    Overflow { constraint: ConstraintId },

    #[error("divide by zero in check {constraint}")]
    DivideByZero { constraint: ConstraintId },

    /// A synthesized fallback arm was reached. This is a defect in the tool
    /// (the model and the synthesized match disagree), never a user error.
    #[error("UnreachableCaseError in check {constraint}: {message}")]
    UnreachableCase {
        constraint: ConstraintId,
        message: String,
    },
}

impl EvalError {
    /// True for errors that indicate a defect in synthesis rather than a
    /// value the check cannot handle.
    pub fn is_defect(&self) -> bool {
        matches!(self, EvalError::UnreachableCase { .. })
    }
}
