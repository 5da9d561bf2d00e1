//! Signature-level error types.
//!
//! Uses `thiserror` for structured, matchable variants. Every variant is fatal
//! for the signature that produced it and for nothing else: batch callers
//! collect these per signature and keep going.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a signature or extracting its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum SignatureError {
    /// Malformed signature text. No partial signature is returned.
    #[error("parse error at offset {position}: expected {expected}, found {found}")]
    Parse {
        /// Byte offset into the source text.
        position: usize,
        /// What the grammar allowed at this point.
        expected: String,
        /// What was actually there.
        found: String,
    },

    /// A type expression outside the supported constraint vocabulary.
    ///
    /// `raw` is the verbatim source slice so the caller sees exactly what was
    /// refused.
    #[error("unsupported type expression: `{raw}`")]
    UnsupportedType { raw: String },

    /// A bound or length references a symbol that no parameter, record field
    /// or implicit length binding can supply.
    #[error("unresolved bound `{symbol}` in {context}: {expression}")]
    UnresolvedBound {
        /// The symbol that could not be resolved.
        symbol: String,
        /// Where the expression appears, e.g. `parameter i`.
        context: String,
        /// The full expression as written.
        expression: String,
    },

    /// Two parameters share a name.
    #[error("duplicate parameter '{name}'")]
    DuplicateParameter { name: String },

    /// Two records share a name, or a record shadows a built-in type name.
    #[error("duplicate record '{name}'")]
    DuplicateRecord { name: String },
}

impl SignatureError {
    /// Short stable label for reports (`ParseError`, `UnsupportedTypeError`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            SignatureError::Parse { .. } => "ParseError",
            SignatureError::UnsupportedType { .. } => "UnsupportedTypeError",
            SignatureError::UnresolvedBound { .. } => "UnresolvedBoundError",
            SignatureError::DuplicateParameter { .. } | SignatureError::DuplicateRecord { .. } => {
                "ParseError"
            }
        }
    }
}
