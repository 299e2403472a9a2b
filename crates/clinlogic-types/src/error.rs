//! Result coercion errors

use crate::Datatype;
use thiserror::Error;

/// Raised when a result cannot be read as the requested type
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoercionError {
    /// The result has no nodes to coerce
    #[error("Cannot coerce an empty result to {to}")]
    Empty { to: &'static str },

    /// The first node holds a value of an incompatible type
    #[error("Cannot coerce {from} value '{value}' to {to}")]
    Mismatch {
        from: Datatype,
        to: &'static str,
        value: String,
    },
}

impl CoercionError {
    /// Create an empty-result error
    pub fn empty(to: &'static str) -> Self {
        Self::Empty { to }
    }

    /// Create a type mismatch error
    pub fn mismatch(from: Datatype, to: &'static str, value: impl Into<String>) -> Self {
        Self::Mismatch {
            from,
            to,
            value: value.into(),
        }
    }
}
