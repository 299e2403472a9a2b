//! Criteria errors

use thiserror::Error;

/// Errors raised while parsing or validating criteria
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    /// The expression text could not be parsed
    #[error("Invalid criteria expression '{input}' at offset {offset}: {message}")]
    Parse {
        input: String,
        offset: usize,
        message: String,
    },

    /// The expression is well-formed text but structurally invalid
    #[error("Invalid criteria '{expression}': {message}")]
    Invalid { expression: String, message: String },
}

impl CriteriaError {
    /// Create a parse error
    pub fn parse(input: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create a structural validation error
    pub fn invalid(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// The offending expression text
    pub fn expression(&self) -> &str {
        match self {
            Self::Parse { input, .. } => input,
            Self::Invalid { expression, .. } => expression,
        }
    }
}
