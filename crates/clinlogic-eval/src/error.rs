//! Evaluation errors for the logic engine

use clinlogic_criteria::CriteriaError;
use clinlogic_types::CoercionError;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that can occur during evaluation.
///
/// All variants except `Coercion` are structural: they abort the whole
/// evaluation instead of being absorbed per patient.
#[derive(Debug, Error, Clone)]
pub enum EvalError {
    /// No data source or rule declares the token
    #[error("Unknown key: {key}")]
    UnknownKey { key: String },

    /// Conflicting data source registration
    #[error("Cannot register data source '{name}': {message}")]
    DuplicateDataSource { name: String, message: String },

    /// Malformed or type-mismatched criteria
    #[error("Cannot evaluate '{expression}': {message}")]
    CriteriaEvaluation { expression: String, message: String },

    /// Result value not convertible to the requested type
    #[error(transparent)]
    Coercion(#[from] CoercionError),

    /// A provider's backing store failed
    #[error("Data source '{source_name}' unavailable: {message}")]
    ProviderUnavailable {
        source_name: String,
        message: String,
    },

    /// A rule was added under a token that is already taken
    #[error("Token already registered: {token}")]
    DuplicateToken { token: String },

    /// A rule could not produce a verdict
    #[error("Rule '{token}' failed: {message}")]
    RuleFailed { token: String, message: String },
}

impl EvalError {
    /// Create an unknown key error
    pub fn unknown_key(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    /// Create a duplicate data source error
    pub fn duplicate_data_source(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DuplicateDataSource {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a criteria evaluation error naming the offending sub-expression
    pub fn criteria(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CriteriaEvaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a provider unavailable error
    pub fn provider_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate token error
    pub fn duplicate_token(token: impl Into<String>) -> Self {
        Self::DuplicateToken {
            token: token.into(),
        }
    }

    /// Create a rule failure error
    pub fn rule_failed(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleFailed {
            token: token.into(),
            message: message.into(),
        }
    }

    /// Whether the error reflects a configuration or programming defect
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Coercion(_))
    }
}

impl From<CriteriaError> for EvalError {
    fn from(error: CriteriaError) -> Self {
        let message = match &error {
            CriteriaError::Parse {
                offset, message, ..
            } => format!("{message} (at offset {offset})"),
            CriteriaError::Invalid { message, .. } => message.clone(),
        };
        Self::CriteriaEvaluation {
            expression: error.expression().to_string(),
            message,
        }
    }
}
