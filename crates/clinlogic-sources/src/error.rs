//! Backing store and data set errors

use clinlogic_eval::EvalError;
use thiserror::Error;

/// Result type for store and loader operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by backing stores and the data set loader
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    /// The backing store could not answer
    #[error("Store unavailable: {message}")]
    Store { message: String },

    /// A data set file could not be read
    #[error("Cannot read '{path}': {message}")]
    Io { path: String, message: String },

    /// A data set is malformed
    #[error("Invalid data set: {message}")]
    Format { message: String },
}

impl SourceError {
    /// Create a store failure
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an I/O failure
    pub fn io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a format failure
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Report the failure as a provider outage of `source_name`
    pub fn into_eval(self, source_name: &str) -> EvalError {
        EvalError::provider_unavailable(source_name, self.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        Self::format(error.to_string())
    }
}
