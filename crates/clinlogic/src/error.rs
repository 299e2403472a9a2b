//! Configuration and rule file errors

use thiserror::Error;

/// Errors raised while loading configuration or rule files
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read '{path}': {message}")]
    Io { path: String, message: String },

    /// The file is not valid JSON for the expected shape
    #[error("Invalid '{path}': {message}")]
    Parse { path: String, message: String },

    /// A rule definition could not be compiled
    #[error("Invalid rule '{token}': {message}")]
    Rule { token: String, message: String },
}

impl ConfigError {
    pub fn io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn rule(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rule {
            token: token.into(),
            message: message.into(),
        }
    }
}

/// Read and deserialize a JSON file
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(&display, e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::parse(display, e.to_string()))
}
