//! Engine configuration

use crate::error::{ConfigError, read_json};
use clinlogic_eval::DEFAULT_TTL_SECONDS;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for a `LogicService`.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```json
/// { "rule_ttl_seconds": 60, "ttl_overrides": { "obs": 300 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicConfig {
    /// TTL for cache entries stored without an explicit one
    pub default_ttl_seconds: u64,
    /// TTL for cached rule verdicts; falls back to `default_ttl_seconds`
    pub rule_ttl_seconds: Option<u64>,
    /// Whether evaluated maps carry an empty result for members without data
    pub fill_missing: bool,
    /// Per data source TTLs replacing the source's declared default
    pub ttl_overrides: IndexMap<String, u64>,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            rule_ttl_seconds: None,
            fill_missing: true,
            ttl_overrides: IndexMap::new(),
        }
    }
}

impl LogicConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::parse("<inline>", e.to_string()))
    }

    /// TTL for cached rule verdicts
    pub fn rule_ttl(&self) -> u64 {
        self.rule_ttl_seconds.unwrap_or(self.default_ttl_seconds)
    }

    /// TTL for reads from `source`, given the TTL it declares
    pub fn source_ttl(&self, source: &str, declared: u64) -> u64 {
        self.ttl_overrides.get(source).copied().unwrap_or(declared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LogicConfig::default();
        assert_eq!(config.default_ttl_seconds, 1800);
        assert_eq!(config.rule_ttl(), 1800);
        assert!(config.fill_missing);
        assert_eq!(config.source_ttl("obs", 900), 900);
    }

    #[test]
    fn test_partial_json() {
        let config =
            LogicConfig::from_json(r#"{ "rule_ttl_seconds": 60, "ttl_overrides": { "obs": 5 } }"#)
                .unwrap();
        assert_eq!(config.rule_ttl(), 60);
        assert_eq!(config.source_ttl("obs", 900), 5);
        assert_eq!(config.default_ttl_seconds, 1800);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "fill_missing": false }"#).unwrap();
        let config = LogicConfig::from_file(file.path()).unwrap();
        assert!(!config.fill_missing);

        assert!(matches!(
            LogicConfig::from_json("{ \"fill_missing\": 3 }"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
