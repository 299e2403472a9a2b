//! Data source contract and registry
//!
//! Providers register once at startup and are read concurrently afterwards,
//! so the registry sits behind a read-write lock.

use crate::cache::ResultMap;
use crate::context::EvaluationContext;
use crate::error::{EvalError, EvalResult};
use clinlogic_criteria::LogicCriteria;
use clinlogic_types::{Cohort, Datatype};
use indexmap::IndexMap;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default provider cache TTL (30 minutes)
pub const DEFAULT_TTL_SECONDS: u64 = 1800;

/// A pluggable provider of raw clinical data.
///
/// `read` receives the token-level criteria, must not mutate its inputs, and
/// answers for the whole cohort in one batched call. Only cohort members with
/// non-empty results appear in the returned map.
pub trait LogicDataSource: Send + Sync {
    /// Keys this source can answer
    fn keys(&self) -> Vec<String>;

    /// Whether the source declares `key`
    fn has_key(&self, key: &str) -> bool {
        self.keys().iter().any(|k| k == key)
    }

    /// Seconds a read stays cached
    fn default_ttl(&self) -> u64 {
        DEFAULT_TTL_SECONDS
    }

    /// Datatype of the values served under `key`, when the source knows it
    fn default_datatype(&self, _key: &str) -> Option<Datatype> {
        None
    }

    /// Read results for every cohort member
    fn read(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap>;
}

/// A registered data source
#[derive(Clone)]
pub struct DataSourceRegistration {
    pub name: String,
    pub keys: Vec<String>,
    pub default_ttl: u64,
    pub instance: Arc<dyn LogicDataSource>,
}

impl fmt::Debug for DataSourceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceRegistration")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    sources: IndexMap<String, DataSourceRegistration>,
    // key -> owning source name
    key_index: HashMap<String, String>,
}

/// Registry routing keys to data sources
#[derive(Default)]
pub struct DataSourceRegistry {
    state: RwLock<RegistryState>,
}

impl fmt::Debug for DataSourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl DataSourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data source under `name`.
    ///
    /// Registering the same instance again is a no-op. A different instance
    /// under a taken name, or a key another source already serves, is an error.
    pub fn register(
        &self,
        name: impl Into<String>,
        instance: Arc<dyn LogicDataSource>,
    ) -> EvalResult<()> {
        let name = name.into();
        let mut state = self.state.write();

        if let Some(existing) = state.sources.get(&name) {
            if std::ptr::addr_eq(Arc::as_ptr(&existing.instance), Arc::as_ptr(&instance)) {
                debug!("Data source '{name}' already registered");
                return Ok(());
            }
            return Err(EvalError::duplicate_data_source(
                &name,
                "name already registered with a different instance",
            ));
        }

        let mut seen = HashSet::new();
        let mut keys = instance.keys();
        keys.retain(|key| seen.insert(key.clone()));
        for key in &keys {
            if let Some(owner) = state.key_index.get(key) {
                return Err(EvalError::duplicate_data_source(
                    &name,
                    format!("key '{key}' is already served by '{owner}'"),
                ));
            }
        }

        for key in &keys {
            state.key_index.insert(key.clone(), name.clone());
        }
        let registration = DataSourceRegistration {
            name: name.clone(),
            keys,
            default_ttl: instance.default_ttl(),
            instance,
        };
        info!(
            "Registered data source '{name}' with {} keys",
            registration.keys.len()
        );
        state.sources.insert(name, registration);
        Ok(())
    }

    /// Remove a data source and its keys
    pub fn unregister(&self, name: &str) -> Option<DataSourceRegistration> {
        let mut state = self.state.write();
        let registration = state.sources.shift_remove(name)?;
        for key in &registration.keys {
            state.key_index.remove(key);
        }
        info!("Unregistered data source '{name}'");
        Some(registration)
    }

    /// Get a data source by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn LogicDataSource>> {
        self.state
            .read()
            .sources
            .get(name)
            .map(|r| Arc::clone(&r.instance))
    }

    /// Get a registration by name
    pub fn registration(&self, name: &str) -> Option<DataSourceRegistration> {
        self.state.read().sources.get(name).cloned()
    }

    /// Find the source declaring `key`
    pub fn resolve(&self, key: &str) -> EvalResult<DataSourceRegistration> {
        let state = self.state.read();
        state
            .key_index
            .get(key)
            .and_then(|name| state.sources.get(name))
            .cloned()
            .ok_or_else(|| EvalError::unknown_key(key))
    }

    /// Find `key` within the named source
    pub fn resolve_in(&self, source: &str, key: &str) -> EvalResult<DataSourceRegistration> {
        let state = self.state.read();
        match state.sources.get(source) {
            Some(registration) if registration.keys.iter().any(|k| k == key) => {
                Ok(registration.clone())
            }
            _ => Err(EvalError::unknown_key(format!("@{source} {key}"))),
        }
    }

    /// Whether any source declares `key`
    pub fn has_key(&self, key: &str) -> bool {
        self.state.read().key_index.contains_key(key)
    }

    /// Registered source names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.state.read().sources.keys().cloned().collect()
    }

    /// Every registered key, grouped by source in registration order
    pub fn keys(&self) -> Vec<String> {
        self.state
            .read()
            .sources
            .values()
            .flat_map(|r| r.keys.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        keys: Vec<String>,
    }

    impl FixedSource {
        fn new(keys: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            })
        }
    }

    impl LogicDataSource for FixedSource {
        fn keys(&self) -> Vec<String> {
            self.keys.clone()
        }

        fn read(
            &self,
            _context: &EvaluationContext,
            _cohort: &Cohort,
            _criteria: &LogicCriteria,
        ) -> EvalResult<ResultMap> {
            Ok(ResultMap::new())
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = DataSourceRegistry::new();
        registry
            .register("person", FixedSource::new(&["GENDER", "AGE"]))
            .unwrap();
        assert_eq!(registry.resolve("AGE").unwrap().name, "person");
        assert_eq!(registry.resolve("AGE").unwrap().default_ttl, DEFAULT_TTL_SECONDS);
        assert!(matches!(
            registry.resolve("WEIGHT"),
            Err(EvalError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_same_instance_is_noop() {
        let registry = DataSourceRegistry::new();
        let source = FixedSource::new(&["GENDER"]);
        registry.register("person", source.clone()).unwrap();
        registry.register("person", source).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_instance_conflicts() {
        let registry = DataSourceRegistry::new();
        registry
            .register("person", FixedSource::new(&["GENDER"]))
            .unwrap();
        let err = registry
            .register("person", FixedSource::new(&["GENDER"]))
            .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateDataSource { .. }));
    }

    #[test]
    fn test_key_collision_conflicts() {
        let registry = DataSourceRegistry::new();
        registry
            .register("person", FixedSource::new(&["GENDER"]))
            .unwrap();
        let err = registry
            .register("demographics", FixedSource::new(&["GENDER"]))
            .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateDataSource { .. }));
        assert!(registry.get("demographics").is_none());
    }

    #[test]
    fn test_unregister_frees_keys() {
        let registry = DataSourceRegistry::new();
        registry
            .register("person", FixedSource::new(&["GENDER"]))
            .unwrap();
        assert!(registry.unregister("person").is_some());
        assert!(registry.is_empty());
        registry
            .register("demographics", FixedSource::new(&["GENDER"]))
            .unwrap();
        assert_eq!(registry.resolve("GENDER").unwrap().name, "demographics");
    }

    #[test]
    fn test_resolve_in_scopes_to_source() {
        let registry = DataSourceRegistry::new();
        registry
            .register("pharmacy", FixedSource::new(&["visit.pharmacy"]))
            .unwrap();
        registry.register("obs", FixedSource::new(&["WEIGHT"])).unwrap();
        assert!(registry.resolve_in("pharmacy", "visit.pharmacy").is_ok());
        assert!(registry.resolve_in("obs", "visit.pharmacy").is_err());
        assert!(registry.resolve_in("nowhere", "WEIGHT").is_err());
        assert_eq!(registry.keys(), vec!["visit.pharmacy", "WEIGHT"]);
    }
}
