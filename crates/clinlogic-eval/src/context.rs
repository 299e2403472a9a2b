//! Evaluation context for logic execution

use crate::cache::{LogicCache, ResultMap};
use crate::clock::{Clock, SystemClock};
use crate::error::{EvalError, EvalResult};
use crate::source::DEFAULT_TTL_SECONDS;
use chrono::{Local, NaiveDateTime};
use clinlogic_types::Cohort;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

#[derive(Debug)]
struct ContextState {
    base_cohort: Option<Cohort>,
    cache: LogicCache,
    // Rules being evaluated, per evaluating thread
    active_rules: HashMap<ThreadId, Vec<String>>,
}

/// State shared by every criteria evaluated in one request or report run.
///
/// Cache access and cohort changes go through one lock, so invalidation
/// cannot interleave with a concurrent cache read.
#[derive(Debug)]
pub struct EvaluationContext {
    index_date: NaiveDateTime,
    parameters: HashMap<String, serde_json::Value>,
    state: Mutex<ContextState>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationContext {
    /// Create a context indexed at the current local time
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a context
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::default()
    }

    /// The as-of date for temporal criteria
    pub fn index_date(&self) -> NaiveDateTime {
        self.index_date
    }

    /// Change the index date; cached results are discarded
    pub fn set_index_date(&mut self, index_date: NaiveDateTime) {
        self.index_date = index_date;
        self.clear_cache();
    }

    /// Set a parameter value; cached results are discarded
    pub fn set_parameter(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.parameters.insert(name.into(), value);
        self.clear_cache();
    }

    /// Get a parameter value
    pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }

    /// All parameter values
    pub fn parameters(&self) -> &HashMap<String, serde_json::Value> {
        &self.parameters
    }

    /// Look up a fresh cache entry
    pub fn get_from_cache(&self, key: &str) -> Option<ResultMap> {
        let hit = self.state.lock().cache.get(key);
        match hit {
            Some(_) => debug!("Cache hit for '{key}'"),
            None => debug!("Cache miss for '{key}'"),
        }
        hit
    }

    /// Store a result map; `ttl_seconds` of `None` uses the context default
    pub fn put_in_cache(&self, key: impl Into<String>, value: ResultMap, ttl_seconds: Option<u64>) {
        self.state.lock().cache.put(key, value, ttl_seconds);
    }

    /// Whether a fresh entry exists for `key`
    pub fn is_cached(&self, key: &str) -> bool {
        self.state.lock().cache.contains(key)
    }

    /// Remove one cache entry
    pub fn remove_from_cache(&self, key: &str) {
        self.state.lock().cache.remove(key);
    }

    /// Drop every cache entry
    pub fn clear_cache(&self) {
        self.state.lock().cache.clear();
    }

    /// Number of cache entries
    pub fn cache_len(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Drop expired cache entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.state.lock().cache.purge_expired()
    }

    /// The population cached results were computed against
    pub fn base_cohort(&self) -> Option<Cohort> {
        self.state.lock().base_cohort.clone()
    }

    /// Replace the base cohort and clear the entire cache
    pub fn set_base_cohort(&self, cohort: Cohort) {
        let mut state = self.state.lock();
        let dropped = state.cache.len();
        state.cache.clear();
        state.base_cohort = Some(cohort);
        if dropped > 0 {
            warn!("Base cohort changed; dropped {dropped} cached entries");
        }
    }

    /// Make `cohort` the base cohort unless it already is.
    ///
    /// Returns `true` when the cohort changed and the cache was cleared.
    pub fn use_cohort(&self, cohort: &Cohort) -> bool {
        let mut state = self.state.lock();
        if state.base_cohort.as_ref() == Some(cohort) {
            return false;
        }
        let dropped = state.cache.len();
        state.cache.clear();
        state.base_cohort = Some(cohort.clone());
        if dropped > 0 {
            warn!("Base cohort changed; dropped {dropped} cached entries");
        }
        true
    }

    /// Mark a rule as being evaluated by the current thread; fails if the
    /// thread is already evaluating it
    pub fn enter_rule(&self, token: &str) -> EvalResult<ActiveRule<'_>> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        let stack = state.active_rules.entry(thread).or_default();
        if stack.iter().any(|active| active == token) {
            let chain = stack.join(" -> ");
            return Err(EvalError::criteria(
                token,
                format!("rule refers back to itself ({chain} -> {token})"),
            ));
        }
        stack.push(token.to_string());
        Ok(ActiveRule {
            context: self,
            thread,
            token: token.to_string(),
        })
    }
}

/// Guard returned by `EvaluationContext::enter_rule`
#[derive(Debug)]
pub struct ActiveRule<'a> {
    context: &'a EvaluationContext,
    thread: ThreadId,
    token: String,
}

impl Drop for ActiveRule<'_> {
    fn drop(&mut self) {
        let mut state = self.context.state.lock();
        if let Some(stack) = state.active_rules.get_mut(&self.thread) {
            if let Some(pos) = stack.iter().rposition(|t| *t == self.token) {
                stack.remove(pos);
            }
            if stack.is_empty() {
                state.active_rules.remove(&self.thread);
            }
        }
    }
}

/// Builder for `EvaluationContext`
#[derive(Debug, Default)]
pub struct EvaluationContextBuilder {
    index_date: Option<NaiveDateTime>,
    parameters: HashMap<String, serde_json::Value>,
    clock: Option<Arc<dyn Clock>>,
    default_ttl_seconds: Option<u64>,
    base_cohort: Option<Cohort>,
}

impl EvaluationContextBuilder {
    /// Set the index date
    pub fn index_date(mut self, index_date: NaiveDateTime) -> Self {
        self.index_date = Some(index_date);
        self
    }

    /// Add a parameter
    pub fn parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Use a specific clock for cache expiry
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// TTL for cache entries stored without one
    pub fn default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = Some(seconds);
        self
    }

    /// Start with a base cohort
    pub fn base_cohort(mut self, cohort: Cohort) -> Self {
        self.base_cohort = Some(cohort);
        self
    }

    /// Build the context
    pub fn build(self) -> EvaluationContext {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ttl = self.default_ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        EvaluationContext {
            index_date: self
                .index_date
                .unwrap_or_else(|| Local::now().naive_local()),
            parameters: self.parameters,
            state: Mutex::new(ContextState {
                base_cohort: self.base_cohort,
                cache: LogicCache::new(ttl, clock),
                active_rules: HashMap::new(),
            }),
        }
    }
}
