//! Logic service: the orchestrator behind every evaluation
//!
//! The service owns the data source registry, the token catalogue and the
//! rule table. It resolves each token reference either to a rule or to the
//! data source serving the key, and caches provider reads in the evaluation
//! context under keys that combine source, key, cohort and index date.

use crate::config::LogicConfig;
use crate::error::ConfigError;
use crate::rule::{Rule, RuleSet};
use clinlogic_criteria::{LogicCriteria, TokenReference};
use clinlogic_eval::{
    CriteriaEngine, DataSourceRegistry, EvalError, EvalResult, EvaluationContext,
    EvaluationContextBuilder, LogicDataSource, ResultMap, TokenEntry, TokenRegistry,
    TokenResolver,
};
use clinlogic_types::{Cohort, Datatype, LogicResult, PatientId};
use indexmap::IndexMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tag attached to every rule token
pub const RULE_TAG: &str = "rule";

/// Clinical logic orchestrator
pub struct LogicService {
    config: LogicConfig,
    sources: DataSourceRegistry,
    tokens: TokenRegistry,
    rules: RwLock<IndexMap<String, Arc<dyn Rule>>>,
    // Bumped on rule changes so cached verdicts of replaced rules are never served
    rule_generation: AtomicU64,
}

impl Default for LogicService {
    fn default() -> Self {
        Self::new()
    }
}

impl LogicService {
    /// Create a service with the default configuration
    pub fn new() -> Self {
        Self::with_config(LogicConfig::default())
    }

    /// Create a service with a specific configuration
    pub fn with_config(config: LogicConfig) -> Self {
        Self {
            config,
            sources: DataSourceRegistry::new(),
            tokens: TokenRegistry::new(),
            rules: RwLock::new(IndexMap::new()),
            rule_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &LogicConfig {
        &self.config
    }

    /// The data source registry
    pub fn sources(&self) -> &DataSourceRegistry {
        &self.sources
    }

    /// The token catalogue
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// A context builder preconfigured with the service's default TTL
    pub fn context_builder(&self) -> EvaluationContextBuilder {
        EvaluationContext::builder().default_ttl(self.config.default_ttl_seconds)
    }

    // =====================================================================
    // Data sources
    // =====================================================================

    /// Register a data source; each of its keys becomes a token tagged with
    /// the source name
    pub fn register_data_source(
        &self,
        name: impl Into<String>,
        source: Arc<dyn LogicDataSource>,
    ) -> EvalResult<()> {
        let name = name.into();
        // Held across registration so no rule can claim a key in between
        let rules = self.rules.write();
        if let Some(key) = source.keys().into_iter().find(|key| rules.contains_key(key)) {
            return Err(EvalError::duplicate_data_source(
                &name,
                format!("key '{key}' is already a rule token"),
            ));
        }
        self.sources.register(name.clone(), source)?;
        drop(rules);
        if let Some(registration) = self.sources.registration(&name) {
            for key in &registration.keys {
                self.tokens.save_token(key.clone(), [name.clone()]);
            }
        }
        Ok(())
    }

    /// Remove a data source and its tokens
    pub fn unregister_data_source(&self, name: &str) -> bool {
        match self.sources.unregister(name) {
            Some(registration) => {
                for key in &registration.keys {
                    self.tokens.delete_token(key);
                }
                true
            }
            None => false,
        }
    }

    // =====================================================================
    // Rules
    // =====================================================================

    /// Add a rule under a new token
    pub fn add_rule<I, S>(&self, token: impl Into<String>, tags: I, rule: Arc<dyn Rule>) -> EvalResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let token = token.into();
        let mut rules = self.rules.write();
        if rules.contains_key(&token) || self.sources.has_key(&token) {
            return Err(EvalError::duplicate_token(token));
        }
        let mut tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        tags.push(RULE_TAG.to_string());
        self.tokens.save_token(token.clone(), tags);
        info!("Added rule '{token}'");
        rules.insert(token, rule);
        Ok(())
    }

    /// Get a rule by token
    pub fn get_rule(&self, token: &str) -> Option<Arc<dyn Rule>> {
        self.rules.read().get(token).cloned()
    }

    /// Replace an existing rule, keeping its tags
    pub fn update_rule(&self, token: &str, rule: Arc<dyn Rule>) -> EvalResult<()> {
        let mut rules = self.rules.write();
        let slot = rules
            .get_mut(token)
            .ok_or_else(|| EvalError::unknown_key(token))?;
        *slot = rule;
        self.rule_generation.fetch_add(1, Ordering::Relaxed);
        info!("Updated rule '{token}'");
        Ok(())
    }

    /// Remove a rule and its token
    pub fn remove_rule(&self, token: &str) -> Option<Arc<dyn Rule>> {
        let removed = self.rules.write().shift_remove(token)?;
        self.tokens.delete_token(token);
        self.rule_generation.fetch_add(1, Ordering::Relaxed);
        info!("Removed rule '{token}'");
        Some(removed)
    }

    /// Every rule token, in insertion order
    pub fn rule_tokens(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    /// Compile and add every rule of a rule set
    pub fn add_rules(&self, set: &RuleSet) -> Result<(), ConfigError> {
        for definition in &set.rules {
            let rule = definition.compile()?;
            self.add_rule(definition.token.clone(), definition.tags.clone(), Arc::new(rule))
                .map_err(|e| ConfigError::rule(&definition.token, e.to_string()))?;
        }
        Ok(())
    }

    /// Load and add the rules of a rules file
    pub fn add_rules_from_file(&self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let set = RuleSet::from_file(path)?;
        self.add_rules(&set)?;
        Ok(set.rules.len())
    }

    // =====================================================================
    // Evaluation
    // =====================================================================

    /// Evaluate criteria for a cohort.
    ///
    /// The cohort becomes the context's base cohort; switching to a different
    /// cohort clears the context cache.
    pub fn evaluate(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        context.use_cohort(cohort);
        let mut results = self.evaluate_within(context, cohort, criteria)?;
        if self.config.fill_missing {
            for patient in cohort.iter() {
                results.entry(patient).or_default();
            }
            results.sort_keys();
        }
        Ok(results)
    }

    /// Parse and evaluate an expression for a cohort
    pub fn evaluate_expression(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        expression: &str,
    ) -> EvalResult<ResultMap> {
        let criteria = LogicCriteria::parse(expression)?;
        self.evaluate(context, cohort, &criteria)
    }

    /// Evaluate criteria for one patient without touching the base cohort
    pub fn evaluate_patient(
        &self,
        context: &EvaluationContext,
        patient: PatientId,
        criteria: &LogicCriteria,
    ) -> EvalResult<LogicResult> {
        let mut results = self.evaluate_within(context, &Cohort::single(patient), criteria)?;
        Ok(results.shift_remove(&patient).unwrap_or_default())
    }

    /// Evaluate several criteria for a cohort, in order
    pub fn evaluate_many(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &[LogicCriteria],
    ) -> EvalResult<Vec<ResultMap>> {
        criteria
            .iter()
            .map(|c| self.evaluate(context, cohort, c))
            .collect()
    }

    /// Run the engine without rebasing the cache or filling missing members
    pub(crate) fn evaluate_within(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        CriteriaEngine::new(self).evaluate(context, cohort, criteria)
    }

    fn resolve_rule(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        token: &str,
        rule: &dyn Rule,
    ) -> EvalResult<ResultMap> {
        let cache_key = format!(
            "rule:{token}#{}|cohort:{}|index:{}",
            self.rule_generation.load(Ordering::Relaxed),
            cohort.fingerprint(),
            context.index_date()
        );
        if let Some(hit) = context.get_from_cache(&cache_key) {
            return Ok(hit);
        }

        let _active = context.enter_rule(token)?;
        let verdicts = rule
            .evaluate_cohort(self, context, cohort)
            .map_err(|e| {
                if e.is_structural() {
                    e
                } else {
                    warn!("Rule '{token}' failed: {e}");
                    EvalError::rule_failed(token, e.to_string())
                }
            })?;
        let results: ResultMap = verdicts
            .into_iter()
            .map(|(patient, fires)| (patient, LogicResult::of(fires)))
            .collect();
        let ttl = rule.ttl().unwrap_or_else(|| self.config.rule_ttl());
        context.put_in_cache(cache_key, results.clone(), Some(ttl));
        Ok(results)
    }

    // =====================================================================
    // Token catalogue
    // =====================================================================

    /// Every token with its tags
    pub fn all_tokens(&self) -> Vec<TokenEntry> {
        self.tokens.entries()
    }

    /// Tokens containing `partial`, case-insensitively
    pub fn find_tokens(&self, partial: &str) -> Vec<String> {
        self.tokens.get_tokens(partial)
    }

    /// Tags containing `partial`, case-insensitively
    pub fn find_tags(&self, partial: &str) -> Vec<String> {
        self.tokens.get_tags(partial)
    }

    /// Tags of one token
    pub fn token_tags(&self, token: &str) -> Option<Vec<String>> {
        self.tokens.tags_of(token)
    }

    pub fn add_token_tag(&self, token: &str, tag: impl Into<String>) -> EvalResult<()> {
        self.tokens.add_tag(token, tag)
    }

    pub fn remove_token_tag(&self, token: &str, tag: &str) -> EvalResult<bool> {
        self.tokens.remove_tag(token, tag)
    }

    /// Tokens carrying `tag`
    pub fn tokens_with_tag(&self, tag: &str) -> Vec<String> {
        self.tokens.get_tokens_by_tag(tag)
    }

    /// Datatype a token answers with.
    ///
    /// Rules answer boolean unless they declare otherwise; source keys answer
    /// whatever their source reports.
    pub fn default_datatype(&self, token: &str) -> Option<Datatype> {
        if let Some(rule) = self.get_rule(token) {
            return Some(rule.default_datatype().unwrap_or(Datatype::Boolean));
        }
        self.sources
            .resolve(token)
            .ok()?
            .instance
            .default_datatype(token)
    }

    /// Parameters a token accepts; source keys take none
    pub fn parameter_list(&self, token: &str) -> Option<Vec<String>> {
        if let Some(rule) = self.get_rule(token) {
            return Some(rule.parameters());
        }
        self.sources.has_key(token).then(Vec::new)
    }
}

impl TokenResolver for LogicService {
    fn resolve(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        reference: &TokenReference,
    ) -> EvalResult<ResultMap> {
        if reference.source.is_none() {
            if let Some(rule) = self.get_rule(&reference.key) {
                return self.resolve_rule(context, cohort, &reference.key, rule.as_ref());
            }
        }

        let registration = match &reference.source {
            Some(source) => self.sources.resolve_in(source, &reference.key)?,
            None => self.sources.resolve(&reference.key)?,
        };
        let cache_key = format!(
            "source:{}|key:{}|cohort:{}|index:{}",
            registration.name,
            reference.key,
            cohort.fingerprint(),
            context.index_date()
        );
        if let Some(hit) = context.get_from_cache(&cache_key) {
            return Ok(hit);
        }

        debug!("Reading '{}' from '{}'", reference.key, registration.name);
        let token = LogicCriteria::Token(TokenReference::new(reference.key.clone()));
        let results = registration.instance.read(context, cohort, &token)?;
        let ttl = self
            .config
            .source_ttl(&registration.name, registration.default_ttl);
        context.put_in_cache(cache_key, results.clone(), Some(ttl));
        Ok(results)
    }
}
