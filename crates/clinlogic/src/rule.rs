//! Rules addressable as tokens
//!
//! A rule answers yes or no for a patient. Once added to a `LogicService` its
//! token can be referenced from any criteria like a data source key, and
//! evaluates to a boolean result for every cohort member.

use crate::error::{ConfigError, read_json};
use crate::service::LogicService;
use clinlogic_criteria::LogicCriteria;
use clinlogic_eval::{EvalResult, EvaluationContext};
use clinlogic_types::{Cohort, Datatype, PatientId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-patient rule verdicts
pub type Verdicts = IndexMap<PatientId, bool>;

/// A compiled decision rule
pub trait Rule: Send + Sync {
    /// Decide for one patient
    fn evaluate(
        &self,
        service: &LogicService,
        context: &EvaluationContext,
        patient: PatientId,
    ) -> EvalResult<bool>;

    /// Recommended action when the rule fires
    fn action(&self) -> String;

    /// Seconds a verdict stays cached; `None` uses the service's rule TTL
    fn ttl(&self) -> Option<u64> {
        None
    }

    /// Datatype the rule answers with; `None` means boolean
    fn default_datatype(&self) -> Option<Datatype> {
        None
    }

    /// Names of the parameters the rule accepts
    fn parameters(&self) -> Vec<String> {
        Vec::new()
    }

    /// Decide for every cohort member
    fn evaluate_cohort(
        &self,
        service: &LogicService,
        context: &EvaluationContext,
        cohort: &Cohort,
    ) -> EvalResult<Verdicts> {
        cohort
            .iter()
            .map(|patient| {
                self.evaluate(service, context, patient)
                    .map(|fires| (patient, fires))
            })
            .collect()
    }
}

/// A rule defined by criteria: it fires for patients the criteria holds for
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaRule {
    criteria: LogicCriteria,
    action: String,
    ttl_seconds: Option<u64>,
    datatype: Option<Datatype>,
    parameters: Vec<String>,
}

impl CriteriaRule {
    pub fn new(criteria: LogicCriteria, action: impl Into<String>) -> Self {
        Self {
            criteria,
            action: action.into(),
            ttl_seconds: None,
            datatype: None,
            parameters: Vec::new(),
        }
    }

    /// Compile a rule from a criteria expression
    pub fn parse(expression: &str, action: impl Into<String>) -> EvalResult<Self> {
        Ok(Self::new(LogicCriteria::parse(expression)?, action))
    }

    /// Cache verdicts for `seconds` instead of the service's rule TTL
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = Some(datatype);
        self
    }

    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn criteria(&self) -> &LogicCriteria {
        &self.criteria
    }
}

impl Rule for CriteriaRule {
    fn evaluate(
        &self,
        service: &LogicService,
        context: &EvaluationContext,
        patient: PatientId,
    ) -> EvalResult<bool> {
        Ok(service
            .evaluate_patient(context, patient, &self.criteria)?
            .exists())
    }

    fn action(&self) -> String {
        self.action.clone()
    }

    fn ttl(&self) -> Option<u64> {
        self.ttl_seconds
    }

    fn default_datatype(&self) -> Option<Datatype> {
        self.datatype
    }

    fn parameters(&self) -> Vec<String> {
        self.parameters.clone()
    }

    fn evaluate_cohort(
        &self,
        service: &LogicService,
        context: &EvaluationContext,
        cohort: &Cohort,
    ) -> EvalResult<Verdicts> {
        let results = service.evaluate_within(context, cohort, &self.criteria)?;
        Ok(cohort
            .iter()
            .map(|patient| {
                let fires = results.get(&patient).is_some_and(|result| result.exists());
                (patient, fires)
            })
            .collect())
    }
}

/// A data-driven rule as written in a rules file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub token: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub criteria: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<Datatype>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

impl RuleDefinition {
    /// Compile into a `CriteriaRule`
    pub fn compile(&self) -> Result<CriteriaRule, ConfigError> {
        let criteria = LogicCriteria::parse(&self.criteria)
            .map_err(|e| ConfigError::rule(&self.token, e.to_string()))?;
        let mut rule = CriteriaRule::new(criteria, self.action.clone())
            .with_parameters(self.parameters.clone());
        if let Some(seconds) = self.ttl_seconds {
            rule = rule.with_ttl(seconds);
        }
        if let Some(datatype) = self.datatype {
            rule = rule.with_datatype(datatype);
        }
        Ok(rule)
    }
}

/// Contents of a rules file
///
/// ```json
/// { "rules": [
///     { "token": "LOW CD4", "tags": ["hiv"], "criteria": "LAST {CD4 COUNT} < 200", "action": "Start prophylaxis" }
/// ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::parse("<inline>", e.to_string()))
    }
}
