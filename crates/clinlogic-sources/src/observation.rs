//! Observation data source
//!
//! Every concept known to the store when the source is built is a key. A
//! store that cannot list its concepts fails construction. A read fetches the
//! concept's observations for the whole cohort in one store call and groups
//! them into chronological chains per patient.

use crate::error::SourceResult;
use crate::store::ObservationStore;
use clinlogic_criteria::LogicCriteria;
use clinlogic_eval::{
    DEFAULT_TTL_SECONDS, EvalError, EvalResult, EvaluationContext, LogicDataSource, ResultMap,
};
use clinlogic_types::{Cohort, LogicResult, PatientId, ResultNode};
use indexmap::IndexMap;
use log::{debug, info};
use std::sync::Arc;

/// Data source over an `ObservationStore`
pub struct ObservationDataSource {
    store: Arc<dyn ObservationStore>,
    keys: Vec<String>,
    ttl_seconds: u64,
}

impl ObservationDataSource {
    /// Name the source registers under by default
    pub const NAME: &'static str = "obs";

    /// Build a source serving every concept the store knows
    pub fn try_new(store: Arc<dyn ObservationStore>) -> SourceResult<Self> {
        let keys: Vec<String> = store.concepts()?.into_iter().map(|c| c.name).collect();
        info!("Observation source serves {} concepts", keys.len());
        Ok(Self {
            store,
            keys,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        })
    }

    /// Override the cache TTL
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }
}

impl LogicDataSource for ObservationDataSource {
    fn keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    fn has_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    fn default_ttl(&self) -> u64 {
        self.ttl_seconds
    }

    fn read(
        &self,
        _context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        let key = criteria
            .root_token()
            .map(|token| token.key.as_str())
            .ok_or_else(|| EvalError::criteria(criteria.to_string(), "no token to read"))?;

        let observations = self
            .store
            .observations(key, cohort)
            .map_err(|e| e.into_eval(Self::NAME))?;
        debug!(
            "Read {} '{key}' observations for {} patients",
            observations.len(),
            cohort.len()
        );

        let mut grouped: IndexMap<PatientId, Vec<ResultNode>> = IndexMap::new();
        for obs in observations {
            grouped
                .entry(obs.patient_id)
                .or_default()
                .push(ResultNode::dated(obs.date, obs.value).with_source(key));
        }
        grouped.sort_keys();
        Ok(grouped
            .into_iter()
            .map(|(patient, nodes)| (patient, LogicResult::from_nodes(nodes).sorted()))
            .collect())
    }
}
