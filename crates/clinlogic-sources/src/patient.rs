//! Patient demographics data source

use crate::store::{Patient, PatientStore};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clinlogic_criteria::LogicCriteria;
use clinlogic_eval::{
    DEFAULT_TTL_SECONDS, EvalError, EvalResult, EvaluationContext, LogicDataSource, ResultMap,
};
use clinlogic_types::{Cohort, Datatype, LogicResult, ResultNode};
use log::debug;
use std::sync::Arc;

/// Demographic attributes served by `PatientDataSource`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemographicKey {
    Gender,
    Birthdate,
    /// Whole years at the index date, or at death if earlier
    Age,
    Dead,
    DeathDate,
    Identifier,
    FamilyName,
    GivenName,
}

const DEMOGRAPHIC_KEYS: &[(&str, DemographicKey)] = &[
    ("GENDER", DemographicKey::Gender),
    ("BIRTHDATE", DemographicKey::Birthdate),
    ("AGE", DemographicKey::Age),
    ("DEAD", DemographicKey::Dead),
    ("DEATH DATE", DemographicKey::DeathDate),
    ("IDENTIFIER", DemographicKey::Identifier),
    ("FAMILY NAME", DemographicKey::FamilyName),
    ("GIVEN NAME", DemographicKey::GivenName),
];

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

impl DemographicKey {
    /// Look up the attribute for a key
    pub fn from_key(key: &str) -> Option<Self> {
        DEMOGRAPHIC_KEYS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, attr)| *attr)
    }

    /// The key this attribute is served under
    pub fn key(self) -> &'static str {
        DEMOGRAPHIC_KEYS
            .iter()
            .find(|(_, attr)| *attr == self)
            .map_or("", |(name, _)| *name)
    }

    /// Datatype of the attribute's values
    pub fn datatype(self) -> Datatype {
        match self {
            DemographicKey::Birthdate | DemographicKey::DeathDate => Datatype::Datetime,
            DemographicKey::Age => Datatype::Numeric,
            DemographicKey::Dead => Datatype::Boolean,
            DemographicKey::Gender
            | DemographicKey::Identifier
            | DemographicKey::FamilyName
            | DemographicKey::GivenName => Datatype::Text,
        }
    }

    /// Every served key
    pub fn all_keys() -> impl Iterator<Item = &'static str> {
        DEMOGRAPHIC_KEYS.iter().map(|(name, _)| *name)
    }

    /// The attribute's node for one patient, if recorded
    pub fn extract(self, patient: &Patient, index_date: NaiveDateTime) -> Option<ResultNode> {
        let node = match self {
            DemographicKey::Gender => ResultNode::new(patient.gender.clone()?),
            DemographicKey::Birthdate => {
                let born = midnight(patient.birthdate?);
                ResultNode::dated(born, born)
            }
            DemographicKey::Age => {
                let mut on = index_date.date();
                if let Some(died) = patient.death_date {
                    on = on.min(died);
                }
                let age = on.years_since(patient.birthdate?)?;
                ResultNode::new(i64::from(age))
            }
            DemographicKey::Dead => ResultNode::new(patient.dead),
            DemographicKey::DeathDate => {
                let died = midnight(patient.death_date?);
                ResultNode::dated(died, died)
            }
            DemographicKey::Identifier => ResultNode::new(patient.identifier.clone()?),
            DemographicKey::FamilyName => ResultNode::new(patient.family_name.clone()?),
            DemographicKey::GivenName => ResultNode::new(patient.given_name.clone()?),
        };
        Some(node.with_source(self.key()))
    }
}

/// Data source over a `PatientStore`
pub struct PatientDataSource {
    store: Arc<dyn PatientStore>,
    ttl_seconds: u64,
}

impl PatientDataSource {
    /// Name the source registers under by default
    pub const NAME: &'static str = "person";

    pub fn new(store: Arc<dyn PatientStore>) -> Self {
        Self {
            store,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }

    /// Override the cache TTL
    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = seconds;
        self
    }
}

impl LogicDataSource for PatientDataSource {
    fn keys(&self) -> Vec<String> {
        DemographicKey::all_keys().map(String::from).collect()
    }

    fn has_key(&self, key: &str) -> bool {
        DemographicKey::from_key(key).is_some()
    }

    fn default_ttl(&self) -> u64 {
        self.ttl_seconds
    }

    fn default_datatype(&self, key: &str) -> Option<Datatype> {
        DemographicKey::from_key(key).map(DemographicKey::datatype)
    }

    fn read(
        &self,
        context: &EvaluationContext,
        cohort: &Cohort,
        criteria: &LogicCriteria,
    ) -> EvalResult<ResultMap> {
        let token = criteria
            .root_token()
            .ok_or_else(|| EvalError::criteria(criteria.to_string(), "no token to read"))?;
        let attribute =
            DemographicKey::from_key(&token.key).ok_or_else(|| EvalError::unknown_key(&token.key))?;

        let patients = self
            .store
            .patients(cohort)
            .map_err(|e| e.into_eval(Self::NAME))?;
        debug!(
            "Read '{}' for {} of {} patients",
            token.key,
            patients.len(),
            cohort.len()
        );

        let index_date = context.index_date();
        Ok(patients
            .iter()
            .filter_map(|patient| {
                attribute
                    .extract(patient, index_date)
                    .map(|node| (patient.id, LogicResult::from_node(node)))
            })
            .collect())
    }
}
