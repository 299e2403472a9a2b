//! Backing store contracts and in-memory implementations

use crate::error::SourceResult;
use chrono::{NaiveDate, NaiveDateTime};
use clinlogic_types::{Cohort, Concept, PatientId, Value};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One recorded observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub patient_id: PatientId,
    pub concept: Concept,
    pub date: NaiveDateTime,
    pub value: Value,
}

/// Demographic record of one patient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub death_date: Option<NaiveDate>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
}

impl Patient {
    /// Create a patient with only an identifier
    pub fn new(id: PatientId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_birthdate(mut self, birthdate: NaiveDate) -> Self {
        self.birthdate = Some(birthdate);
        self
    }

    pub fn with_death_date(mut self, death_date: NaiveDate) -> Self {
        self.dead = true;
        self.death_date = Some(death_date);
        self
    }

    pub fn with_name(mut self, given: impl Into<String>, family: impl Into<String>) -> Self {
        self.given_name = Some(given.into());
        self.family_name = Some(family.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Source of recorded observations
pub trait ObservationStore: Send + Sync {
    /// Every concept with at least one observation
    fn concepts(&self) -> SourceResult<Vec<Concept>>;

    /// Observations of the named concept for the cohort members, in any order
    fn observations(&self, concept_name: &str, cohort: &Cohort) -> SourceResult<Vec<Observation>>;
}

/// Source of patient demographics
pub trait PatientStore: Send + Sync {
    /// Records for the cohort members that exist in the store
    fn patients(&self, cohort: &Cohort) -> SourceResult<Vec<Patient>>;
}

/// Observation store held in memory
#[derive(Debug, Default)]
pub struct MemoryObservationStore {
    observations: RwLock<Vec<Observation>>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation
    pub fn insert(&self, observation: Observation) {
        self.observations.write().push(observation);
    }

    /// Record many observations
    pub fn extend(&self, observations: impl IntoIterator<Item = Observation>) {
        self.observations.write().extend(observations);
    }

    pub fn len(&self) -> usize {
        self.observations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.read().is_empty()
    }
}

impl ObservationStore for MemoryObservationStore {
    fn concepts(&self) -> SourceResult<Vec<Concept>> {
        let observations = self.observations.read();
        let mut concepts: IndexMap<&str, &Concept> = IndexMap::new();
        for obs in observations.iter() {
            concepts.entry(obs.concept.name.as_str()).or_insert(&obs.concept);
        }
        Ok(concepts.into_values().cloned().collect())
    }

    fn observations(&self, concept_name: &str, cohort: &Cohort) -> SourceResult<Vec<Observation>> {
        Ok(self
            .observations
            .read()
            .iter()
            .filter(|obs| obs.concept.name == concept_name && cohort.contains(obs.patient_id))
            .cloned()
            .collect())
    }
}

/// Patient store held in memory
#[derive(Debug, Default)]
pub struct MemoryPatientStore {
    patients: RwLock<IndexMap<PatientId, Patient>>,
}

impl MemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a patient record
    pub fn insert(&self, patient: Patient) {
        self.patients.write().insert(patient.id, patient);
    }

    /// Identifiers of every stored patient
    pub fn cohort(&self) -> Cohort {
        self.patients.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.patients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.read().is_empty()
    }
}

impl PatientStore for MemoryPatientStore {
    fn patients(&self, cohort: &Cohort) -> SourceResult<Vec<Patient>> {
        let patients = self.patients.read();
        Ok(cohort
            .iter()
            .filter_map(|id| patients.get(&id).cloned())
            .collect())
    }
}
