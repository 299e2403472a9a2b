//! JSON data set loader
//!
//! A data set file holds patients, observations and an optional concept
//! dictionary:
//!
//! ```json
//! {
//!   "concepts": [{ "id": 5497, "name": "CD4 COUNT" }],
//!   "patients": [{ "id": 1, "gender": "M", "birthdate": "1990-06-15" }],
//!   "observations": [
//!     { "patient": 1, "concept": "CD4 COUNT", "date": "2023-06-10", "value": 180 },
//!     { "patient": 1, "concept": "HIV TEST", "date": "2023-06-10", "value": { "coded": "POSITIVE" } }
//!   ]
//! }
//! ```
//!
//! Concepts missing from the dictionary get identifiers after the highest
//! declared one, in order of first appearance.

use crate::error::{SourceError, SourceResult};
use crate::store::{MemoryObservationStore, MemoryPatientStore, Observation, Patient};
use clinlogic_types::{Cohort, Concept, PatientId, Value, parse_datetime};
use indexmap::IndexMap;
use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// One observation as written in a data set file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub patient: PatientId,
    pub concept: String,
    pub date: String,
    pub value: serde_json::Value,
}

/// Patients, observations and concepts loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub observations: Vec<ObservationRecord>,
}

struct ConceptDictionary {
    by_name: IndexMap<String, Concept>,
    next_id: i64,
}

impl ConceptDictionary {
    fn new(declared: &[Concept]) -> Self {
        let by_name: IndexMap<String, Concept> = declared
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();
        let next_id = declared.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        Self { by_name, next_id }
    }

    fn concept(&mut self, name: &str) -> Concept {
        if let Some(concept) = self.by_name.get(name) {
            return concept.clone();
        }
        let concept = Concept::new(self.next_id, name);
        self.next_id += 1;
        self.by_name.insert(name.to_string(), concept.clone());
        concept
    }
}

fn convert_value(
    record: &ObservationRecord,
    concepts: &mut ConceptDictionary,
) -> SourceResult<Value> {
    let invalid = |what: &str| {
        SourceError::format(format!(
            "observation of '{}' for patient {}: {what}",
            record.concept, record.patient
        ))
    };
    match &record.value {
        serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map(Value::Numeric)
            .map_err(|_| invalid("number out of range")),
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        serde_json::Value::Object(fields) => {
            if let Some(name) = fields.get("coded").and_then(|v| v.as_str()) {
                Ok(Value::Coded(concepts.concept(name)))
            } else if let Some(text) = fields.get("datetime").and_then(|v| v.as_str()) {
                parse_datetime(text)
                    .map(Value::Datetime)
                    .ok_or_else(|| invalid("unreadable datetime value"))
            } else {
                Err(invalid("object values need a 'coded' or 'datetime' field"))
            }
        }
        serde_json::Value::Null | serde_json::Value::Array(_) => {
            Err(invalid("value must be a boolean, number, string or object"))
        }
    }
}

impl DataSet {
    /// Parse a data set from JSON text
    pub fn from_json(text: &str) -> SourceResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a data set file
    pub fn from_file(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SourceError::io(path.display().to_string(), e.to_string()))?;
        let data = Self::from_json(&text)?;
        info!(
            "Loaded {} patients and {} observations from {}",
            data.patients.len(),
            data.observations.len(),
            path.display()
        );
        Ok(data)
    }

    /// Every patient identifier in the data set
    pub fn cohort(&self) -> Cohort {
        self.patients
            .iter()
            .map(|p| p.id)
            .chain(self.observations.iter().map(|o| o.patient))
            .collect()
    }

    /// Resolve concepts and values into observations
    pub fn resolve_observations(&self) -> SourceResult<Vec<Observation>> {
        let mut concepts = ConceptDictionary::new(&self.concepts);
        self.observations
            .iter()
            .map(|record| {
                let date = parse_datetime(&record.date).ok_or_else(|| {
                    SourceError::format(format!(
                        "observation of '{}' for patient {}: unreadable date '{}'",
                        record.concept, record.patient, record.date
                    ))
                })?;
                Ok(Observation {
                    patient_id: record.patient,
                    concept: concepts.concept(&record.concept),
                    date,
                    value: convert_value(record, &mut concepts)?,
                })
            })
            .collect()
    }

    /// Build in-memory stores holding the data set
    pub fn into_stores(self) -> SourceResult<(MemoryPatientStore, MemoryObservationStore)> {
        let observations = self.resolve_observations()?;
        let patients = MemoryPatientStore::new();
        for patient in self.patients {
            patients.insert(patient);
        }
        let store = MemoryObservationStore::new();
        store.extend(observations);
        Ok((patients, store))
    }
}
