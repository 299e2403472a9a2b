//! Boolean combination of per-patient results

use crate::cache::ResultMap;
use clinlogic_types::{Cohort, LogicResult, PatientId};

fn chain<'a>(map: &'a ResultMap, patient: PatientId) -> Option<&'a LogicResult> {
    map.get(&patient).filter(|result| result.exists())
}

/// Patients for whom every child holds a present finding, with merged chains
pub fn and(cohort: &Cohort, children: &[ResultMap]) -> ResultMap {
    let mut out = ResultMap::new();
    for patient in cohort.iter() {
        let mut merged = LogicResult::empty();
        let mut all = !children.is_empty();
        for child in children {
            match chain(child, patient) {
                Some(result) => merged = merged.add(result),
                None => {
                    all = false;
                    break;
                }
            }
        }
        if all {
            out.insert(patient, merged);
        }
    }
    out
}

/// Patients for whom any child holds a present finding, with merged chains
pub fn or(cohort: &Cohort, children: &[ResultMap]) -> ResultMap {
    let mut out = ResultMap::new();
    for patient in cohort.iter() {
        let merged = children
            .iter()
            .filter_map(|child| chain(child, patient))
            .fold(None, |acc: Option<LogicResult>, result| {
                Some(acc.map_or_else(|| result.clone(), |acc| acc.add(result)))
            });
        if let Some(merged) = merged {
            out.insert(patient, merged);
        }
    }
    out
}

/// Cohort members for whom the child holds no present finding
pub fn not(cohort: &Cohort, child: &ResultMap) -> ResultMap {
    cohort
        .iter()
        .filter(|patient| chain(child, *patient).is_none())
        .map(|patient| (patient, LogicResult::of(true)))
        .collect()
}
