//! Patient populations

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Patient identifier
pub type PatientId = i64;

/// Immutable set of patient identifiers scoped to one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cohort {
    members: BTreeSet<PatientId>,
}

impl Cohort {
    /// Create a cohort from any collection of identifiers
    pub fn new(members: impl IntoIterator<Item = PatientId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    /// Create a cohort holding one patient
    pub fn single(patient: PatientId) -> Self {
        Self::new([patient])
    }

    /// Check membership
    pub fn contains(&self, patient: PatientId) -> bool {
        self.members.contains(&patient)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cohort has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.members.iter().copied()
    }

    /// Members present in either cohort
    pub fn union(&self, other: &Cohort) -> Cohort {
        Self {
            members: self.members.union(&other.members).copied().collect(),
        }
    }

    /// Members present in both cohorts
    pub fn intersect(&self, other: &Cohort) -> Cohort {
        Self {
            members: self.members.intersection(&other.members).copied().collect(),
        }
    }

    /// Members of this cohort absent from `other`
    pub fn subtract(&self, other: &Cohort) -> Cohort {
        Self {
            members: self.members.difference(&other.members).copied().collect(),
        }
    }

    /// Fingerprint used in cache keys.
    ///
    /// Spells out every member in ascending order, so two cohorts share a
    /// fingerprint exactly when they share their members.
    pub fn fingerprint(&self) -> String {
        let ids: Vec<String> = self.members.iter().map(ToString::to_string).collect();
        ids.join(",")
    }
}

impl FromIterator<PatientId> for Cohort {
    fn from_iter<T: IntoIterator<Item = PatientId>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, id) in self.members.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "]")
    }
}
