//! Shared fixtures for service tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use clinlogic::LogicService;
use clinlogic_criteria::LogicCriteria;
use clinlogic_eval::{
    EvalError, EvalResult, EvaluationContext, LogicDataSource, ManualClock, ResultMap,
};
use clinlogic_types::{Cohort, LogicResult, PatientId, ResultNode};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn index_date() -> NaiveDateTime {
    ymd(2024, 1, 1)
}

/// Data source serving fixed chains per key and counting its reads
pub struct CountingSource {
    data: RwLock<IndexMap<String, ResultMap>>,
    ttl_seconds: u64,
    reads: AtomicUsize,
    fail_with: Option<String>,
}

impl CountingSource {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            data: RwLock::new(IndexMap::new()),
            ttl_seconds,
            reads: AtomicUsize::new(0),
            fail_with: None,
        }
    }

    /// A source whose every read fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(60)
        }
    }

    /// Serve `nodes` for `patient` under `key`
    pub fn with(self, key: &str, patient: PatientId, nodes: Vec<ResultNode>) -> Self {
        self.data
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(patient, LogicResult::from_nodes(nodes));
        self
    }

    /// Declare a key without any data behind it
    pub fn with_key(self, key: &str) -> Self {
        self.data.write().entry(key.to_string()).or_default();
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl LogicDataSource for CountingSource {
    fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
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
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(EvalError::provider_unavailable("counting", message.clone()));
        }
        let key = criteria
            .root_token()
            .map(|token| token.key.clone())
            .unwrap_or_default();
        let data = self.data.read();
        let results = data.get(&key).ok_or_else(|| EvalError::unknown_key(&key))?;
        Ok(results
            .iter()
            .filter(|(patient, result)| cohort.contains(**patient) && !result.is_empty())
            .map(|(patient, result)| (*patient, result.clone()))
            .collect())
    }
}

/// Clinic of four patients: 1 and 3 male, 2 and 4 female, with CD4 counts
pub fn clinic_source(ttl_seconds: u64) -> CountingSource {
    CountingSource::new(ttl_seconds)
        .with("GENDER", 1, vec![ResultNode::new("M")])
        .with("GENDER", 2, vec![ResultNode::new("F")])
        .with("GENDER", 3, vec![ResultNode::new("M")])
        .with("GENDER", 4, vec![ResultNode::new("F")])
        .with(
            "CD4 COUNT",
            1,
            vec![
                ResultNode::dated(ymd(2023, 2, 5), 150),
                ResultNode::dated(ymd(2023, 9, 1), 420),
            ],
        )
        .with(
            "CD4 COUNT",
            2,
            vec![ResultNode::dated(ymd(2023, 2, 4), 90)],
        )
        .with(
            "CD4 COUNT",
            3,
            vec![ResultNode::dated(ymd(2023, 12, 1), 180)],
        )
}

pub fn clinic() -> Cohort {
    Cohort::new([1, 2, 3, 4])
}

/// A service with `source` registered as "counting"
pub fn service_with(source: Arc<CountingSource>) -> LogicService {
    let service = LogicService::new();
    service
        .register_data_source("counting", source)
        .unwrap();
    service
}

/// A context at the shared index date driven by `clock`
pub fn context_with_clock(service: &LogicService, clock: Arc<ManualClock>) -> EvaluationContext {
    service
        .context_builder()
        .index_date(index_date())
        .clock(clock)
        .build()
}

pub fn context(service: &LogicService) -> EvaluationContext {
    context_with_clock(service, Arc::new(ManualClock::new(index_date())))
}

pub fn patients(map: &ResultMap) -> Vec<PatientId> {
    map.iter()
        .filter(|(_, result)| !result.is_empty())
        .map(|(patient, _)| *patient)
        .collect()
}

pub fn criteria(expression: &str) -> LogicCriteria {
    LogicCriteria::parse(expression).unwrap()
}
