//! Builds a `LogicService` from command-line inputs

use crate::config::LogicConfig;
use crate::service::LogicService;
use anyhow::{Context, Result};
use clinlogic_sources::{DataSet, ObservationDataSource, PatientDataSource};
use clinlogic_types::Cohort;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Files making up one CLI session
#[derive(Debug, Clone, Default)]
pub struct SessionFiles {
    pub data: Option<PathBuf>,
    pub rules: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// A ready service and the population of its data set
pub struct Session {
    pub service: LogicService,
    pub population: Cohort,
}

/// Load configuration, data set and rules into a new service
pub fn load(files: &SessionFiles) -> Result<Session> {
    let config = match &files.config {
        Some(path) => LogicConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => LogicConfig::default(),
    };
    let service = LogicService::with_config(config);

    let mut population = Cohort::default();
    if let Some(path) = &files.data {
        let data = DataSet::from_file(path)
            .with_context(|| format!("Failed to load data set: {}", path.display()))?;
        population = data.cohort();
        let (patients, observations) = data
            .into_stores()
            .with_context(|| format!("Invalid data set: {}", path.display()))?;
        service.register_data_source(
            PatientDataSource::NAME,
            Arc::new(PatientDataSource::new(Arc::new(patients))),
        )?;
        let observations = ObservationDataSource::try_new(Arc::new(observations))
            .context("Failed to list observation concepts")?;
        service.register_data_source(ObservationDataSource::NAME, Arc::new(observations))?;
    }

    if let Some(path) = &files.rules {
        let count = service
            .add_rules_from_file(path)
            .with_context(|| format!("Failed to load rules: {}", path.display()))?;
        info!("Loaded {count} rules from {}", path.display());
    }

    Ok(Session {
        service,
        population,
    })
}
