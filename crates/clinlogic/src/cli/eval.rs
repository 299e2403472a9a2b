//! Eval command implementation

use super::loader::{self, SessionFiles};
use super::output::{self, OutputFormat};
use anyhow::{Context, Result, bail};
use clinlogic_criteria::LogicCriteria;
use clinlogic_eval::ResultMap;
use clinlogic_types::{Cohort, PatientId, parse_datetime};
use colored::Colorize;
use serde_json::{Value, json};

/// Configuration for the eval command
pub struct EvalConfig {
    pub expression: String,
    pub files: SessionFiles,
    pub patients: Vec<PatientId>,
    pub index_date: Option<String>,
    pub format: OutputFormat,
}

/// Evaluate an expression against a data set
pub fn run(config: EvalConfig) -> Result<()> {
    let criteria = LogicCriteria::parse(&config.expression)
        .with_context(|| format!("Failed to parse expression: {}", config.expression))?;
    let session = loader::load(&config.files)?;

    let cohort = if config.patients.is_empty() {
        session.population.clone()
    } else {
        Cohort::new(config.patients.iter().copied())
    };
    if cohort.is_empty() {
        bail!("No patients to evaluate; pass --data or --patients");
    }

    let mut builder = session.service.context_builder();
    if let Some(text) = &config.index_date {
        let Some(index_date) = parse_datetime(text) else {
            bail!("Invalid index date '{text}', expected YYYY-MM-DD");
        };
        builder = builder.index_date(index_date);
    }
    let context = builder.build();

    let results = session.service.evaluate(&context, &cohort, &criteria)?;

    match config.format {
        OutputFormat::Json => output::print_json(
            &results_json(&criteria, context.index_date().to_string(), &results),
            config.format,
        ),
        OutputFormat::Pretty => {
            print_pretty(&criteria, &results);
            Ok(())
        }
    }
}

fn results_json(criteria: &LogicCriteria, index_date: String, results: &ResultMap) -> Value {
    let patients: serde_json::Map<String, Value> = results
        .iter()
        .map(|(patient, result)| {
            (
                patient.to_string(),
                json!({
                    "value": result.to_string(),
                    "exists": result.exists(),
                    "nodes": result,
                }),
            )
        })
        .collect();
    json!({
        "expression": criteria.to_string(),
        "index_date": index_date,
        "matched": results.values().filter(|r| r.exists()).count(),
        "results": patients,
    })
}

fn print_pretty(criteria: &LogicCriteria, results: &ResultMap) {
    println!("{}", output::labelled("Expression", &criteria.to_string()));
    for (patient, result) in results {
        let marker = if result.exists() {
            "✓".green()
        } else {
            "·".dimmed()
        };
        let value = if result.is_empty() {
            "(no data)".dimmed().to_string()
        } else {
            result.to_string()
        };
        println!("  {marker} patient {patient}: {value}");
    }
    let matched = results.values().filter(|r| r.exists()).count();
    println!(
        "{}",
        output::format_success(&format!("{matched} of {} patients matched", results.len()))
    );
}
