//! Parse command implementation

use super::output::{self, OutputFormat};
use anyhow::{Context, Result};
use clinlogic_criteria::LogicCriteria;
use serde_json::json;

/// Parse an expression and print its canonical form and tree
pub fn run(expression: &str, format: OutputFormat) -> Result<()> {
    let criteria = LogicCriteria::parse(expression)
        .with_context(|| format!("Failed to parse expression: {expression}"))?;
    let tree = serde_json::to_value(&criteria).context("Failed to serialize criteria")?;

    match format {
        OutputFormat::Json => output::print_json(
            &json!({ "canonical": criteria.to_string(), "criteria": tree }),
            format,
        ),
        OutputFormat::Pretty => {
            println!("{}", output::labelled("Canonical", &criteria.to_string()));
            let tokens: Vec<String> = criteria.tokens().iter().map(|t| t.to_string()).collect();
            println!("{}", output::labelled("Tokens", &tokens.join(", ")));
            output::print_json(&tree, OutputFormat::Pretty)
        }
    }
}
