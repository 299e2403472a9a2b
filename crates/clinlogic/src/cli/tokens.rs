//! Tokens command implementation

use super::loader::{self, SessionFiles};
use super::output::{self, OutputFormat};
use anyhow::Result;
use colored::Colorize;

/// List catalogued tokens, optionally filtered by a partial name
pub fn run(partial: Option<&str>, files: &SessionFiles, format: OutputFormat) -> Result<()> {
    let session = loader::load(files)?;
    let service = &session.service;

    let entries: Vec<_> = match partial {
        Some(partial) => service
            .find_tokens(partial)
            .into_iter()
            .filter_map(|token| service.tokens().get_token(&token))
            .collect(),
        None => service.all_tokens(),
    };

    match format {
        OutputFormat::Json => output::print_json(&serde_json::to_value(&entries)?, format),
        OutputFormat::Pretty => {
            if entries.is_empty() {
                eprintln!("{}", output::format_warning("No matching tokens"));
            }
            for entry in &entries {
                println!("{}  {}", entry.token.bold(), entry.tags.join(", ").dimmed());
            }
            Ok(())
        }
    }
}
