//! Clinical decision-support logic engine
//!
//! This crate ties the engine together:
//! - `LogicService`: registers data sources and rules, resolves tokens and
//!   caches provider reads per evaluation context
//! - `Rule` / `CriteriaRule`: compiled or data-driven rules addressable as tokens
//! - `LogicConfig`: cache TTLs and result shaping
//!
//! # Example
//!
//! ```ignore
//! use clinlogic::{LogicService, eval::EvaluationContext};
//! use clinlogic::criteria::LogicCriteria;
//!
//! let service = LogicService::new();
//! service.register_data_source("obs", Arc::new(observations))?;
//!
//! let ctx = service.context_builder().index_date(index).build();
//! let criteria = LogicCriteria::token("CD4 COUNT").lt(200).last();
//! let results = service.evaluate(&ctx, &cohort, &criteria)?;
//! ```

pub use clinlogic_criteria as criteria;
pub use clinlogic_eval as eval;
pub use clinlogic_sources as sources;
pub use clinlogic_types as types;

pub mod config;
pub mod error;
pub mod rule;
pub mod service;

pub use config::LogicConfig;
pub use error::ConfigError;
pub use rule::{CriteriaRule, Rule, RuleDefinition, RuleSet, Verdicts};
pub use service::{LogicService, RULE_TAG};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
