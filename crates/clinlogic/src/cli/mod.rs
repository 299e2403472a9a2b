//! CLI functionality for the `logic` tool
//!
//! This module contains:
//! - Expression evaluation against a data set
//! - Expression parsing and canonical rendering
//! - Token catalogue listing
//! - Data set, rule and configuration loading
//! - Output formatting

pub mod eval;
pub mod loader;
pub mod output;
pub mod parse;
pub mod tokens;
