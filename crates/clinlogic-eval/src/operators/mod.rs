//! Criteria operator implementations
//!
//! Each module works on one patient's result chain at a time:
//! - Comparison operators filter nodes against an operand
//! - Aggregations trim or summarise a chain
//! - Temporal constraints keep nodes inside a date window
//! - Logical operators combine per-patient truthiness across criteria

pub mod aggregate;
pub mod comparison;
pub mod logical;
pub mod temporal;
