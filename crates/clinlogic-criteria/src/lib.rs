//! Criteria algebra for clinical logic queries
//!
//! A `LogicCriteria` is an immutable expression tree describing which findings
//! to fetch and how to filter them:
//!
//! - **Token references**: a data source key or compiled rule token
//! - **Comparisons**: `=`, `!=`, `<`, `<=`, `>`, `>=`, `contains`
//! - **Aggregations**: `last(n)`, `first(n)`, `count`, `average`, `exists`, ...
//! - **Temporal constraints**: `within`, `before`, `after`, `as_of`
//! - **Boolean combinations**: `AND`, `OR`, `NOT`
//!
//! Criteria are built fluently or parsed from text:
//!
//! ```ignore
//! use clinlogic_criteria::LogicCriteria;
//!
//! let built = LogicCriteria::token("CD4 COUNT").lt(200).last();
//! let parsed = LogicCriteria::parse("\"CD4 COUNT\".last(2).within.past.days(330)")?;
//! ```

pub mod criteria;
pub mod error;
mod parser;

pub use criteria::{
    Aggregate, BooleanOp, ComparisonOp, DateConstraint, DateRef, Direction, LogicCriteria, Operand,
    TokenReference,
};
pub use error::CriteriaError;
pub use parser::parse;
