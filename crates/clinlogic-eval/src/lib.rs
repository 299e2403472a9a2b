//! Clinical logic evaluation engine
//!
//! This crate evaluates `LogicCriteria` expressions against pluggable data
//! sources:
//!
//! - **Data sources**: `LogicDataSource` providers registered in a `DataSourceRegistry`
//! - **Evaluation context**: index date, parameters and a TTL cache invalidated
//!   whenever the base cohort changes
//! - **Criteria engine**: applies comparison, aggregation, temporal and boolean
//!   operators node-wise over each patient's result chain
//! - **Token registry**: catalogue of tokens and tags for discovery
//!
//! # Example
//!
//! ```ignore
//! use clinlogic_eval::{CriteriaEngine, EvaluationContext};
//!
//! let ctx = EvaluationContext::builder().index_date(index).build();
//! let engine = CriteriaEngine::new(&resolver);
//! let results = engine.evaluate(&ctx, &cohort, &criteria)?;
//! ```
//!
//! # Errors
//!
//! Unknown tokens, malformed criteria and provider failures abort the whole
//! evaluation. Missing data for a patient is an empty result, never an error.

pub mod cache;
pub mod clock;
pub mod context;
pub mod engine;
pub mod error;
pub mod operators;
pub mod source;
pub mod tokens;

pub use cache::{CacheEntry, LogicCache, ResultMap};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ActiveRule, EvaluationContext, EvaluationContextBuilder};
pub use engine::{CriteriaEngine, TokenResolver};
pub use error::{EvalError, EvalResult};
pub use source::{
    DEFAULT_TTL_SECONDS, DataSourceRegistration, DataSourceRegistry, LogicDataSource,
};
pub use tokens::{TokenEntry, TokenRegistry};
