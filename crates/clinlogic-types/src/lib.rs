//! Clinical logic value types
//!
//! This crate defines the values that flow through the logic engine:
//! - `LogicResult`: a chain of dated findings for one patient and token
//! - `Value` / `Datatype` / `Concept`: the typed payload of a finding
//! - `Cohort`: the immutable patient population of one evaluation
//! - `Duration`: clinical durations used by temporal constraints
//! - `CoercionError`: raised when a result cannot be read as a requested type

pub mod cohort;
pub mod duration;
pub mod error;
pub mod result;
pub mod value;

pub use cohort::{Cohort, PatientId};
pub use duration::{Duration, DurationUnits};
pub use error::CoercionError;
pub use result::{LogicResult, ResultNode};
pub use value::{Concept, Datatype, Value};

/// Parse a date or date-time string into a `NaiveDateTime`.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM` and `YYYY-MM-DDTHH:MM:SS`
/// (a space may replace the `T`). Dates resolve to midnight.
pub fn parse_datetime(text: &str) -> Option<chrono::NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
