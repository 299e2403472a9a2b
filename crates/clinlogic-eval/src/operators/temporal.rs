//! Date window constraints
//!
//! Every bound is inclusive and nodes without a date never satisfy a window.

use chrono::NaiveDateTime;
use clinlogic_criteria::{DateConstraint, Direction};
use clinlogic_types::LogicResult;

/// Inclusive window `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl Window {
    pub fn contains(&self, date: NaiveDateTime) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Resolve a constraint to a concrete window
pub fn window(constraint: &DateConstraint, index_date: NaiveDateTime) -> Result<Window, String> {
    Ok(match *constraint {
        DateConstraint::Within {
            direction,
            duration,
        } => {
            let overflow = || format!("window of {duration} overflows the calendar");
            let span = duration.to_chrono().ok_or_else(overflow)?;
            match direction {
                Direction::Past => Window {
                    start: Some(index_date.checked_sub_signed(span).ok_or_else(overflow)?),
                    end: Some(index_date),
                },
                Direction::Future => Window {
                    start: Some(index_date),
                    end: Some(index_date.checked_add_signed(span).ok_or_else(overflow)?),
                },
            }
        }
        DateConstraint::Before(date) | DateConstraint::AsOf(date) => Window {
            start: None,
            end: Some(date.resolve(index_date)),
        },
        DateConstraint::After(date) => Window {
            start: Some(date.resolve(index_date)),
            end: None,
        },
    })
}

/// Keep the nodes dated inside the constraint's window
pub fn apply(
    result: &LogicResult,
    constraint: &DateConstraint,
    index_date: NaiveDateTime,
) -> Result<LogicResult, String> {
    let window = window(constraint, index_date)?;
    Ok(result.filter(|node| node.date.is_some_and(|date| window.contains(date))))
}
