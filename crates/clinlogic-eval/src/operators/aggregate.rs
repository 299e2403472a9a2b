//! Aggregations over one patient's chain

use chrono::NaiveDateTime;
use clinlogic_criteria::Aggregate;
use clinlogic_types::{LogicResult, Value};
use rust_decimal::Decimal;

// Aggregations never look past the index date.
fn on_or_before(result: &LogicResult, index_date: NaiveDateTime) -> LogicResult {
    result.filter(|node| node.date.is_none_or(|date| date <= index_date))
}

/// Arithmetic mean of a numeric chain; empty in, empty out
pub fn average(result: &LogicResult) -> Result<LogicResult, String> {
    if result.is_empty() {
        return Ok(LogicResult::empty());
    }
    let mut total = Decimal::ZERO;
    for node in result {
        let Value::Numeric(n) = node.value else {
            return Err(format!(
                "average needs numeric values, found {} '{}'",
                node.value.datatype(),
                node.value
            ));
        };
        total = total
            .checked_add(n)
            .ok_or_else(|| "average overflowed".to_string())?;
    }
    let mean = total
        .checked_div(Decimal::from(result.len()))
        .ok_or_else(|| "average overflowed".to_string())?;
    Ok(LogicResult::of(mean))
}

/// Apply an aggregation to one patient's chain
pub fn apply(
    result: &LogicResult,
    function: Aggregate,
    index_date: NaiveDateTime,
) -> Result<LogicResult, String> {
    let past = on_or_before(result, index_date);
    Ok(match function {
        Aggregate::Last(n) => past.last_n(n),
        Aggregate::First(n) => past.first_n(n),
        Aggregate::Count => LogicResult::of(Decimal::from(past.len())),
        Aggregate::Average => average(&past)?,
        Aggregate::Exists => LogicResult::of(!past.is_empty()),
        Aggregate::NotExists => LogicResult::of(past.is_empty()),
        Aggregate::Distinct => past.unique(),
    })
}

/// Whether the aggregation answers for patients with no data
pub fn answers_for_absent(function: Aggregate) -> bool {
    matches!(
        function,
        Aggregate::Count | Aggregate::Exists | Aggregate::NotExists
    )
}
