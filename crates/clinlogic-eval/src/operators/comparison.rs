//! Comparison operators (=, !=, <, <=, >, >=, contains)

use clinlogic_criteria::{ComparisonOp, Operand};
use clinlogic_types::{Concept, LogicResult, Value, parse_datetime};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

fn mismatch(value: &Value, operand: &Operand) -> String {
    format!(
        "cannot compare {} value '{}' with {}",
        value.datatype(),
        value,
        operand
    )
}

fn equality(op: ComparisonOp, equal: bool, kind: &str) -> Result<bool, String> {
    match op {
        ComparisonOp::Equal | ComparisonOp::Contains => Ok(equal),
        ComparisonOp::NotEqual => Ok(!equal),
        other => Err(format!(
            "'{}' is not defined for {kind} values",
            other.method_name()
        )),
    }
}

fn coded(concept: &Concept, op: ComparisonOp, operand: &Operand) -> Result<bool, String> {
    let equal = match operand {
        Operand::Coded(other) => other.id == concept.id,
        Operand::Text(name) => concept.is_named(name),
        other => {
            return Err(mismatch(&Value::Coded(concept.clone()), other));
        }
    };
    equality(op, equal, "coded")
}

fn ordering(value: &Value, operand: &Operand) -> Result<Ordering, String> {
    match (value, operand) {
        (Value::Numeric(n), Operand::Numeric(m)) => Ok(n.cmp(m)),
        (Value::Numeric(n), Operand::Text(s)) => Decimal::from_str(s.trim())
            .map(|m| n.cmp(&m))
            .map_err(|_| mismatch(value, operand)),
        (Value::Text(t), Operand::Numeric(m)) => Decimal::from_str(t.trim())
            .map(|n| n.cmp(m))
            .map_err(|_| mismatch(value, operand)),
        (Value::Text(t), Operand::Text(s)) => Ok(t.to_lowercase().cmp(&s.to_lowercase())),
        (Value::Datetime(d), Operand::Datetime(e)) => Ok(d.cmp(e)),
        (Value::Datetime(d), Operand::Text(s)) => parse_datetime(s)
            .map(|e| d.cmp(&e))
            .ok_or_else(|| mismatch(value, operand)),
        _ => Err(mismatch(value, operand)),
    }
}

/// Compare one value against an operand.
///
/// Text compares case-insensitively; coded values match by concept id or
/// name; `contains` is substring membership for text and name membership for
/// coded values.
pub fn compare(value: &Value, op: ComparisonOp, operand: &Operand) -> Result<bool, String> {
    match (value, operand) {
        (Value::Coded(concept), _) => coded(concept, op, operand),
        (Value::Boolean(b), Operand::Boolean(expected)) => equality(op, b == expected, "boolean"),
        (_, _) if op == ComparisonOp::Contains => match (value, operand) {
            (Value::Text(text), Operand::Text(needle)) => Ok(text
                .to_lowercase()
                .contains(&needle.to_lowercase())),
            _ => Err(mismatch(value, operand)),
        },
        _ => {
            let ord = ordering(value, operand)?;
            Ok(match op {
                ComparisonOp::Equal => ord == Ordering::Equal,
                ComparisonOp::NotEqual => ord != Ordering::Equal,
                ComparisonOp::Less => ord == Ordering::Less,
                ComparisonOp::LessOrEqual => ord != Ordering::Greater,
                ComparisonOp::Greater => ord == Ordering::Greater,
                ComparisonOp::GreaterOrEqual => ord != Ordering::Less,
                ComparisonOp::Contains => false,
            })
        }
    }
}

/// Keep the nodes that satisfy the comparison
pub fn filter(result: &LogicResult, op: ComparisonOp, operand: &Operand) -> Result<LogicResult, String> {
    let mut kept = Vec::new();
    for node in result {
        if compare(&node.value, op, operand)? {
            kept.push(node.clone());
        }
    }
    Ok(LogicResult::from_nodes(kept))
}
