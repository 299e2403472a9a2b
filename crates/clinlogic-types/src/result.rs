//! Result chains
//!
//! A `LogicResult` is an ordered chain of findings for one patient and token.
//! It may be empty (no data), hold a single finding, or hold many repeated
//! findings. Results are plain values: every operation returns a new chain and
//! leaves its inputs untouched.
//!
//! Chronology: dated nodes order by date, and nodes without a date order after
//! every dated node. Sorting is stable, so equal dates keep chain order.

use crate::error::CoercionError;
use crate::value::{Concept, Datatype, Value};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// One finding in a result chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultNode {
    /// When the finding was recorded
    pub date: Option<NaiveDateTime>,
    /// The finding's value
    pub value: Value,
    /// Data source key the finding came from
    pub source_key: Option<String>,
}

impl ResultNode {
    /// Create an undated node
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            date: None,
            value: value.into(),
            source_key: None,
        }
    }

    /// Create a dated node
    pub fn dated(date: NaiveDateTime, value: impl Into<Value>) -> Self {
        Self::new(value).with_date(date)
    }

    /// Set the date
    pub fn with_date(mut self, date: NaiveDateTime) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the source key
    pub fn with_source(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    /// Datatype of the value
    pub fn datatype(&self) -> Datatype {
        self.value.datatype()
    }
}

/// Chronological ordering: dated nodes first by date, undated last.
fn chronological(a: &ResultNode, b: &ResultNode) -> Ordering {
    match (a.date, b.date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A chain of findings for one patient and token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicResult {
    nodes: Vec<ResultNode>,
}

impl LogicResult {
    /// Create an empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a result holding one node
    pub fn from_node(node: ResultNode) -> Self {
        Self { nodes: vec![node] }
    }

    /// Create a result from nodes, keeping their order
    pub fn from_nodes(nodes: Vec<ResultNode>) -> Self {
        Self { nodes }
    }

    /// Create a single undated result from a value
    pub fn of(value: impl Into<Value>) -> Self {
        Self::from_node(ResultNode::new(value))
    }

    /// True only for a chain with zero nodes.
    ///
    /// A chain holding `false` or `0` is not empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Borrow the nodes in chain order
    pub fn nodes(&self) -> &[ResultNode] {
        &self.nodes
    }

    /// Iterate nodes in chain order
    pub fn iter(&self) -> std::slice::Iter<'_, ResultNode> {
        self.nodes.iter()
    }

    /// Consume into the node list
    pub fn into_nodes(self) -> Vec<ResultNode> {
        self.nodes
    }

    /// The node at `index` as a result (empty when out of range)
    pub fn get(&self, index: usize) -> LogicResult {
        self.nodes
            .get(index)
            .cloned()
            .map(Self::from_node)
            .unwrap_or_default()
    }

    /// First node in chain order
    pub fn first_node(&self) -> Option<&ResultNode> {
        self.nodes.first()
    }

    /// Append `other`'s nodes, returning a new chain.
    ///
    /// When every node of both chains carries a date the combined chain is
    /// put in chronological order; otherwise nodes are simply concatenated.
    pub fn add(&self, other: &LogicResult) -> LogicResult {
        let mut nodes = Vec::with_capacity(self.nodes.len() + other.nodes.len());
        nodes.extend(self.nodes.iter().cloned());
        nodes.extend(other.nodes.iter().cloned());
        if nodes.iter().all(|n| n.date.is_some()) {
            nodes.sort_by(chronological);
        }
        Self { nodes }
    }

    /// Nodes in chronological order, undated nodes last
    pub fn sorted(&self) -> LogicResult {
        let mut nodes = self.nodes.clone();
        nodes.sort_by(chronological);
        Self { nodes }
    }

    /// The most recent dated node, or the first node when none is dated
    pub fn latest(&self) -> LogicResult {
        let mut best: Option<&ResultNode> = None;
        for node in self.nodes.iter().filter(|n| n.date.is_some()) {
            match best {
                Some(b) if b.date >= node.date => {}
                _ => best = Some(node),
            }
        }
        best.or_else(|| self.nodes.first())
            .cloned()
            .map(Self::from_node)
            .unwrap_or_default()
    }

    /// The oldest dated node, or the first node when none is dated
    pub fn earliest(&self) -> LogicResult {
        let mut best: Option<&ResultNode> = None;
        for node in self.nodes.iter().filter(|n| n.date.is_some()) {
            match best {
                Some(b) if b.date <= node.date => {}
                _ => best = Some(node),
            }
        }
        best.or_else(|| self.nodes.first())
            .cloned()
            .map(Self::from_node)
            .unwrap_or_default()
    }

    /// Nodes a trim operates on: the dated nodes in chronological order, or the
    /// whole chain when nothing is dated.
    fn trimmable(&self) -> Vec<ResultNode> {
        let sorted = self.sorted().nodes;
        if sorted.iter().any(|n| n.date.is_some()) {
            sorted.into_iter().filter(|n| n.date.is_some()).collect()
        } else {
            sorted
        }
    }

    /// The `n` earliest nodes in chronological order
    pub fn first_n(&self, n: usize) -> LogicResult {
        let nodes = self.trimmable().into_iter().take(n).collect();
        Self { nodes }
    }

    /// The `n` most recent nodes in chronological order
    pub fn last_n(&self, n: usize) -> LogicResult {
        let mut nodes = self.trimmable();
        let skip = nodes.len().saturating_sub(n);
        nodes.drain(..skip);
        Self { nodes }
    }

    /// Keep the nodes matching `predicate`
    pub fn filter(&self, mut predicate: impl FnMut(&ResultNode) -> bool) -> LogicResult {
        Self {
            nodes: self.nodes.iter().filter(|n| predicate(n)).cloned().collect(),
        }
    }

    /// Drop repeated values, keeping the first occurrence of each
    pub fn unique(&self) -> LogicResult {
        let mut seen: Vec<&Value> = Vec::new();
        let mut nodes = Vec::new();
        for node in &self.nodes {
            if !seen.contains(&&node.value) {
                seen.push(&node.value);
                nodes.push(node.clone());
            }
        }
        Self { nodes }
    }

    /// Datatype of the first node
    pub fn datatype(&self) -> Option<Datatype> {
        self.nodes.first().map(ResultNode::datatype)
    }

    /// Date of the first node
    pub fn result_date(&self) -> Option<NaiveDateTime> {
        self.nodes.first().and_then(|n| n.date)
    }

    /// Whether any node holds a present value
    pub fn exists(&self) -> bool {
        self.nodes.iter().any(|n| n.value.is_present())
    }

    /// Whether any node holds the given coded concept
    pub fn contains_concept(&self, concept_id: i64) -> bool {
        self.nodes
            .iter()
            .any(|n| n.value.as_concept().is_some_and(|c| c.id == concept_id))
    }

    fn first_value(&self, to: &'static str) -> Result<&Value, CoercionError> {
        self.nodes
            .first()
            .map(|n| &n.value)
            .ok_or_else(|| CoercionError::empty(to))
    }

    /// Read the first node as a number
    pub fn to_number(&self) -> Result<Decimal, CoercionError> {
        let value = self.first_value("number")?;
        match value {
            Value::Numeric(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Value::Text(s) => Decimal::from_str(s.trim())
                .map_err(|_| CoercionError::mismatch(Datatype::Text, "number", s.clone())),
            other => Err(CoercionError::mismatch(other.datatype(), "number", other.to_string())),
        }
    }

    /// Read the first node as a boolean
    pub fn to_boolean(&self) -> Result<bool, CoercionError> {
        let value = self.first_value("boolean")?;
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::Numeric(n) => Ok(!n.is_zero()),
            Value::Text(s) if s.trim().eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(s) if s.trim().eq_ignore_ascii_case("false") => Ok(false),
            other => Err(CoercionError::mismatch(other.datatype(), "boolean", other.to_string())),
        }
    }

    /// Render the first node as text
    pub fn to_text(&self) -> Result<String, CoercionError> {
        self.first_value("text").map(Value::to_string)
    }

    /// Read the first node as a date-time
    pub fn to_datetime(&self) -> Result<NaiveDateTime, CoercionError> {
        let value = self.first_value("datetime")?;
        match value {
            Value::Datetime(dt) => Ok(*dt),
            Value::Text(s) => crate::parse_datetime(s)
                .ok_or_else(|| CoercionError::mismatch(Datatype::Text, "datetime", s.clone())),
            other => Err(CoercionError::mismatch(other.datatype(), "datetime", other.to_string())),
        }
    }

    /// Read the first node as a coded concept
    pub fn to_concept(&self) -> Result<Concept, CoercionError> {
        let value = self.first_value("concept")?;
        match value {
            Value::Coded(c) => Ok(c.clone()),
            other => Err(CoercionError::mismatch(other.datatype(), "concept", other.to_string())),
        }
    }
}

impl From<ResultNode> for LogicResult {
    fn from(node: ResultNode) -> Self {
        Self::from_node(node)
    }
}

impl FromIterator<ResultNode> for LogicResult {
    fn from_iter<T: IntoIterator<Item = ResultNode>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for LogicResult {
    type Item = ResultNode;
    type IntoIter = std::vec::IntoIter<ResultNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a LogicResult {
    type Item = &'a ResultNode;
    type IntoIter = std::slice::Iter<'a, ResultNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl fmt::Display for LogicResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", node.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn num(date: NaiveDateTime, n: i64) -> ResultNode {
        ResultNode::dated(date, n)
    }

    #[test]
    fn test_empty_is_distinct_from_false() {
        assert!(LogicResult::empty().is_empty());
        assert!(!LogicResult::of(false).is_empty());
        assert!(!LogicResult::of(0).is_empty());
        assert!(!LogicResult::of(false).exists());
    }

    #[test]
    fn test_latest_and_earliest() {
        let r = LogicResult::from_nodes(vec![
            num(day(2024, 3, 1), 2),
            ResultNode::new(9),
            num(day(2024, 5, 1), 3),
            num(day(2024, 1, 1), 1),
        ]);
        assert_eq!(r.latest().to_number().unwrap(), Decimal::from(3));
        assert_eq!(r.earliest().to_number().unwrap(), Decimal::from(1));
        assert!(LogicResult::empty().latest().is_empty());
        assert!(LogicResult::empty().earliest().is_empty());
    }

    #[test]
    fn test_latest_ties_keep_first() {
        let r = LogicResult::from_nodes(vec![num(day(2024, 1, 1), 1), num(day(2024, 1, 1), 2)]);
        assert_eq!(r.latest().to_number().unwrap(), Decimal::from(1));
        assert_eq!(r.earliest().to_number().unwrap(), Decimal::from(1));
    }

    #[test]
    fn test_add_orders_dated_chains() {
        let a = LogicResult::from_node(num(day(2024, 5, 1), 5));
        let b = LogicResult::from_node(num(day(2024, 1, 1), 1));
        let merged = a.add(&b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.nodes()[0].date, Some(day(2024, 1, 1)));
        // inputs untouched
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_add_concatenates_undated() {
        let a = LogicResult::of(1);
        let b = LogicResult::from_node(num(day(2020, 1, 1), 2));
        let merged = a.add(&b);
        assert_eq!(merged.nodes()[0].value, Value::from(1));
    }

    #[test]
    fn test_trims() {
        let r = LogicResult::from_nodes(vec![
            num(day(2024, 3, 1), 3),
            num(day(2024, 1, 1), 1),
            ResultNode::new(0),
            num(day(2024, 2, 1), 2),
        ]);
        let last = r.last_n(2);
        assert_eq!(last.len(), 2);
        assert_eq!(last.nodes()[0].date, Some(day(2024, 2, 1)));
        assert_eq!(last.nodes()[1].date, Some(day(2024, 3, 1)));
        let first = r.first_n(1);
        assert_eq!(first.to_number().unwrap(), Decimal::from(1));
        assert_eq!(r.last_n(10).len(), 3);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(LogicResult::of(true).to_number().unwrap(), Decimal::ONE);
        assert_eq!(LogicResult::of(" 12.5 ").to_number().unwrap(), Decimal::new(125, 1));
        assert!(LogicResult::of("abc").to_number().is_err());
        assert!(LogicResult::of(Concept::new(1, "YES")).to_number().is_err());
        assert!(LogicResult::of(5).to_boolean().unwrap());
        assert!(!LogicResult::of("FALSE").to_boolean().unwrap());
        assert_eq!(
            LogicResult::of(Concept::new(1, "YES")).to_text().unwrap(),
            "YES"
        );
        assert_eq!(
            LogicResult::of("2024-01-01").to_datetime().unwrap(),
            day(2024, 1, 1)
        );
        assert_eq!(
            LogicResult::empty().to_number(),
            Err(CoercionError::empty("number"))
        );
    }

    #[test]
    fn test_unique_and_display() {
        let r = LogicResult::from_nodes(vec![
            ResultNode::new("a"),
            ResultNode::new("b"),
            ResultNode::new("a"),
        ]);
        assert_eq!(r.unique().len(), 2);
        assert_eq!(r.to_string(), "a,b,a");
        assert_eq!(LogicResult::empty().to_string(), "");
    }

    #[test]
    fn test_contains_concept() {
        let r = LogicResult::from_nodes(vec![
            ResultNode::new(Concept::new(7, "HIV")),
            ResultNode::new(3),
        ]);
        assert!(r.contains_concept(7));
        assert!(!r.contains_concept(8));
        assert_eq!(r.datatype(), Some(Datatype::Coded));
    }
}
