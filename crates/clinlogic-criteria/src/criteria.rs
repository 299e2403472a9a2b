//! Criteria expression tree and fluent builder

use crate::error::CriteriaError;
use chrono::{NaiveDateTime, NaiveTime};
use clinlogic_types::{Concept, Duration, Value};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a data source key or compiled rule token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenReference {
    /// Data source the key is scoped to (`@source key`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Key or token name
    pub key: String,
}

impl TokenReference {
    /// Create an unscoped reference
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            source: None,
            key: key.into(),
        }
    }

    /// Create a reference scoped to a data source
    pub fn scoped(source: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            key: key.into(),
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// Concept name or text substring membership
    Contains,
}

impl ComparisonOp {
    /// Method name used in the fluent form
    pub fn method_name(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "eq",
            ComparisonOp::NotEqual => "ne",
            ComparisonOp::Less => "lt",
            ComparisonOp::LessOrEqual => "lte",
            ComparisonOp::Greater => "gt",
            ComparisonOp::GreaterOrEqual => "gte",
            ComparisonOp::Contains => "contains",
        }
    }

    /// Whether the operator needs an ordering between values
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparisonOp::Less
                | ComparisonOp::LessOrEqual
                | ComparisonOp::Greater
                | ComparisonOp::GreaterOrEqual
        )
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Operand {
    Numeric(Decimal),
    Text(String),
    Boolean(bool),
    Coded(Concept),
    Datetime(NaiveDateTime),
}

impl From<Decimal> for Operand {
    fn from(n: Decimal) -> Self {
        Operand::Numeric(n)
    }
}

impl From<i32> for Operand {
    fn from(n: i32) -> Self {
        Operand::Numeric(Decimal::from(n))
    }
}

impl From<i64> for Operand {
    fn from(n: i64) -> Self {
        Operand::Numeric(Decimal::from(n))
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Text(s.to_string())
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::Text(s)
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Boolean(b)
    }
}

impl From<Concept> for Operand {
    fn from(c: Concept) -> Self {
        Operand::Coded(c)
    }
}

impl From<NaiveDateTime> for Operand {
    fn from(dt: NaiveDateTime) -> Self {
        Operand::Datetime(dt)
    }
}

impl From<Operand> for Value {
    fn from(operand: Operand) -> Self {
        match operand {
            Operand::Numeric(n) => Value::Numeric(n),
            Operand::Text(s) => Value::Text(s),
            Operand::Boolean(b) => Value::Boolean(b),
            Operand::Coded(c) => Value::Coded(c),
            Operand::Datetime(dt) => Value::Datetime(dt),
        }
    }
}

/// Aggregations over a patient's result chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// The `n` most recent nodes on or before the index date
    Last(usize),
    /// The `n` oldest nodes on or before the index date
    First(usize),
    Count,
    Average,
    Exists,
    NotExists,
    Distinct,
}

/// Direction of a `within` window relative to the index date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Past,
    Future,
}

/// A point in time used by temporal constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRef {
    Fixed(NaiveDateTime),
    /// The evaluation's index date (`TODAY` in expressions)
    IndexDate,
}

impl DateRef {
    /// Resolve against an index date
    pub fn resolve(self, index_date: NaiveDateTime) -> NaiveDateTime {
        match self {
            DateRef::Fixed(dt) => dt,
            DateRef::IndexDate => index_date,
        }
    }
}

impl From<NaiveDateTime> for DateRef {
    fn from(dt: NaiveDateTime) -> Self {
        DateRef::Fixed(dt)
    }
}

impl fmt::Display for DateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRef::Fixed(dt) => write_datetime(f, dt),
            DateRef::IndexDate => f.write_str("today"),
        }
    }
}

/// Temporal constraints; boundaries are inclusive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateConstraint {
    Within {
        direction: Direction,
        duration: Duration,
    },
    Before(DateRef),
    After(DateRef),
    /// Nodes on or before the date
    AsOf(DateRef),
}

/// Boolean combinators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

/// Immutable criteria expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicCriteria {
    Token(TokenReference),
    Comparison {
        source: Box<LogicCriteria>,
        op: ComparisonOp,
        operand: Operand,
    },
    Aggregation {
        source: Box<LogicCriteria>,
        function: Aggregate,
    },
    DateConstraint {
        source: Box<LogicCriteria>,
        constraint: DateConstraint,
    },
    Combination {
        op: BooleanOp,
        children: Vec<LogicCriteria>,
    },
}

impl LogicCriteria {
    /// Reference a key or token
    pub fn token(key: impl Into<String>) -> Self {
        LogicCriteria::Token(TokenReference::new(key))
    }

    /// Reference a key served by a specific data source
    pub fn scoped(source: impl Into<String>, key: impl Into<String>) -> Self {
        LogicCriteria::Token(TokenReference::scoped(source, key))
    }

    /// Parse a criteria expression
    pub fn parse(text: &str) -> Result<Self, CriteriaError> {
        crate::parser::parse(text)
    }

    // Filters sit beneath any aggregation so that trims apply to the
    // filtered chain.
    fn push_filter(self, wrap: impl FnOnce(Box<LogicCriteria>) -> LogicCriteria) -> LogicCriteria {
        match self {
            LogicCriteria::Aggregation { source, function } => LogicCriteria::Aggregation {
                source: Box::new(source.push_filter(wrap)),
                function,
            },
            other => wrap(Box::new(other)),
        }
    }

    pub(crate) fn compare(self, op: ComparisonOp, operand: Operand) -> Self {
        self.push_filter(|source| LogicCriteria::Comparison {
            source,
            op,
            operand,
        })
    }

    pub(crate) fn constrain(self, constraint: DateConstraint) -> Self {
        self.push_filter(|source| LogicCriteria::DateConstraint { source, constraint })
    }

    pub(crate) fn aggregate(self, function: Aggregate) -> Self {
        LogicCriteria::Aggregation {
            source: Box::new(self),
            function,
        }
    }

    pub fn equal_to(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Equal, operand.into())
    }

    pub fn not_equal_to(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::NotEqual, operand.into())
    }

    pub fn lt(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Less, operand.into())
    }

    pub fn lte(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::LessOrEqual, operand.into())
    }

    pub fn gt(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Greater, operand.into())
    }

    pub fn gte(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::GreaterOrEqual, operand.into())
    }

    pub fn contains(self, operand: impl Into<Operand>) -> Self {
        self.compare(ComparisonOp::Contains, operand.into())
    }

    /// Keep nodes dated within `duration` before the index date
    pub fn within(self, duration: Duration) -> Self {
        self.within_direction(Direction::Past, duration)
    }

    /// Keep nodes dated within `duration` after the index date
    pub fn within_future(self, duration: Duration) -> Self {
        self.within_direction(Direction::Future, duration)
    }

    pub fn within_direction(self, direction: Direction, duration: Duration) -> Self {
        self.constrain(DateConstraint::Within {
            direction,
            duration,
        })
    }

    pub fn before(self, date: impl Into<DateRef>) -> Self {
        self.constrain(DateConstraint::Before(date.into()))
    }

    pub fn after(self, date: impl Into<DateRef>) -> Self {
        self.constrain(DateConstraint::After(date.into()))
    }

    pub fn as_of(self, date: impl Into<DateRef>) -> Self {
        self.constrain(DateConstraint::AsOf(date.into()))
    }

    /// Keep nodes dated between `start` and `end`, both inclusive
    pub fn between(self, start: impl Into<DateRef>, end: impl Into<DateRef>) -> Self {
        self.after(start).before(end)
    }

    pub fn last(self) -> Self {
        self.last_n(1)
    }

    pub fn last_n(self, n: usize) -> Self {
        self.aggregate(Aggregate::Last(n))
    }

    pub fn first(self) -> Self {
        self.first_n(1)
    }

    pub fn first_n(self, n: usize) -> Self {
        self.aggregate(Aggregate::First(n))
    }

    pub fn count(self) -> Self {
        self.aggregate(Aggregate::Count)
    }

    pub fn average(self) -> Self {
        self.aggregate(Aggregate::Average)
    }

    pub fn exists(self) -> Self {
        self.aggregate(Aggregate::Exists)
    }

    pub fn not_exists(self) -> Self {
        self.aggregate(Aggregate::NotExists)
    }

    pub fn distinct(self) -> Self {
        self.aggregate(Aggregate::Distinct)
    }

    /// Combine with AND, flattening nested conjunctions
    pub fn and(self, other: LogicCriteria) -> Self {
        self.combine(BooleanOp::And, other)
    }

    /// Combine with OR, flattening nested disjunctions
    pub fn or(self, other: LogicCriteria) -> Self {
        self.combine(BooleanOp::Or, other)
    }

    /// Invert per-patient truthiness
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        LogicCriteria::Combination {
            op: BooleanOp::Not,
            children: vec![self],
        }
    }

    fn combine(self, op: BooleanOp, other: LogicCriteria) -> Self {
        match self {
            LogicCriteria::Combination {
                op: existing,
                mut children,
            } if existing == op => {
                children.push(other);
                LogicCriteria::Combination { op, children }
            }
            this => LogicCriteria::Combination {
                op,
                children: vec![this, other],
            },
        }
    }

    /// The left-most token the expression reads from
    pub fn root_token(&self) -> Option<&TokenReference> {
        match self {
            LogicCriteria::Token(token) => Some(token),
            LogicCriteria::Comparison { source, .. }
            | LogicCriteria::Aggregation { source, .. }
            | LogicCriteria::DateConstraint { source, .. } => source.root_token(),
            LogicCriteria::Combination { children, .. } => {
                children.iter().find_map(LogicCriteria::root_token)
            }
        }
    }

    /// Every token referenced by the expression, left to right
    pub fn tokens(&self) -> Vec<&TokenReference> {
        let mut tokens = Vec::new();
        self.collect_tokens(&mut tokens);
        tokens
    }

    fn collect_tokens<'a>(&'a self, tokens: &mut Vec<&'a TokenReference>) {
        match self {
            LogicCriteria::Token(token) => tokens.push(token),
            LogicCriteria::Comparison { source, .. }
            | LogicCriteria::Aggregation { source, .. }
            | LogicCriteria::DateConstraint { source, .. } => source.collect_tokens(tokens),
            LogicCriteria::Combination { children, .. } => {
                for child in children {
                    child.collect_tokens(tokens);
                }
            }
        }
    }

    /// Check the expression for structural defects
    pub fn validate(&self) -> Result<(), CriteriaError> {
        match self {
            LogicCriteria::Token(token) => {
                if token.key.trim().is_empty() {
                    return Err(CriteriaError::invalid(self.to_string(), "empty token"));
                }
                Ok(())
            }
            LogicCriteria::Comparison {
                source,
                op,
                operand,
            } => {
                source.validate()?;
                let rejected = match operand {
                    Operand::Coded(_) | Operand::Boolean(_) => op.is_ordering(),
                    Operand::Numeric(_) | Operand::Datetime(_) => *op == ComparisonOp::Contains,
                    Operand::Text(_) => false,
                };
                if rejected {
                    return Err(CriteriaError::invalid(
                        self.to_string(),
                        format!("'{}' cannot be applied to {}", op.method_name(), operand),
                    ));
                }
                Ok(())
            }
            LogicCriteria::Aggregation { source, function } => {
                source.validate()?;
                if matches!(function, Aggregate::Last(0) | Aggregate::First(0)) {
                    return Err(CriteriaError::invalid(
                        self.to_string(),
                        "trim length must be at least 1",
                    ));
                }
                Ok(())
            }
            LogicCriteria::DateConstraint { source, constraint } => {
                source.validate()?;
                if let DateConstraint::Within { duration, .. } = constraint {
                    if !duration.value.is_finite() || duration.value < 0.0 {
                        return Err(CriteriaError::invalid(
                            self.to_string(),
                            format!("invalid duration {duration}"),
                        ));
                    }
                    if !duration.is_representable() {
                        return Err(CriteriaError::invalid(
                            self.to_string(),
                            format!("duration {duration} is too long"),
                        ));
                    }
                }
                Ok(())
            }
            LogicCriteria::Combination { op, children } => {
                let arity_ok = match op {
                    BooleanOp::Not => children.len() == 1,
                    BooleanOp::And | BooleanOp::Or => !children.is_empty(),
                };
                if !arity_ok {
                    return Err(CriteriaError::invalid(
                        self.to_string(),
                        format!("wrong number of operands for {op:?}"),
                    ));
                }
                children.iter().try_for_each(LogicCriteria::validate)
            }
        }
    }
}

fn write_datetime(f: &mut fmt::Formatter<'_>, dt: &NaiveDateTime) -> fmt::Result {
    if dt.time() == NaiveTime::MIN {
        write!(f, "{}", dt.format("%Y-%m-%d"))
    } else {
        write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !["and", "or", "not"]
            .iter()
            .any(|reserved| key.eq_ignore_ascii_case(reserved))
}

impl fmt::Display for TokenReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "@{source} ")?;
        }
        if is_plain_key(&self.key) {
            f.write_str(&self.key)
        } else {
            write!(f, "\"{}\"", self.key)
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Numeric(n) => write!(f, "{}", n.normalize()),
            Operand::Text(s) => write!(f, "'{s}'"),
            Operand::Boolean(b) => write!(f, "{b}"),
            Operand::Coded(c) => write!(f, "'{}'", c.name),
            Operand::Datetime(dt) => write_datetime(f, dt),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Last(n) => write!(f, "last({n})"),
            Aggregate::First(n) => write!(f, "first({n})"),
            Aggregate::Count => f.write_str("count"),
            Aggregate::Average => f.write_str("average"),
            Aggregate::Exists => f.write_str("exists"),
            Aggregate::NotExists => f.write_str("not_exists"),
            Aggregate::Distinct => f.write_str("distinct"),
        }
    }
}

impl fmt::Display for DateConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateConstraint::Within {
                direction,
                duration,
            } => {
                let direction = match direction {
                    Direction::Past => "past",
                    Direction::Future => "future",
                };
                write!(
                    f,
                    "within.{direction}.{}({})",
                    duration.units, duration.value
                )
            }
            DateConstraint::Before(date) => write!(f, "before({date})"),
            DateConstraint::After(date) => write!(f, "after({date})"),
            DateConstraint::AsOf(date) => write!(f, "as_of({date})"),
        }
    }
}

impl fmt::Display for LogicCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicCriteria::Token(token) => write!(f, "{token}"),
            LogicCriteria::Comparison {
                source,
                op,
                operand,
            } => write!(f, "{source}.{}({operand})", op.method_name()),
            LogicCriteria::Aggregation { source, function } => write!(f, "{source}.{function}"),
            LogicCriteria::DateConstraint { source, constraint } => {
                write!(f, "{source}.{constraint}")
            }
            LogicCriteria::Combination { op, children } => {
                if *op == BooleanOp::Not {
                    let child = children.first().map(ToString::to_string).unwrap_or_default();
                    return write!(f, "(NOT {child})");
                }
                let joiner = if *op == BooleanOp::And { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(joiner))
            }
        }
    }
}
