//! Clinical durations used by `within` constraints

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Longest representable duration in milliseconds, roughly 3170 years
pub const MAX_MILLIS: f64 = 1.0e14;

/// Units a duration can be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnits {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnits {
    /// Length of one unit in days (a month is 30 days, a year 365)
    pub fn days(self) -> f64 {
        match self {
            DurationUnits::Seconds => 1.0 / 86_400.0,
            DurationUnits::Minutes => 1.0 / 1_440.0,
            DurationUnits::Hours => 1.0 / 24.0,
            DurationUnits::Days => 1.0,
            DurationUnits::Weeks => 7.0,
            DurationUnits::Months => 30.0,
            DurationUnits::Years => 365.0,
        }
    }

    /// Lower-case unit name as written in expressions
    pub fn name(self) -> &'static str {
        match self {
            DurationUnits::Seconds => "seconds",
            DurationUnits::Minutes => "minutes",
            DurationUnits::Hours => "hours",
            DurationUnits::Days => "days",
            DurationUnits::Weeks => "weeks",
            DurationUnits::Months => "months",
            DurationUnits::Years => "years",
        }
    }
}

impl FromStr for DurationUnits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let unit = match lower.trim_end_matches('s') {
            "second" => DurationUnits::Seconds,
            "minute" => DurationUnits::Minutes,
            "hour" => DurationUnits::Hours,
            "day" => DurationUnits::Days,
            "week" => DurationUnits::Weeks,
            "month" => DurationUnits::Months,
            "year" => DurationUnits::Years,
            _ => return Err(format!("unknown duration unit '{s}'")),
        };
        Ok(unit)
    }
}

impl fmt::Display for DurationUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A length of time expressed in clinical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    /// Magnitude in `units`
    pub value: f64,
    /// Unit of `value`
    pub units: DurationUnits,
}

impl Duration {
    /// Create a duration
    pub fn new(value: f64, units: DurationUnits) -> Self {
        Self { value, units }
    }

    pub fn seconds(value: f64) -> Self {
        Self::new(value, DurationUnits::Seconds)
    }

    pub fn minutes(value: f64) -> Self {
        Self::new(value, DurationUnits::Minutes)
    }

    pub fn hours(value: f64) -> Self {
        Self::new(value, DurationUnits::Hours)
    }

    pub fn days(value: f64) -> Self {
        Self::new(value, DurationUnits::Days)
    }

    pub fn weeks(value: f64) -> Self {
        Self::new(value, DurationUnits::Weeks)
    }

    pub fn months(value: f64) -> Self {
        Self::new(value, DurationUnits::Months)
    }

    pub fn years(value: f64) -> Self {
        Self::new(value, DurationUnits::Years)
    }

    /// Length in days
    pub fn in_days(&self) -> f64 {
        self.value * self.units.days()
    }

    /// Length in milliseconds
    pub fn in_millis(&self) -> f64 {
        self.in_days() * MILLIS_PER_DAY
    }

    /// Whether the duration converts to a chrono duration
    pub fn is_representable(&self) -> bool {
        let millis = self.in_millis().round();
        millis.is_finite() && millis.abs() <= MAX_MILLIS
    }

    /// Convert to a chrono duration, rounded to the millisecond.
    ///
    /// `None` when the length is not finite or exceeds `MAX_MILLIS`.
    pub fn to_chrono(&self) -> Option<chrono::Duration> {
        self.is_representable()
            .then(|| chrono::Duration::milliseconds(self.in_millis().round() as i64))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.units, self.value)
    }
}
