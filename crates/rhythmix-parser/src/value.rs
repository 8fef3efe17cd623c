//! Duration literals: `100ms`, `5s`, `2m`, `1h`, `3d`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Unit of a [`Duration`] literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "ms" => Some(TimeUnit::Millisecond),
            "s" => Some(TimeUnit::Second),
            "m" => Some(TimeUnit::Minute),
            "h" => Some(TimeUnit::Hour),
            "d" => Some(TimeUnit::Day),
            _ => None,
        }
    }

    /// Milliseconds per unit.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Millisecond => "ms",
            TimeUnit::Second => "s",
            TimeUnit::Minute => "m",
            TimeUnit::Hour => "h",
            TimeUnit::Day => "d",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("unsupported time unit '{unit}' in '{original}'")]
    UnsupportedUnit { unit: String, original: String },

    #[error("invalid duration '{0}'")]
    Malformed(String),
}

/// A parsed duration literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duration {
    pub amount: f64,
    pub unit: TimeUnit,
    /// Equivalent length in milliseconds, rounded to the nearest millisecond.
    pub millis: i64,
    /// Original source text.
    pub original: String,
}

impl Duration {
    /// Parse the text of a duration token like `"50ms"` or `"1.5s"`.
    pub fn parse(s: &str) -> Result<Self, DurationError> {
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| DurationError::Malformed(s.to_string()))?;
        let (amount_str, unit_str) = s.split_at(split);
        let amount: f64 = amount_str
            .parse()
            .map_err(|_| DurationError::Malformed(s.to_string()))?;
        let unit = TimeUnit::from_suffix(unit_str).ok_or_else(|| DurationError::UnsupportedUnit {
            unit: unit_str.to_string(),
            original: s.to_string(),
        })?;

        Ok(Duration {
            amount,
            unit,
            millis: (amount * unit.millis() as f64).round() as i64,
            original: s.to_string(),
        })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
