//! Dashboard data types.

use serde::{Deserialize, Serialize};

/// Direction of a day-over-day change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Today is at or above yesterday.
    Up,
    /// Today is below yesterday.
    Down,
}

impl TrendDirection {
    /// Returns the string representation of the direction.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Day-over-day change for a single metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    /// Direction of the change.
    pub direction: TrendDirection,
    /// Absolute difference between today and yesterday.
    pub value: u64,
}

/// Trend for a metric that counted `today` events today and `yesterday`
/// events the day before.
///
/// A flat day reports upward with a value of zero, so the dashboard
/// never shows a zero decline.
#[must_use]
pub fn trend(today: u64, yesterday: u64) -> Trend {
    if today >= yesterday {
        Trend {
            direction: TrendDirection::Up,
            value: today - yesterday,
        }
    } else {
        Trend {
            direction: TrendDirection::Down,
            value: yesterday - today,
        }
    }
}

/// A headline total paired with its day-over-day trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    /// Current total.
    pub total: u64,
    /// Change versus the previous day.
    pub trend: Trend,
}

impl StatSnapshot {
    /// Builds a snapshot from a total and its daily counts.
    #[must_use]
    pub fn new(total: u64, today: u64, yesterday: u64) -> Self {
        Self {
            total,
            trend: trend(today, yesterday),
        }
    }
}

/// Raw totals behind the dashboard headline numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    /// Registered member accounts.
    pub users: u64,
    /// Titles in the catalog.
    pub books: u64,
    /// Loans currently out.
    pub active_loans: u64,
}
