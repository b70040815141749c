//! Loan status and lifecycle rules.
//!
//! A loan is created `Active` and transitions to exactly one of the
//! returned statuses exactly once:
//! - Active → Returned (returned on or before the due date)
//! - Active → ReturnedLate (returned after the due date)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lending::error::LendingError;

/// Fixed loan period applied to every borrow.
pub const LOAN_PERIOD_DAYS: i64 = 7;

/// Status of a borrow record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// The item is out with the borrower.
    Active,
    /// Returned on or before the due date.
    Returned,
    /// Returned after the due date.
    ReturnedLate,
}

impl LoanStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Returned => "returned",
            Self::ReturnedLate => "returned_late",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "returned" => Some(Self::Returned),
            "returned_late" => Some(Self::ReturnedLate),
            _ => None,
        }
    }

    /// Returns true if the loan has been returned, on time or late.
    #[must_use]
    pub fn is_returned(&self) -> bool {
        matches!(self, Self::Returned | Self::ReturnedLate)
    }

    /// Returns true if the item is still out.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Due date for a loan taken out at `borrowed_at`.
#[must_use]
pub fn due_date(borrowed_at: DateTime<Utc>) -> DateTime<Utc> {
    borrowed_at + Duration::days(LOAN_PERIOD_DAYS)
}

/// Terminal status for a return processed at `returned_at`.
///
/// Lateness is decided at day granularity: returning any time on the due
/// date itself still counts as on time.
#[must_use]
pub fn return_status(due: DateTime<Utc>, returned_at: DateTime<Utc>) -> LoanStatus {
    if returned_at.date_naive() > due.date_naive() {
        LoanStatus::ReturnedLate
    } else {
        LoanStatus::Returned
    }
}

/// Validates and decides the return transition for a loan.
///
/// # Errors
///
/// Returns `LendingError::AlreadyReturned` if the loan has already been
/// returned; re-marking a returned loan is a caller error, never silently
/// ignored.
pub fn return_transition(
    current: LoanStatus,
    due: DateTime<Utc>,
    returned_at: DateTime<Utc>,
) -> Result<LoanStatus, LendingError> {
    if current.is_returned() {
        return Err(LendingError::AlreadyReturned { status: current });
    }
    Ok(return_status(due, returned_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(LoanStatus::Active.as_str(), "active");
        assert_eq!(LoanStatus::Returned.as_str(), "returned");
        assert_eq!(LoanStatus::ReturnedLate.as_str(), "returned_late");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(LoanStatus::parse("active"), Some(LoanStatus::Active));
        assert_eq!(LoanStatus::parse("RETURNED"), Some(LoanStatus::Returned));
        assert_eq!(
            LoanStatus::parse("Returned_Late"),
            Some(LoanStatus::ReturnedLate)
        );
        assert_eq!(LoanStatus::parse("borrowed"), None);
    }

    #[test]
    fn returned_check_covers_both_terminal_statuses() {
        assert!(!LoanStatus::Active.is_returned());
        assert!(LoanStatus::Returned.is_returned());
        assert!(LoanStatus::ReturnedLate.is_returned());
    }

    #[test]
    fn due_date_is_seven_days_out() {
        let borrowed = at(2026, 3, 1, 10);
        assert_eq!(due_date(borrowed), at(2026, 3, 8, 10));
    }

    #[test]
    fn return_on_due_date_is_on_time() {
        let due = at(2026, 3, 8, 10);
        // Later the same day, but still the due date.
        assert_eq!(return_status(due, at(2026, 3, 8, 23)), LoanStatus::Returned);
        assert_eq!(return_status(due, at(2026, 3, 5, 9)), LoanStatus::Returned);
    }

    #[test]
    fn return_after_due_date_is_late() {
        let due = at(2026, 3, 8, 10);
        assert_eq!(
            return_status(due, at(2026, 3, 9, 0)),
            LoanStatus::ReturnedLate
        );
    }

    #[test]
    fn returning_an_active_loan_succeeds() {
        let due = at(2026, 3, 8, 10);
        let status = return_transition(LoanStatus::Active, due, at(2026, 3, 10, 0)).unwrap();
        assert_eq!(status, LoanStatus::ReturnedLate);
    }

    #[test]
    fn returning_twice_is_an_error() {
        let due = at(2026, 3, 8, 10);
        let err = return_transition(LoanStatus::Returned, due, at(2026, 3, 9, 0)).unwrap_err();
        assert!(matches!(
            err,
            LendingError::AlreadyReturned {
                status: LoanStatus::Returned
            }
        ));

        let err = return_transition(LoanStatus::ReturnedLate, due, at(2026, 3, 9, 0)).unwrap_err();
        assert!(matches!(err, LendingError::AlreadyReturned { .. }));
    }
}
