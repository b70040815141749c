//! Lending error types.

use thiserror::Error;
use uuid::Uuid;

use crate::lending::types::LoanStatus;

/// Errors produced by borrow and return operations.
#[derive(Debug, Error)]
pub enum LendingError {
    /// The borrower's account is not approved for lending.
    #[error("account is not eligible to borrow")]
    NotEligible,

    /// Borrower not found.
    #[error("borrower not found: {0}")]
    BorrowerNotFound(Uuid),

    /// Book not found.
    #[error("book not found: {0}")]
    BookNotFound(Uuid),

    /// No copies of the book are available.
    #[error("no copies available for book: {0}")]
    Unavailable(Uuid),

    /// Loan not found.
    #[error("loan not found: {0}")]
    LoanNotFound(Uuid),

    /// The loan has already been returned.
    #[error("loan already returned with status: {status}")]
    AlreadyReturned {
        /// Status the loan already holds.
        status: LoanStatus,
    },

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),
}

impl LendingError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotEligible => 403,
            Self::BorrowerNotFound(_) | Self::BookNotFound(_) | Self::LoanNotFound(_) => 404,
            Self::Unavailable(_) | Self::AlreadyReturned { .. } => 409,
            Self::Database(_) => 500,
        }
    }

    /// Returns the error code string for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotEligible => "NOT_ELIGIBLE",
            Self::BorrowerNotFound(_) => "BORROWER_NOT_FOUND",
            Self::BookNotFound(_) => "BOOK_NOT_FOUND",
            Self::Unavailable(_) => "ITEM_UNAVAILABLE",
            Self::LoanNotFound(_) => "LOAN_NOT_FOUND",
            Self::AlreadyReturned { .. } => "ALREADY_RETURNED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(LendingError::NotEligible.status_code(), 403);
        assert_eq!(LendingError::BorrowerNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(LendingError::BookNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(LendingError::Unavailable(Uuid::nil()).status_code(), 409);
        assert_eq!(LendingError::LoanNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(
            LendingError::AlreadyReturned {
                status: LoanStatus::Returned
            }
            .status_code(),
            409
        );
        assert_eq!(LendingError::Database("conn".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LendingError::NotEligible.error_code(), "NOT_ELIGIBLE");
        assert_eq!(
            LendingError::Unavailable(Uuid::nil()).error_code(),
            "ITEM_UNAVAILABLE"
        );
        assert_eq!(
            LendingError::AlreadyReturned {
                status: LoanStatus::ReturnedLate
            }
            .error_code(),
            "ALREADY_RETURNED"
        );
    }

    #[test]
    fn test_error_messages() {
        let err = LendingError::AlreadyReturned {
            status: LoanStatus::Returned,
        };
        assert_eq!(err.to_string(), "loan already returned with status: returned");
    }
}
