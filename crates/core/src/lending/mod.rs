//! Lending domain rules.
//!
//! Loan statuses, due-date math, and the decision rules applied by the
//! borrow and return transactions. The transactions themselves live in the
//! database layer; everything here is pure.

pub mod error;
pub mod types;

pub use error::LendingError;
pub use types::{LOAN_PERIOD_DAYS, LoanStatus, due_date, return_status, return_transition};
