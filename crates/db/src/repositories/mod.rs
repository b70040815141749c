//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod book;
pub mod borrow;
pub mod dashboard;
pub mod user;
pub mod workflow_run;

pub use book::{BookRepository, CreateBookInput, UpdateBookInput};
pub use borrow::{BorrowRepository, LoanOutcome, LoanRow};
pub use dashboard::DashboardRepository;
pub use user::{UserRepository, normalize_email};
pub use workflow_run::SeaOrmRunStore;
