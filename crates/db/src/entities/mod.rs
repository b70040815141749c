//! `SeaORM` entities for the Libris schema.

pub mod books;
pub mod borrow_records;
pub mod sea_orm_active_enums;
pub mod users;
pub mod workflow_runs;
pub mod workflow_steps;
