//! Dashboard repository for count and trend queries.
//!
//! Totals feed the cached stat snapshots; the per-day counts are always
//! read fresh so day-over-day trends compare real points in time.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::{books, borrow_records, sea_orm_active_enums, users};

/// Dashboard repository for aggregate queries.
#[derive(Debug, Clone)]
pub struct DashboardRepository {
    db: DatabaseConnection,
}

impl DashboardRepository {
    /// Creates a new dashboard repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Total number of member accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn users_count(&self) -> Result<u64, DbErr> {
        users::Entity::find().count(&self.db).await
    }

    /// Total number of catalog entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn books_count(&self) -> Result<u64, DbErr> {
        books::Entity::find().count(&self.db).await
    }

    /// Number of loans currently out.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn active_loans_count(&self) -> Result<u64, DbErr> {
        borrow_records::Entity::find()
            .filter(borrow_records::Column::Status.eq(sea_orm_active_enums::LoanStatus::Active))
            .count(&self.db)
            .await
    }

    /// Accounts created on a given UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn users_registered_on(&self, date: NaiveDate) -> Result<u64, DbErr> {
        let (start, end) = day_bounds(date);
        users::Entity::find()
            .filter(users::Column::CreatedAt.gte(start))
            .filter(users::Column::CreatedAt.lt(end))
            .count(&self.db)
            .await
    }

    /// Books added on a given UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn books_added_on(&self, date: NaiveDate) -> Result<u64, DbErr> {
        let (start, end) = day_bounds(date);
        books::Entity::find()
            .filter(books::Column::CreatedAt.gte(start))
            .filter(books::Column::CreatedAt.lt(end))
            .count(&self.db)
            .await
    }

    /// Loans started on a given UTC day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn loans_started_on(&self, date: NaiveDate) -> Result<u64, DbErr> {
        let (start, end) = day_bounds(date);
        borrow_records::Entity::find()
            .filter(borrow_records::Column::BorrowedAt.gte(start))
            .filter(borrow_records::Column::BorrowedAt.lt(end))
            .count(&self.db)
            .await
    }
}

/// Start and end instants of a UTC calendar day.
fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}
