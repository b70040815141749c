//! Borrow repository for the lending transaction path.
//!
//! The borrow and return mutations run inside a single database
//! transaction so a loan record never exists without its matching
//! availability change. Availability itself only moves through
//! single-statement conditional updates; a plain read-then-write would
//! let two borrowers take the last copy.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use libris_core::lending::{self, LendingError, LoanStatus};
use libris_shared::types::{BookId, LoanId, PageRequest, UserId};

use crate::entities::{books, borrow_records, sea_orm_active_enums, users};

/// A settled loan mutation with the rows the caller needs for
/// notifications and cache invalidation.
#[derive(Debug, Clone)]
pub struct LoanOutcome {
    /// The loan record as written.
    pub loan: borrow_records::Model,
    /// The book after its availability change.
    pub book: books::Model,
    /// The borrowing member.
    pub borrower: users::Model,
}

/// A loan joined with its book and borrower for listings.
#[derive(Debug, Clone)]
pub struct LoanRow {
    /// The loan record.
    pub loan: borrow_records::Model,
    /// The book, unless it was deleted after the loan closed.
    pub book: Option<books::Model>,
    /// The borrower, if the account still exists.
    pub borrower: Option<users::Model>,
}

/// Borrow repository for loan transactions and listings.
#[derive(Debug, Clone)]
pub struct BorrowRepository {
    db: DatabaseConnection,
}

impl BorrowRepository {
    /// Creates a new borrow repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Borrows one copy of a book for a member.
    ///
    /// Preconditions are checked in order: the borrower must exist and be
    /// approved, then the book must exist with a copy on the shelf. The
    /// decrement and the loan insert commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::BorrowerNotFound`], [`LendingError::NotEligible`],
    /// [`LendingError::BookNotFound`], [`LendingError::Unavailable`], or
    /// [`LendingError::Database`].
    pub async fn borrow(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> Result<LoanOutcome, LendingError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let borrower = users::Entity::find_by_id(user_id.into_inner())
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or(LendingError::BorrowerNotFound(user_id.into_inner()))?;

        if borrower.status != sea_orm_active_enums::AccountStatus::Approved {
            return Err(LendingError::NotEligible);
        }

        take_copy(&txn, book_id).await?;

        let book = books::Entity::find_by_id(book_id.into_inner())
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| LendingError::Database("book row vanished mid-transaction".into()))?;

        let now = Utc::now();
        let due = lending::due_date(now);
        let loan = borrow_records::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id.into_inner()),
            book_id: Set(book_id.into_inner()),
            status: Set(sea_orm_active_enums::LoanStatus::Active),
            borrowed_at: Set(now.into()),
            due_date: Set(due.into()),
            returned_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(db_err)?;

        txn.commit().await.map_err(db_err)?;

        Ok(LoanOutcome {
            loan,
            book,
            borrower,
        })
    }

    /// Returns a borrowed copy.
    ///
    /// The closing status is derived from the due date at day
    /// granularity. When `owner` is given, loans of other members are
    /// reported as [`LendingError::LoanNotFound`] rather than revealed.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::LoanNotFound`], [`LendingError::AlreadyReturned`],
    /// or [`LendingError::Database`].
    pub async fn return_loan(
        &self,
        loan_id: LoanId,
        owner: Option<UserId>,
    ) -> Result<LoanOutcome, LendingError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let loan = borrow_records::Entity::find_by_id(loan_id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or(LendingError::LoanNotFound(loan_id.into_inner()))?;

        if let Some(owner) = owner
            && loan.user_id != owner.into_inner()
        {
            return Err(LendingError::LoanNotFound(loan_id.into_inner()));
        }

        let current = loan_status_to_core(&loan.status);
        let now = Utc::now();
        let next = lending::return_transition(current, loan.due_date.with_timezone(&Utc), now)?;

        let book_uuid = loan.book_id;
        let user_uuid = loan.user_id;

        let mut active: borrow_records::ActiveModel = loan.into();
        active.status = Set(loan_status_to_db(next));
        active.returned_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());

        let updated = active.update(&txn).await.map_err(db_err)?;

        put_copy_back(&txn, book_uuid).await?;

        let book = books::Entity::find_by_id(book_uuid)
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| LendingError::Database("book row vanished mid-transaction".into()))?;
        let borrower = users::Entity::find_by_id(user_uuid)
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| LendingError::Database("borrower row vanished mid-transaction".into()))?;

        txn.commit().await.map_err(db_err)?;

        Ok(LoanOutcome {
            loan: updated,
            book,
            borrower,
        })
    }

    /// Lists a member's loans, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::Database`] if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: &PageRequest,
    ) -> Result<(Vec<LoanRow>, u64), LendingError> {
        let filter = borrow_records::Column::UserId.eq(user_id.into_inner());

        let total = borrow_records::Entity::find()
            .filter(filter.clone())
            .count(&self.db)
            .await
            .map_err(db_err)?;

        let rows = borrow_records::Entity::find()
            .filter(filter)
            .find_also_related(books::Entity)
            .order_by_desc(borrow_records::Column::BorrowedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let rows = self.attach_borrowers(rows).await?;
        Ok((rows, total))
    }

    /// Lists all loans, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::Database`] if the query fails.
    pub async fn list_all(&self, page: &PageRequest) -> Result<(Vec<LoanRow>, u64), LendingError> {
        let total = borrow_records::Entity::find()
            .count(&self.db)
            .await
            .map_err(db_err)?;

        let rows = borrow_records::Entity::find()
            .find_also_related(books::Entity)
            .order_by_desc(borrow_records::Column::BorrowedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(db_err)?;

        let rows = self.attach_borrowers(rows).await?;
        Ok((rows, total))
    }

    /// Lists the most recent loans.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::Database`] if the query fails.
    pub async fn recent(&self, limit: u64) -> Result<Vec<LoanRow>, LendingError> {
        let rows = borrow_records::Entity::find()
            .find_also_related(books::Entity)
            .order_by_desc(borrow_records::Column::BorrowedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        self.attach_borrowers(rows).await
    }

    /// Number of active loans currently out for a book.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::Database`] if the query fails.
    pub async fn active_count_for_book(&self, book_id: BookId) -> Result<u64, LendingError> {
        borrow_records::Entity::find()
            .filter(borrow_records::Column::BookId.eq(book_id.into_inner()))
            .filter(borrow_records::Column::Status.eq(sea_orm_active_enums::LoanStatus::Active))
            .count(&self.db)
            .await
            .map_err(db_err)
    }

    /// Number of active loans a member currently holds.
    ///
    /// # Errors
    ///
    /// Returns [`LendingError::Database`] if the query fails.
    pub async fn active_count_for_user(&self, user_id: UserId) -> Result<u64, LendingError> {
        borrow_records::Entity::find()
            .filter(borrow_records::Column::UserId.eq(user_id.into_inner()))
            .filter(borrow_records::Column::Status.eq(sea_orm_active_enums::LoanStatus::Active))
            .count(&self.db)
            .await
            .map_err(db_err)
    }

    /// Batch-loads borrower rows for a page of loans.
    async fn attach_borrowers(
        &self,
        rows: Vec<(borrow_records::Model, Option<books::Model>)>,
    ) -> Result<Vec<LoanRow>, LendingError> {
        let user_ids: Vec<Uuid> = rows.iter().map(|(loan, _)| loan.user_id).collect();
        let by_id: HashMap<Uuid, users::Model> = users::Entity::find()
            .filter(users::Column::Id.is_in(user_ids))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(rows
            .into_iter()
            .map(|(loan, book)| {
                let borrower = by_id.get(&loan.user_id).cloned();
                LoanRow {
                    loan,
                    book,
                    borrower,
                }
            })
            .collect())
    }
}

/// Takes one copy off the shelf, or reports why it could not.
async fn take_copy(txn: &DatabaseTransaction, book_id: BookId) -> Result<(), LendingError> {
    let result = books::Entity::update_many()
        .col_expr(
            books::Column::AvailableCopies,
            Expr::col(books::Column::AvailableCopies).sub(1),
        )
        .filter(books::Column::Id.eq(book_id.into_inner()))
        .filter(books::Column::AvailableCopies.gt(0))
        .exec(txn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    // Zero rows updated: the book is out of copies, or it does not exist.
    let exists = books::Entity::find_by_id(book_id.into_inner())
        .one(txn)
        .await
        .map_err(db_err)?
        .is_some();

    if exists {
        Err(LendingError::Unavailable(book_id.into_inner()))
    } else {
        Err(LendingError::BookNotFound(book_id.into_inner()))
    }
}

/// Puts a returned copy back on the shelf.
async fn put_copy_back(txn: &DatabaseTransaction, book_id: Uuid) -> Result<(), LendingError> {
    let result = books::Entity::update_many()
        .col_expr(
            books::Column::AvailableCopies,
            Expr::col(books::Column::AvailableCopies).add(1),
        )
        .filter(books::Column::Id.eq(book_id))
        .filter(
            Expr::col(books::Column::AvailableCopies).lt(Expr::col(books::Column::TotalCopies)),
        )
        .exec(txn)
        .await
        .map_err(db_err)?;

    if result.rows_affected == 0 {
        // The total was lowered while this copy was out; the shelf is full.
        tracing::warn!(%book_id, "return did not restore availability");
    }

    Ok(())
}

// ============================================================================
// Conversion helpers
// ============================================================================

/// Converts a database loan status to the core loan status.
const fn loan_status_to_core(status: &sea_orm_active_enums::LoanStatus) -> LoanStatus {
    match status {
        sea_orm_active_enums::LoanStatus::Active => LoanStatus::Active,
        sea_orm_active_enums::LoanStatus::Returned => LoanStatus::Returned,
        sea_orm_active_enums::LoanStatus::ReturnedLate => LoanStatus::ReturnedLate,
    }
}

/// Converts a core loan status to the database loan status.
const fn loan_status_to_db(status: LoanStatus) -> sea_orm_active_enums::LoanStatus {
    match status {
        LoanStatus::Active => sea_orm_active_enums::LoanStatus::Active,
        LoanStatus::Returned => sea_orm_active_enums::LoanStatus::Returned,
        LoanStatus::ReturnedLate => sea_orm_active_enums::LoanStatus::ReturnedLate,
    }
}

fn db_err(e: DbErr) -> LendingError {
    LendingError::Database(e.to_string())
}
