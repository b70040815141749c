//! User repository for account records.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use libris_core::workflow::{ActivityLookup, WorkflowError};
use libris_shared::types::{PageRequest, UserId};

use crate::entities::{
    sea_orm_active_enums::{AccountStatus, UserRole},
    users,
};

/// Lowercases and trims an email for storage and lookup.
///
/// Every address that reaches the database goes through this, so the
/// unique index on `users.email` also catches case-variant duplicates.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// User repository for CRUD operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a user by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find_by_id(id.into_inner()).one(&self.db).await
    }

    /// Checks if an email is already registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn email_exists(&self, email: &str) -> Result<bool, DbErr> {
        let count = users::Entity::find()
            .filter(users::Column::Email.eq(normalize_email(email)))
            .count(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Creates a new member account awaiting admin approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        full_name: &str,
    ) -> Result<users::Model, DbErr> {
        let now = Utc::now().into();
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(normalize_email(email)),
            password_hash: Set(password_hash.to_string()),
            full_name: Set(full_name.to_string()),
            role: Set(UserRole::User),
            status: Set(AccountStatus::Pending),
            last_activity_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        user.insert(&self.db).await
    }

    /// Sets the approval status of an account.
    ///
    /// Returns `None` when no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_status(
        &self,
        id: UserId,
        status: AccountStatus,
    ) -> Result<Option<users::Model>, DbErr> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now().into());

        active.update(&self.db).await.map(Some)
    }

    /// Sets the role of an account.
    ///
    /// Returns `None` when no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn set_role(&self, id: UserId, role: UserRole) -> Result<Option<users::Model>, DbErr> {
        let Some(user) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now().into());

        active.update(&self.db).await.map(Some)
    }

    /// Deletes an account. Returns `false` when no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, id: UserId) -> Result<bool, DbErr> {
        let result = users::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Records that the member was just seen.
    ///
    /// Called from the authenticated request path, so it skips the
    /// fetch-then-update round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn touch_activity(&self, id: UserId) -> Result<(), DbErr> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        users::Entity::update_many()
            .col_expr(users::Column::LastActivityAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await?;

        Ok(())
    }

    /// Lists accounts awaiting approval, oldest request first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_pending(&self, limit: u64) -> Result<Vec<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::Status.eq(AccountStatus::Pending))
            .order_by_asc(users::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Lists accounts, newest first, with the total count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, page: &PageRequest) -> Result<(Vec<users::Model>, u64), DbErr> {
        let total = users::Entity::find().count(&self.db).await?;
        let data = users::Entity::find()
            .order_by_desc(users::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await?;

        Ok((data, total))
    }
}

#[async_trait]
impl ActivityLookup for UserRepository {
    async fn last_activity(&self, email: &str) -> Result<Option<NaiveDate>, WorkflowError> {
        let user = self
            .find_by_email(email)
            .await
            .map_err(|e| WorkflowError::Database(e.to_string()))?;

        Ok(user.and_then(|u| u.last_activity_at.map(|t| t.with_timezone(&Utc).date_naive())))
    }
}
