//! Book repository for catalog records.
//!
//! Availability math (decrement on borrow, increment on return) lives in
//! the borrow repository's transactions; this one covers catalog CRUD.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use libris_shared::types::{BookId, PageRequest};

use crate::entities::books;

/// Input for creating a book.
#[derive(Debug, Clone)]
pub struct CreateBookInput {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Genre label.
    pub genre: String,
    /// Shelf rating, 1 to 5.
    pub rating: i32,
    /// Long-form description.
    pub description: String,
    /// Back-cover summary.
    pub summary: String,
    /// Cover image URL, if any.
    pub cover_url: Option<String>,
    /// Cover accent color as `#rrggbb`, if any.
    pub cover_color: Option<String>,
    /// Number of physical copies owned.
    pub total_copies: i32,
}

/// Input for updating a book. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateBookInput {
    /// New title.
    pub title: Option<String>,
    /// New author.
    pub author: Option<String>,
    /// New genre label.
    pub genre: Option<String>,
    /// New shelf rating.
    pub rating: Option<i32>,
    /// New description.
    pub description: Option<String>,
    /// New back-cover summary.
    pub summary: Option<String>,
    /// New cover image URL.
    pub cover_url: Option<String>,
    /// New cover accent color.
    pub cover_color: Option<String>,
    /// New total copy count.
    pub total_copies: Option<i32>,
}

/// Book repository for catalog operations.
#[derive(Debug, Clone)]
pub struct BookRepository {
    db: DatabaseConnection,
}

impl BookRepository {
    /// Creates a new book repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a book by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: BookId) -> Result<Option<books::Model>, DbErr> {
        books::Entity::find_by_id(id.into_inner()).one(&self.db).await
    }

    /// Lists books, newest first, with the total count for the filter.
    ///
    /// An optional search term matches against title and author.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(
        &self,
        page: &PageRequest,
        search: Option<&str>,
    ) -> Result<(Vec<books::Model>, u64), DbErr> {
        let mut query = books::Entity::find();

        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(books::Column::Title.contains(term))
                    .add(books::Column::Author.contains(term)),
            );
        }

        let total = query.clone().count(&self.db).await?;
        let data = query
            .order_by_desc(books::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await?;

        Ok((data, total))
    }

    /// Adds a book to the catalog with all copies available.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(&self, input: CreateBookInput) -> Result<books::Model, DbErr> {
        let now = Utc::now().into();
        let book = books::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title),
            author: Set(input.author),
            genre: Set(input.genre),
            rating: Set(input.rating),
            description: Set(input.description),
            summary: Set(input.summary),
            cover_url: Set(input.cover_url),
            cover_color: Set(input.cover_color),
            total_copies: Set(input.total_copies),
            available_copies: Set(input.total_copies),
            created_at: Set(now),
            updated_at: Set(now),
        };

        book.insert(&self.db).await
    }

    /// Updates a book. Returns `None` when no such book exists.
    ///
    /// When `total_copies` changes, `available_copies` shifts by the same
    /// delta so copies already out on loan stay accounted for. The row is
    /// locked for the duration to keep that math consistent with
    /// concurrent borrows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn update(
        &self,
        id: BookId,
        input: UpdateBookInput,
    ) -> Result<Option<books::Model>, DbErr> {
        let txn = self.db.begin().await?;

        let Some(book) = books::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        let mut active: books::ActiveModel = book.clone().into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(author) = input.author {
            active.author = Set(author);
        }
        if let Some(genre) = input.genre {
            active.genre = Set(genre);
        }
        if let Some(rating) = input.rating {
            active.rating = Set(rating);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(summary) = input.summary {
            active.summary = Set(summary);
        }
        if let Some(cover_url) = input.cover_url {
            active.cover_url = Set(Some(cover_url));
        }
        if let Some(cover_color) = input.cover_color {
            active.cover_color = Set(Some(cover_color));
        }
        if let Some(total) = input.total_copies {
            let delta = total - book.total_copies;
            active.total_copies = Set(total);
            active.available_copies = Set((book.available_copies + delta).clamp(0, total));
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        Ok(Some(updated))
    }

    /// Removes a book. Returns `false` when no such book exists.
    ///
    /// Callers are expected to check for active loans first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete(&self, id: BookId) -> Result<bool, DbErr> {
        let result = books::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Lists the most recently added books.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent(&self, limit: u64) -> Result<Vec<books::Model>, DbErr> {
        books::Entity::find()
            .order_by_desc(books::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }
}
