//! Catalogue routes: browsing for members, management for admins.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use garde::Validate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    middleware::{AuthUser, require_admin},
};
use libris_db::cache;
use libris_db::repositories::book::{CreateBookInput, UpdateBookInput};
use libris_db::{BookRepository, BorrowRepository, entities::books};
use libris_shared::types::{BookId, PageRequest, PageResponse};

/// Creates the books router (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books))
        .route("/books", post(create_book))
        .route("/books/{book_id}", get(get_book))
        .route("/books/{book_id}", put(update_book))
        .route("/books/{book_id}", delete(delete_book))
}

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters for the catalogue listing.
#[derive(Debug, Deserialize)]
pub struct ListBooksQuery {
    /// Page number, 1-based.
    pub page: Option<u32>,
    /// Items per page.
    pub per_page: Option<u32>,
    /// Free-text search over title and author.
    pub search: Option<String>,
}

/// Request body for adding a book.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookRequest {
    /// Title.
    #[garde(length(min = 1, max = 255))]
    pub title: String,
    /// Author.
    #[garde(length(min = 1, max = 255))]
    pub author: String,
    /// Genre label.
    #[garde(length(min = 1, max = 100))]
    pub genre: String,
    /// Shelf rating, 1 to 5.
    #[garde(range(min = 1, max = 5))]
    pub rating: i32,
    /// Long-form description.
    #[garde(length(min = 1))]
    pub description: String,
    /// Back-cover summary.
    #[garde(length(min = 1))]
    pub summary: String,
    /// Cover image URL.
    #[garde(inner(url))]
    pub cover_url: Option<String>,
    /// Cover accent color as `#rrggbb`.
    #[garde(inner(custom(hex_color)))]
    pub cover_color: Option<String>,
    /// Number of physical copies owned.
    #[garde(range(min = 1, max = 10_000))]
    pub total_copies: i32,
}

/// Request body for editing a book. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBookRequest {
    /// New title.
    #[garde(inner(length(min = 1, max = 255)))]
    pub title: Option<String>,
    /// New author.
    #[garde(inner(length(min = 1, max = 255)))]
    pub author: Option<String>,
    /// New genre label.
    #[garde(inner(length(min = 1, max = 100)))]
    pub genre: Option<String>,
    /// New shelf rating.
    #[garde(inner(range(min = 1, max = 5)))]
    pub rating: Option<i32>,
    /// New description.
    #[garde(inner(length(min = 1)))]
    pub description: Option<String>,
    /// New back-cover summary.
    #[garde(inner(length(min = 1)))]
    pub summary: Option<String>,
    /// New cover image URL.
    #[garde(inner(url))]
    pub cover_url: Option<String>,
    /// New cover accent color.
    #[garde(inner(custom(hex_color)))]
    pub cover_color: Option<String>,
    /// New total copy count.
    #[garde(inner(range(min = 1, max = 10_000)))]
    pub total_copies: Option<i32>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn hex_color(value: &str, _context: &()) -> garde::Result {
    let well_formed = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if well_formed {
        Ok(())
    } else {
        Err(garde::Error::new("not a #rrggbb color"))
    }
}

fn validation_failed(report: &garde::Report) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "validation_error",
            "message": report.to_string()
        })),
    )
        .into_response()
}

fn book_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "not_found",
            "message": "Book not found"
        })),
    )
        .into_response()
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal_error",
            "message": message
        })),
    )
        .into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /books - List the catalogue, newest first.
async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<ListBooksQuery>,
) -> impl IntoResponse {
    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or_else(|| PageRequest::default().per_page),
    };
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // Only the default catalogue shape is cached; searches and deeper
    // pages go straight to the database.
    let default_shape = search.is_none()
        && page.is_first_page()
        && page.per_page == PageRequest::default().per_page;

    if default_shape {
        if let Some(cached) = state
            .cache
            .get::<PageResponse<books::Model>>(cache::ALL_BOOKS_FIRST_PAGE)
            .await
        {
            return (StatusCode::OK, Json(cached)).into_response();
        }
    }

    let book_repo = BookRepository::new((*state.db).clone());
    let (data, total) = match book_repo.list(&page, search).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Database error listing books");
            return internal_error("An error occurred listing books");
        }
    };

    let response = PageResponse::new(data, page.page, page.per_page, total);
    if default_shape {
        state
            .cache
            .put(cache::ALL_BOOKS_FIRST_PAGE, &response, cache::FIRST_PAGE_TTL)
            .await;
    }

    (StatusCode::OK, Json(response)).into_response()
}

/// GET `/books/{book_id}` - Book details, served read-through cached.
async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<Uuid>,
) -> impl IntoResponse {
    let id = BookId::from_uuid(book_id);
    let key = cache::book_details_key(id);

    if let Some(cached) = state.cache.get::<books::Model>(&key).await {
        return (StatusCode::OK, Json(cached)).into_response();
    }

    let book_repo = BookRepository::new((*state.db).clone());
    let book = match book_repo.find_by_id(id).await {
        Ok(Some(b)) => b,
        Ok(None) => return book_not_found(),
        Err(e) => {
            error!(error = %e, "Database error fetching book");
            return internal_error("An error occurred fetching the book");
        }
    };

    state.cache.put(&key, &book, cache::BOOK_DETAILS_TTL).await;

    (StatusCode::OK, Json(book)).into_response()
}

/// POST /books - Add a book to the catalogue.
async fn create_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateBookRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    let book_repo = BookRepository::new((*state.db).clone());
    let book = match book_repo
        .create(CreateBookInput {
            title: payload.title,
            author: payload.author,
            genre: payload.genre,
            rating: payload.rating,
            description: payload.description,
            summary: payload.summary,
            cover_url: payload.cover_url,
            cover_color: payload.cover_color,
            total_copies: payload.total_copies,
        })
        .await
    {
        Ok(b) => b,
        Err(e) => {
            error!(error = %e, "Failed to create book");
            return internal_error("An error occurred creating the book");
        }
    };

    state
        .cache
        .invalidate(&[cache::ALL_BOOKS_FIRST_PAGE, cache::BOOKS_COUNT])
        .await;

    info!(book_id = %book.id, title = %book.title, "Book added");

    (StatusCode::CREATED, Json(book)).into_response()
}

/// PUT `/books/{book_id}` - Edit a book.
async fn update_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(book_id): Path<Uuid>,
    Json(payload): Json<UpdateBookRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    let id = BookId::from_uuid(book_id);
    let book_repo = BookRepository::new((*state.db).clone());
    let book = match book_repo
        .update(
            id,
            UpdateBookInput {
                title: payload.title,
                author: payload.author,
                genre: payload.genre,
                rating: payload.rating,
                description: payload.description,
                summary: payload.summary,
                cover_url: payload.cover_url,
                cover_color: payload.cover_color,
                total_copies: payload.total_copies,
            },
        )
        .await
    {
        Ok(Some(b)) => b,
        Ok(None) => return book_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to update book");
            return internal_error("An error occurred updating the book");
        }
    };

    state
        .cache
        .invalidate(&[&cache::book_details_key(id), cache::ALL_BOOKS_FIRST_PAGE])
        .await;

    info!(book_id = %book.id, "Book updated");

    (StatusCode::OK, Json(book)).into_response()
}

/// DELETE `/books/{book_id}` - Remove a book without active loans.
async fn delete_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(book_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let id = BookId::from_uuid(book_id);
    let borrow_repo = BorrowRepository::new((*state.db).clone());

    match borrow_repo.active_count_for_book(id).await {
        Ok(0) => {}
        Ok(active) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "has_active_loans",
                    "message": format!("Cannot delete a book with {active} active loans")
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Database error counting active loans");
            return internal_error("An error occurred deleting the book");
        }
    }

    let book_repo = BookRepository::new((*state.db).clone());
    match book_repo.delete(id).await {
        Ok(true) => {}
        Ok(false) => return book_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to delete book");
            return internal_error("An error occurred deleting the book");
        }
    }

    state
        .cache
        .invalidate(&[
            &cache::book_details_key(id),
            cache::ALL_BOOKS_FIRST_PAGE,
            cache::BOOKS_COUNT,
        ])
        .await;

    info!(book_id = %book_id, "Book deleted");

    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_create() -> CreateBookRequest {
        CreateBookRequest {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            genre: "Science Fiction".to_string(),
            rating: 5,
            description: "A desert planet and its spice.".to_string(),
            summary: "Politics, prophecy, and a very large worm.".to_string(),
            cover_url: Some("https://covers.example.com/dune.jpg".to_string()),
            cover_color: Some("#1c1f40".to_string()),
            total_copies: 3,
        }
    }

    fn empty_update() -> UpdateBookRequest {
        UpdateBookRequest {
            title: None,
            author: None,
            genre: None,
            rating: None,
            description: None,
            summary: None,
            cover_url: None,
            cover_color: None,
            total_copies: None,
        }
    }

    #[test]
    fn create_request_accepts_a_complete_payload() {
        assert!(valid_create().validate().is_ok());
    }

    #[test]
    fn create_request_rejects_zero_copies() {
        let request = CreateBookRequest {
            total_copies: 0,
            ..valid_create()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_rejects_an_out_of_range_rating() {
        for rating in [0, 6] {
            let request = CreateBookRequest {
                rating,
                ..valid_create()
            };
            assert!(request.validate().is_err(), "rating {rating} should fail");
        }
    }

    #[test]
    fn create_request_rejects_a_malformed_cover_url() {
        let request = CreateBookRequest {
            cover_url: Some("not a url".to_string()),
            ..valid_create()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn cover_color_must_be_an_rrggbb_hex_string() {
        for color in ["1c1f40", "#1c1f4", "#1c1f4g", "#1c1f4000"] {
            let request = CreateBookRequest {
                cover_color: Some(color.to_string()),
                ..valid_create()
            };
            assert!(request.validate().is_err(), "color {color} should fail");
        }
    }

    #[test]
    fn update_request_allows_an_empty_body() {
        assert!(empty_update().validate().is_ok());
    }

    #[test]
    fn update_request_still_checks_present_fields() {
        let request = UpdateBookRequest {
            title: Some(String::new()),
            ..empty_update()
        };
        assert!(request.validate().is_err());
    }
}
