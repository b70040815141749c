//! Lending routes: borrowing, returning, and loan listings.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use sea_orm::ActiveEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    middleware::{AuthUser, require_admin},
};
use libris_core::lending::LendingError;
use libris_core::notifications;
use libris_core::workflow::ReminderPayload;
use libris_db::cache;
use libris_db::repositories::borrow::{LoanOutcome, LoanRow};
use libris_db::{
    BorrowRepository,
    entities::{books, users},
};
use libris_shared::types::{BookId, LoanId, PageRequest, PageResponse, UserId};

/// Creates the loans router (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/loans", post(borrow_book))
        .route("/loans", get(list_all_loans))
        .route("/loans/me", get(list_my_loans))
        .route("/loans/{loan_id}/return", post(return_book))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for borrowing a book.
#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    /// The book to borrow.
    pub book_id: Uuid,
}

/// Query parameters for loan listings.
#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    /// Page number, 1-based.
    pub page: Option<u32>,
    /// Items per page.
    pub per_page: Option<u32>,
}

/// A loan as returned by the API.
#[derive(Debug, Serialize)]
pub struct LoanView {
    /// Loan ID.
    pub id: Uuid,
    /// Loan status.
    pub status: String,
    /// When the copy went out.
    pub borrowed_at: String,
    /// When it is due back.
    pub due_date: String,
    /// When it came back, if it has.
    pub returned_at: Option<String>,
    /// The book, unless it was removed after the loan closed.
    pub book: Option<BookSummary>,
    /// The borrower, if the account still exists.
    pub borrower: Option<BorrowerSummary>,
}

/// Book fields embedded in a loan view.
#[derive(Debug, Serialize)]
pub struct BookSummary {
    /// Book ID.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Cover image URL.
    pub cover_url: Option<String>,
    /// Cover accent color.
    pub cover_color: Option<String>,
}

/// Borrower fields embedded in a loan view.
#[derive(Debug, Serialize)]
pub struct BorrowerSummary {
    /// User ID.
    pub id: Uuid,
    /// Email address.
    pub email: String,
    /// Display name.
    pub full_name: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn book_summary(book: &books::Model) -> BookSummary {
    BookSummary {
        id: book.id,
        title: book.title.clone(),
        author: book.author.clone(),
        cover_url: book.cover_url.clone(),
        cover_color: book.cover_color.clone(),
    }
}

fn borrower_summary(user: &users::Model) -> BorrowerSummary {
    BorrowerSummary {
        id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
    }
}

fn loan_view(row: &LoanRow) -> LoanView {
    LoanView {
        id: row.loan.id,
        status: row.loan.status.to_value(),
        borrowed_at: row.loan.borrowed_at.to_rfc3339(),
        due_date: row.loan.due_date.to_rfc3339(),
        returned_at: row.loan.returned_at.map(|t| t.to_rfc3339()),
        book: row.book.as_ref().map(book_summary),
        borrower: row.borrower.as_ref().map(borrower_summary),
    }
}

fn outcome_view(outcome: &LoanOutcome) -> LoanView {
    LoanView {
        id: outcome.loan.id,
        status: outcome.loan.status.to_value(),
        borrowed_at: outcome.loan.borrowed_at.to_rfc3339(),
        due_date: outcome.loan.due_date.to_rfc3339(),
        returned_at: outcome.loan.returned_at.map(|t| t.to_rfc3339()),
        book: Some(book_summary(&outcome.book)),
        borrower: Some(borrower_summary(&outcome.borrower)),
    }
}

fn lending_error_response(e: &LendingError) -> Response {
    match e {
        LendingError::NotEligible => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "not_eligible",
                "message": "Account is not approved for borrowing"
            })),
        )
            .into_response(),
        LendingError::BorrowerNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "borrower_not_found",
                "message": "Borrower account not found"
            })),
        )
            .into_response(),
        LendingError::BookNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "book_not_found",
                "message": "Book not found"
            })),
        )
            .into_response(),
        LendingError::LoanNotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "loan_not_found",
                "message": "Loan not found"
            })),
        )
            .into_response(),
        LendingError::Unavailable(_) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "no_copies_available",
                "message": "All copies of this book are currently out"
            })),
        )
            .into_response(),
        LendingError::AlreadyReturned { status } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "already_returned",
                "message": format!("Loan was already closed with status {status}")
            })),
        )
            .into_response(),
        LendingError::Database(msg) => {
            error!(error = %msg, "Database error in lending operation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "message": "An error occurred processing the loan"
                })),
            )
                .into_response()
        }
    }
}

async fn invalidate_lending_caches(state: &AppState, book_id: BookId) {
    state
        .cache
        .invalidate(&[
            &cache::book_details_key(book_id),
            cache::ALL_BOOKS_FIRST_PAGE,
            cache::ACTIVE_LOANS_COUNT,
        ])
        .await;
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /loans - Borrow one copy of a book.
async fn borrow_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BorrowRequest>,
) -> impl IntoResponse {
    let user_id = UserId::from_uuid(auth.user_id());
    let book_id = BookId::from_uuid(payload.book_id);

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    let outcome = match borrow_repo.borrow(user_id, book_id).await {
        Ok(outcome) => outcome,
        Err(e) => return lending_error_response(&e),
    };

    let due = outcome.loan.due_date.with_timezone(&Utc);

    // Confirmation and reminder are best-effort; the loan is already
    // committed.
    let mail = notifications::borrow_confirmation(
        &outcome.borrower.full_name,
        &outcome.book.title,
        due,
    );
    if let Err(e) = state
        .mailer
        .send(&outcome.borrower.email, &mail.subject, &mail.body)
        .await
    {
        error!(error = %e, "Failed to send borrow confirmation");
    }

    if let Err(e) = state
        .engine
        .trigger_due_reminder(
            ReminderPayload {
                email: outcome.borrower.email.clone(),
                full_name: outcome.borrower.full_name.clone(),
                book_title: outcome.book.title.clone(),
                due_date: due,
            },
            Utc::now(),
        )
        .await
    {
        error!(error = %e, "Failed to schedule due reminder");
    }

    invalidate_lending_caches(&state, book_id).await;

    info!(
        loan_id = %outcome.loan.id,
        user_id = %outcome.borrower.id,
        book_id = %outcome.book.id,
        "Book borrowed"
    );

    (StatusCode::CREATED, Json(outcome_view(&outcome))).into_response()
}

/// POST `/loans/{loan_id}/return` - Mark a loan as returned.
async fn return_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(loan_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    let outcome = match borrow_repo.return_loan(LoanId::from_uuid(loan_id), None).await {
        Ok(outcome) => outcome,
        Err(e) => return lending_error_response(&e),
    };

    let mail =
        notifications::return_confirmation(&outcome.borrower.full_name, &outcome.book.title);
    if let Err(e) = state
        .mailer
        .send(&outcome.borrower.email, &mail.subject, &mail.body)
        .await
    {
        error!(error = %e, "Failed to send return confirmation");
    }

    invalidate_lending_caches(&state, BookId::from_uuid(outcome.book.id)).await;

    info!(
        loan_id = %outcome.loan.id,
        status = %outcome.loan.status.to_value(),
        "Book returned"
    );

    (StatusCode::OK, Json(outcome_view(&outcome))).into_response()
}

/// GET /loans/me - The caller's own loans, newest first.
async fn list_my_loans(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListLoansQuery>,
) -> impl IntoResponse {
    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or_else(|| PageRequest::default().per_page),
    };

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    match borrow_repo
        .list_for_user(UserId::from_uuid(auth.user_id()), &page)
        .await
    {
        Ok((rows, total)) => {
            let views: Vec<LoanView> = rows.iter().map(loan_view).collect();
            (
                StatusCode::OK,
                Json(PageResponse::new(views, page.page, page.per_page, total)),
            )
                .into_response()
        }
        Err(e) => lending_error_response(&e),
    }
}

/// GET /loans - Every loan in the system, newest first.
async fn list_all_loans(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListLoansQuery>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or_else(|| PageRequest::default().per_page),
    };

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    match borrow_repo.list_all(&page).await {
        Ok((rows, total)) => {
            let views: Vec<LoanView> = rows.iter().map(loan_view).collect();
            (
                StatusCode::OK,
                Json(PageResponse::new(views, page.page, page.per_page, total)),
            )
                .into_response()
        }
        Err(e) => lending_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_db::entities::{borrow_records, sea_orm_active_enums};

    fn sample_loan() -> borrow_records::Model {
        let now = Utc::now();
        borrow_records::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            status: sea_orm_active_enums::LoanStatus::ReturnedLate,
            borrowed_at: now.into(),
            due_date: now.into(),
            returned_at: Some(now.into()),
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    fn sample_book(id: Uuid) -> books::Model {
        let now = Utc::now();
        books::Model {
            id,
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            genre: "Science Fiction".to_string(),
            rating: 5,
            description: "Spice.".to_string(),
            summary: String::new(),
            cover_url: None,
            cover_color: None,
            total_copies: 3,
            available_copies: 2,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn loan_view_uses_wire_status_strings() {
        let loan = sample_loan();
        let row = LoanRow {
            book: Some(sample_book(loan.book_id)),
            borrower: None,
            loan,
        };
        let view = loan_view(&row);
        assert_eq!(view.status, "returned_late");
        assert!(view.returned_at.is_some());
        assert_eq!(view.book.as_ref().map(|b| b.title.as_str()), Some("Dune"));
        assert!(view.borrower.is_none());
    }

    #[test]
    fn loan_view_survives_a_deleted_book() {
        let loan = sample_loan();
        let row = LoanRow {
            loan,
            book: None,
            borrower: None,
        };
        assert!(loan_view(&row).book.is_none());
    }

    #[test]
    fn lending_errors_map_to_their_status_codes() {
        let cases = [
            (LendingError::NotEligible, StatusCode::FORBIDDEN),
            (
                LendingError::BookNotFound(Uuid::nil()),
                StatusCode::NOT_FOUND,
            ),
            (
                LendingError::Unavailable(Uuid::nil()),
                StatusCode::CONFLICT,
            ),
            (
                LendingError::Database("conn".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(lending_error_response(&err).status(), expected);
        }
    }
}
