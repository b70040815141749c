//! Admin dashboard routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use sea_orm::{ActiveEnum, DbErr};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use tracing::error;
use uuid::Uuid;

use crate::{
    AppState,
    middleware::{AuthUser, require_admin},
};
use libris_core::dashboard::StatSnapshot;
use libris_db::repositories::borrow::LoanRow;
use libris_db::{
    BookRepository, BorrowRepository, UserRepository, cache, entities::books, entities::users,
    repositories::dashboard::DashboardRepository,
};

/// How many fresh catalog entries the dashboard shows.
const RECENT_BOOKS_LIMIT: u64 = 6;

/// How many recent loans the dashboard shows.
const RECENT_LOANS_LIMIT: u64 = 3;

/// How many pending account requests the dashboard shows.
const PENDING_ACCOUNTS_LIMIT: u64 = 6;

/// Creates the dashboard routes (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new().route("/dashboard/stats", get(get_dashboard_stats))
}

// ============================================================================
// Response Types
// ============================================================================

/// Response for the dashboard stats endpoint.
#[derive(Debug, Serialize)]
pub struct DashboardStatsResponse {
    /// Headline totals with day-over-day trends.
    pub stats: StatsSection,
    /// Latest additions to the catalog.
    pub recent_books: Vec<books::Model>,
    /// Latest loan records.
    pub recent_loans: Vec<RecentLoanResponse>,
    /// Oldest pending account requests.
    pub pending_accounts: Vec<PendingAccountResponse>,
}

/// Headline metrics.
#[derive(Debug, Serialize)]
pub struct StatsSection {
    /// Registered member accounts.
    pub users: StatSnapshot,
    /// Titles in the catalog.
    pub books: StatSnapshot,
    /// Loans currently out.
    pub active_loans: StatSnapshot,
}

/// A recent loan, flattened for the activity feed.
#[derive(Debug, Serialize)]
pub struct RecentLoanResponse {
    /// Loan ID.
    pub id: Uuid,
    /// Title of the borrowed book, if it still exists.
    pub book_title: Option<String>,
    /// Name of the borrower, if the account still exists.
    pub borrower_name: Option<String>,
    /// Loan status.
    pub status: String,
    /// When the copy went out.
    pub borrowed_at: String,
    /// When it is due back.
    pub due_date: String,
}

/// An account awaiting review.
#[derive(Debug, Serialize)]
pub struct PendingAccountResponse {
    /// User ID.
    pub id: Uuid,
    /// Email address.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// When the request came in.
    pub requested_at: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Serves a headline total from the cache, falling back to `fetch` and
/// caching the result. Trend counts never go through here.
async fn cached_total<F>(state: &AppState, key: &str, fetch: F) -> Result<u64, DbErr>
where
    F: Future<Output = Result<u64, DbErr>>,
{
    if let Some(total) = state.cache.get::<u64>(key).await {
        return Ok(total);
    }

    let total = fetch.await?;
    state.cache.put(key, &total, cache::COUNT_TTL).await;
    Ok(total)
}

fn recent_loan(row: &LoanRow) -> RecentLoanResponse {
    RecentLoanResponse {
        id: row.loan.id,
        book_title: row.book.as_ref().map(|b| b.title.clone()),
        borrower_name: row.borrower.as_ref().map(|u| u.full_name.clone()),
        status: row.loan.status.to_value(),
        borrowed_at: row.loan.borrowed_at.to_rfc3339(),
        due_date: row.loan.due_date.to_rfc3339(),
    }
}

fn pending_account(user: &users::Model) -> PendingAccountResponse {
    PendingAccountResponse {
        id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        requested_at: user.created_at.to_rfc3339(),
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal_error",
            "message": "Failed to load dashboard stats"
        })),
    )
        .into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /dashboard/stats
///
/// Headline totals are cached; the per-day counts behind each trend are
/// read fresh so day-over-day movement is never stale.
#[axum::debug_handler]
#[allow(clippy::too_many_lines)]
async fn get_dashboard_stats(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let dashboard_repo = DashboardRepository::new((*state.db).clone());
    let today = chrono::Utc::now().date_naive();
    let yesterday = today - chrono::Duration::days(1);

    let users_total = match cached_total(&state, cache::USERS_COUNT, dashboard_repo.users_count())
        .await
    {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Failed to count users");
            return internal_error();
        }
    };
    let books_total = match cached_total(&state, cache::BOOKS_COUNT, dashboard_repo.books_count())
        .await
    {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Failed to count books");
            return internal_error();
        }
    };
    let loans_total = match cached_total(
        &state,
        cache::ACTIVE_LOANS_COUNT,
        dashboard_repo.active_loans_count(),
    )
    .await
    {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "Failed to count active loans");
            return internal_error();
        }
    };

    let daily = tokio::try_join!(
        dashboard_repo.users_registered_on(today),
        dashboard_repo.users_registered_on(yesterday),
        dashboard_repo.books_added_on(today),
        dashboard_repo.books_added_on(yesterday),
        dashboard_repo.loans_started_on(today),
        dashboard_repo.loans_started_on(yesterday),
    );
    let (users_today, users_yesterday, books_today, books_yesterday, loans_today, loans_yesterday) =
        match daily {
            Ok(counts) => counts,
            Err(e) => {
                error!(error = %e, "Failed to count daily activity");
                return internal_error();
            }
        };

    let book_repo = BookRepository::new((*state.db).clone());
    let recent_books = match book_repo.recent(RECENT_BOOKS_LIMIT).await {
        Ok(books) => books,
        Err(e) => {
            error!(error = %e, "Failed to list recent books");
            return internal_error();
        }
    };

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    let recent_loans = match borrow_repo.recent(RECENT_LOANS_LIMIT).await {
        Ok(rows) => rows.iter().map(recent_loan).collect(),
        Err(e) => {
            error!(error = %e, "Failed to list recent loans");
            return internal_error();
        }
    };

    let user_repo = UserRepository::new((*state.db).clone());
    let pending_accounts = match user_repo.list_pending(PENDING_ACCOUNTS_LIMIT).await {
        Ok(accounts) => accounts.iter().map(pending_account).collect(),
        Err(e) => {
            error!(error = %e, "Failed to list pending accounts");
            return internal_error();
        }
    };

    let response = DashboardStatsResponse {
        stats: StatsSection {
            users: StatSnapshot::new(users_total, users_today, users_yesterday),
            books: StatSnapshot::new(books_total, books_today, books_yesterday),
            active_loans: StatSnapshot::new(loans_total, loans_today, loans_yesterday),
        },
        recent_books,
        recent_loans,
        pending_accounts,
    };

    (StatusCode::OK, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use libris_db::entities::{borrow_records, sea_orm_active_enums};

    #[test]
    fn recent_loans_flatten_their_related_rows() {
        let now = Utc::now();
        let row = LoanRow {
            loan: borrow_records::Model {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                book_id: Uuid::new_v4(),
                status: sea_orm_active_enums::LoanStatus::Active,
                borrowed_at: now.into(),
                due_date: now.into(),
                returned_at: None,
                created_at: now.into(),
                updated_at: now.into(),
            },
            book: None,
            borrower: None,
        };

        let view = recent_loan(&row);
        assert_eq!(view.status, "active");
        assert!(view.book_title.is_none());
        assert!(view.borrower_name.is_none());
    }

    #[test]
    fn pending_accounts_carry_the_request_time() {
        let now = Utc::now();
        let user = users::Model {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "hash".to_string(),
            full_name: "Ada Lovelace".to_string(),
            role: sea_orm_active_enums::UserRole::User,
            status: sea_orm_active_enums::AccountStatus::Pending,
            last_activity_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let view = pending_account(&user);
        assert_eq!(view.email, "ada@example.com");
        assert_eq!(view.requested_at, now.to_rfc3339());
    }
}
