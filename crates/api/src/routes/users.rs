//! Account management routes for administrators.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use sea_orm::ActiveEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    middleware::{AuthUser, require_admin},
};
use libris_core::auth::UserRole;
use libris_core::notifications;
use libris_db::cache;
use libris_db::entities::{sea_orm_active_enums, users};
use libris_db::{BorrowRepository, UserRepository};
use libris_shared::types::{PageRequest, PageResponse, UserId};

/// How many pending requests the dedicated listing returns.
const PENDING_LIST_LIMIT: u64 = 50;

/// Creates the users router (requires auth middleware to be applied externally).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/pending", get(list_pending_users))
        .route("/users/{user_id}", delete(delete_user))
        .route("/users/{user_id}/approve", post(approve_user))
        .route("/users/{user_id}/reject", post(reject_user))
        .route("/users/{user_id}/role", put(change_role))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for the accounts listing.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    /// Page number, 1-based.
    pub page: Option<u32>,
    /// Items per page.
    pub per_page: Option<u32>,
}

/// Request body for changing an account's role.
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    /// New role: `user` or `admin`.
    pub role: String,
}

/// An account as returned by the API. Never exposes the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// User ID.
    pub id: Uuid,
    /// Email address.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Account role.
    pub role: String,
    /// Approval status.
    pub status: String,
    /// Last recorded visit.
    pub last_activity_at: Option<String>,
    /// When the account was registered.
    pub created_at: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn user_view(user: &users::Model) -> UserView {
    UserView {
        id: user.id,
        email: user.email.clone(),
        full_name: user.full_name.clone(),
        role: user.role.to_value(),
        status: user.status.to_value(),
        last_activity_at: user.last_activity_at.map(|t| t.to_rfc3339()),
        created_at: user.created_at.to_rfc3339(),
    }
}

fn user_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "user_not_found",
            "message": "User not found"
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

/// GET /users - All accounts, newest first.
async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListUsersQuery>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let page = PageRequest {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or_else(|| PageRequest::default().per_page),
    };

    let user_repo = UserRepository::new((*state.db).clone());
    match user_repo.list(&page).await {
        Ok((data, total)) => {
            let views: Vec<UserView> = data.iter().map(user_view).collect();
            (
                StatusCode::OK,
                Json(PageResponse::new(views, page.page, page.per_page, total)),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Database error listing users");
            internal_error("An error occurred listing users")
        }
    }
}

/// GET /users/pending - Accounts awaiting review, oldest request first.
async fn list_pending_users(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let user_repo = UserRepository::new((*state.db).clone());
    match user_repo.list_pending(PENDING_LIST_LIMIT).await {
        Ok(data) => {
            let views: Vec<UserView> = data.iter().map(user_view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => {
            error!(error = %e, "Database error listing pending users");
            internal_error("An error occurred listing pending users")
        }
    }
}

/// POST `/users/{user_id}/approve` - Approve a pending account.
async fn approve_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let user_repo = UserRepository::new((*state.db).clone());
    let user = match user_repo
        .set_status(
            UserId::from_uuid(user_id),
            sea_orm_active_enums::AccountStatus::Approved,
        )
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return user_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to approve user");
            return internal_error("An error occurred approving the account");
        }
    };

    // The account is approved whether or not the notification lands.
    let mail = notifications::account_approved(&user.full_name);
    if let Err(e) = state
        .mailer
        .send(&user.email, &mail.subject, &mail.body)
        .await
    {
        error!(error = %e, "Failed to send approval notification");
    }

    info!(user_id = %user.id, email = %user.email, "Account approved");

    (StatusCode::OK, Json(user_view(&user))).into_response()
}

/// POST `/users/{user_id}/reject` - Turn down a pending account.
async fn reject_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let user_repo = UserRepository::new((*state.db).clone());
    match user_repo
        .set_status(
            UserId::from_uuid(user_id),
            sea_orm_active_enums::AccountStatus::Rejected,
        )
        .await
    {
        Ok(Some(user)) => {
            info!(user_id = %user.id, "Account rejected");
            (StatusCode::OK, Json(user_view(&user))).into_response()
        }
        Ok(None) => user_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to reject user");
            internal_error("An error occurred rejecting the account")
        }
    }
}

/// PUT `/users/{user_id}/role` - Change an account's role.
async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ChangeRoleRequest>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let Some(role) = UserRole::parse(&payload.role) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_role",
                "message": "Role must be one of: user, admin"
            })),
        )
            .into_response();
    };
    let role = match role {
        UserRole::User => sea_orm_active_enums::UserRole::User,
        UserRole::Admin => sea_orm_active_enums::UserRole::Admin,
    };

    let user_repo = UserRepository::new((*state.db).clone());
    match user_repo.set_role(UserId::from_uuid(user_id), role).await {
        Ok(Some(user)) => {
            info!(user_id = %user.id, role = %user.role.to_value(), "Account role changed");
            (StatusCode::OK, Json(user_view(&user))).into_response()
        }
        Ok(None) => user_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to change role");
            internal_error("An error occurred changing the role")
        }
    }
}

/// DELETE `/users/{user_id}` - Remove an account without active loans.
async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&auth) {
        return response;
    }

    let id = UserId::from_uuid(user_id);
    let user_repo = UserRepository::new((*state.db).clone());
    let user = match user_repo.find_by_id(id).await {
        Ok(Some(user)) => user,
        Ok(None) => return user_not_found(),
        Err(e) => {
            error!(error = %e, "Database error fetching user");
            return internal_error("An error occurred deleting the account");
        }
    };

    let borrow_repo = BorrowRepository::new((*state.db).clone());
    match borrow_repo.active_count_for_user(id).await {
        Ok(0) => {}
        Ok(active) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "has_active_loans",
                    "message": format!("Cannot delete an account with {active} active loans")
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Database error counting active loans");
            return internal_error("An error occurred deleting the account");
        }
    }

    match user_repo.delete(id).await {
        Ok(true) => {}
        Ok(false) => return user_not_found(),
        Err(e) => {
            error!(error = %e, "Failed to delete user");
            return internal_error("An error occurred deleting the account");
        }
    }

    // The account is gone; its nurture sequence must never fire again.
    if let Err(e) = state.engine.retire_nurture_for(&user.email).await {
        error!(error = %e, email = %user.email, "Failed to retire nurture sequence");
    }

    state.cache.invalidate(&[cache::USERS_COUNT]).await;

    info!(user_id = %user_id, email = %user.email, "Account deleted");

    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user() -> users::Model {
        let now = Utc::now();
        users::Model {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            full_name: "Ada Lovelace".to_string(),
            role: sea_orm_active_enums::UserRole::User,
            status: sea_orm_active_enums::AccountStatus::Pending,
            last_activity_at: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn user_view_never_carries_the_password_hash() {
        let view = user_view(&sample_user());
        let encoded = serde_json::to_string(&view).unwrap();
        assert!(!encoded.contains("password"));
        assert!(!encoded.contains("argon2id"));
    }

    #[test]
    fn user_view_uses_wire_enum_strings() {
        let view = user_view(&sample_user());
        assert_eq!(view.role, "user");
        assert_eq!(view.status, "pending");
        assert!(view.last_activity_at.is_none());
    }

    #[test]
    fn role_strings_parse_case_insensitively() {
        assert_eq!(UserRole::parse("Admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("librarian"), None);
    }
}
