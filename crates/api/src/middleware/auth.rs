//! Authentication middleware for protected routes.

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::AppState;
use libris_db::UserRepository;
use libris_shared::Claims;
use libris_shared::types::UserId;

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Authentication middleware that validates JWT tokens.
///
/// This middleware:
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Validates the token using the JWT service
/// 3. Stores the claims in request extensions for handlers to access
/// 4. Bumps the member's last-activity date, which feeds the nurture
///    check-in
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = auth_header.and_then(extract_bearer_token) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "missing_token",
                "message": "Authorization header with Bearer token is required"
            })),
        )
            .into_response();
    };

    // Validate token
    match state.jwt_service.validate_token(token) {
        Ok(claims) => {
            // An activity bump must never fail the request itself.
            let user_repo = UserRepository::new((*state.db).clone());
            if let Err(e) = user_repo
                .touch_activity(UserId::from_uuid(claims.user_id()))
                .await
            {
                error!(user_id = %claims.user_id(), error = %e, "Failed to record activity");
            }

            // Store claims in request extensions
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            let (status, error, message) = match e {
                libris_shared::JwtError::Expired => (
                    StatusCode::UNAUTHORIZED,
                    "token_expired",
                    "Token has expired",
                ),
                _ => (
                    StatusCode::UNAUTHORIZED,
                    "invalid_token",
                    "Invalid or malformed token",
                ),
            };

            (status, Json(json!({ "error": error, "message": message }))).into_response()
        }
    }
}

/// Extractor for authenticated user claims.
///
/// Use this in handlers to get the authenticated user's claims:
///
/// ```ignore
/// async fn handler(claims: AuthUser) -> impl IntoResponse {
///     let user_id = claims.user_id();
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the user ID from the claims.
    #[must_use]
    pub const fn user_id(&self) -> uuid::Uuid {
        self.0.user_id()
    }

    /// Returns the user's role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.0.role
    }

    /// Whether the token carries the administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.0.role == "admin"
    }

    /// Returns the inner claims.
    #[must_use]
    pub const fn claims(&self) -> &Claims {
        &self.0
    }
}

/// Rejects the request unless the caller holds the administrator role.
///
/// # Errors
///
/// Returns the ready-to-send 403 response for non-admin callers.
pub fn require_admin(auth: &AuthUser) -> Result<(), Response> {
    if auth.is_admin() {
        return Ok(());
    }
    Err((
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "forbidden",
            "message": "Administrator role required"
        })),
    )
        .into_response())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "unauthorized",
                        "message": "Authentication required"
                    })),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn bearer_prefix_is_stripped_case_insensitively() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("abc.def"), None);
    }

    #[test]
    fn admin_role_is_detected_from_claims() {
        let admin = AuthUser(Claims::new(
            uuid::Uuid::new_v4(),
            "admin",
            Utc::now() + Duration::minutes(15),
        ));
        let member = AuthUser(Claims::new(
            uuid::Uuid::new_v4(),
            "user",
            Utc::now() + Duration::minutes(15),
        ));
        assert!(admin.is_admin());
        assert!(!member.is_admin());
        assert_eq!(member.role(), "user");
    }

    #[test]
    fn admin_gate_blocks_members() {
        let admin = AuthUser(Claims::new(
            uuid::Uuid::new_v4(),
            "admin",
            Utc::now() + Duration::minutes(15),
        ));
        let member = AuthUser(Claims::new(
            uuid::Uuid::new_v4(),
            "user",
            Utc::now() + Duration::minutes(15),
        ));
        assert!(require_admin(&admin).is_ok());
        let response = require_admin(&member).unwrap_err();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
