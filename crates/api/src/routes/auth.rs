//! Authentication routes for the OTP sign-up flow, sign-in, and token
//! refresh.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use garde::Validate;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::AppState;
use libris_core::auth::{hash_password, verify_password};
use libris_core::workflow::NurturePayload;
use libris_db::cache;
use libris_db::{
    UserRepository,
    entities::{sea_orm_active_enums::UserRole, users},
};
use libris_shared::TokenPair;

/// Creates the auth router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/refresh", post(refresh))
}

// ============================================================================
// Request Types
// ============================================================================

/// Request body for starting registration.
#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    /// Email address to register.
    #[garde(email)]
    pub email: String,
    /// Chosen password. Validated here so a bad one fails before the
    /// verification leg; the hash is only computed once the code checks out.
    #[garde(length(min = 8, max = 128))]
    pub password: String,
    /// Display name.
    #[garde(length(min = 1, max = 255))]
    pub full_name: String,
}

/// Request body for completing registration.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    /// Email address the code was sent to.
    #[garde(email)]
    pub email: String,
    /// Chosen password, carried again from the sign-up form.
    #[garde(length(min = 8, max = 128))]
    pub password: String,
    /// Display name.
    #[garde(length(min = 1, max = 255))]
    pub full_name: String,
    /// The six-digit code from the email.
    #[garde(length(min = 6, max = 6))]
    pub otp: String,
}

/// Request body for re-sending the verification code.
#[derive(Debug, Deserialize, Validate)]
pub struct ResendOtpRequest {
    /// Email address to resend to.
    #[garde(email)]
    pub email: String,
    /// Display name used in the email.
    #[garde(length(min = 1, max = 255))]
    pub full_name: String,
}

/// Request body for signing in.
#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    /// Account email.
    #[garde(email)]
    pub email: String,
    /// Account password.
    #[garde(length(min = 1))]
    pub password: String,
}

/// Request body for refreshing an access token.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// A valid refresh token.
    pub refresh_token: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the caller address for rate limiting, trusting the first
/// forwarded hop the way the original deployment did.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| "127.0.0.1".to_string(), ToString::to_string)
}

/// Builds the 400 response for a failed payload validation.
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

/// Counts the request against the caller's window, or produces the 429.
async fn check_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let ip = client_ip(headers);
    let decision = state.limiter.allow(&ip).await;
    if decision.allowed {
        return Ok(());
    }

    info!(ip = %ip, "Rate limit exceeded on auth endpoint");
    Err((
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "rate_limited",
            "message": "Too many requests, please try again later",
            "retry_after_secs": decision.reset_after.as_secs()
        })),
    )
        .into_response())
}

/// Generates the access/refresh pair, or produces the 500.
fn issue_tokens(state: &AppState, user: &users::Model) -> Result<TokenPair, Response> {
    let role = role_to_string(&user.role);

    let access_token = state
        .jwt_service
        .generate_access_token(user.id, role)
        .map_err(|e| {
            error!(error = %e, "Failed to generate access token");
            internal_error("An error occurred during sign in")
        })?;
    let refresh_token = state
        .jwt_service
        .generate_refresh_token(user.id, role)
        .map_err(|e| {
            error!(error = %e, "Failed to generate refresh token");
            internal_error("An error occurred during sign in")
        })?;

    Ok(TokenPair::new(
        access_token,
        refresh_token,
        state.jwt_service.access_token_expires_in(),
    ))
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

/// Converts `UserRole` enum to string.
const fn role_to_string(role: &UserRole) -> &'static str {
    match role {
        UserRole::User => "user",
        UserRole::Admin => "admin",
    }
}

fn user_json(user: &users::Model) -> serde_json::Value {
    json!({
        "id": user.id,
        "email": user.email,
        "full_name": user.full_name,
        "role": role_to_string(&user.role),
        "status": format!("{:?}", user.status).to_lowercase()
    })
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /auth/sign-up - Start registration by sending a verification code.
async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignUpRequest>,
) -> impl IntoResponse {
    if let Err(response) = check_rate_limit(&state, &headers).await {
        return response;
    }
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    let user_repo = UserRepository::new((*state.db).clone());

    // Check if email already exists
    match user_repo.email_exists(&payload.email).await {
        Ok(true) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "email_exists",
                    "message": "An account with this email already exists"
                })),
            )
                .into_response();
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Database error checking email");
            return internal_error("An error occurred during sign up");
        }
    }

    if let Err(e) = state.otp.issue(&payload.email, &payload.full_name).await {
        error!(error = %e, "Failed to issue verification code");
        return internal_error("Unable to send a verification code, please try again later");
    }

    info!(email = %payload.email, "Verification code issued");

    (
        StatusCode::OK,
        Json(json!({
            "message": "Verification code sent to email",
            "email": payload.email
        })),
    )
        .into_response()
}

/// POST /auth/verify-otp - Verify the code and create the account.
#[allow(clippy::too_many_lines)]
async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> impl IntoResponse {
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    match state.otp.verify(&payload.email, &payload.otp).await {
        Ok(true) => {}
        Ok(false) => {
            info!(email = %payload.email, "Rejected verification code");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "invalid_otp",
                    "message": "Invalid or expired verification code"
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to check verification code");
            return internal_error("An error occurred during sign up");
        }
    }

    let user_repo = UserRepository::new((*state.db).clone());

    // The code was issued before the address was taken; re-check in case
    // someone registered it in between.
    match user_repo.email_exists(&payload.email).await {
        Ok(true) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "email_exists",
                    "message": "An account with this email already exists"
                })),
            )
                .into_response();
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Database error checking email");
            return internal_error("An error occurred during sign up");
        }
    }

    // Hash password
    let password_hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "Failed to hash password");
            return internal_error("An error occurred during sign up");
        }
    };

    // Create the account in its pending state
    let user = match user_repo
        .create(&payload.email, &password_hash, &payload.full_name)
        .await
    {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "Failed to create user");
            return internal_error("An error occurred during sign up");
        }
    };

    // The account exists now; a stale code or counter only lingers until
    // its TTL, so neither failure below is worth failing the request.
    if let Err(e) = state.otp.consume(&payload.email).await {
        error!(email = %user.email, error = %e, "Failed to consume verification code");
    }
    state.cache.invalidate(&[cache::USERS_COUNT]).await;

    if let Err(e) = state
        .engine
        .trigger_nurture(
            NurturePayload {
                email: user.email.clone(),
                full_name: user.full_name.clone(),
            },
            Utc::now(),
        )
        .await
    {
        error!(user_id = %user.id, error = %e, "Failed to schedule nurture sequence");
    }

    let tokens = match issue_tokens(&state, &user) {
        Ok(t) => t,
        Err(response) => return response,
    };

    info!(user_id = %user.id, email = %user.email, "New member registered");

    (
        StatusCode::CREATED,
        Json(json!({
            "user": user_json(&user),
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expires_in": tokens.expires_in
        })),
    )
        .into_response()
}

/// POST /auth/resend-otp - Replace a pending code with a fresh one.
async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> impl IntoResponse {
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    if let Err(e) = state.otp.resend(&payload.email, &payload.full_name).await {
        error!(error = %e, "Failed to resend verification code");
        return internal_error("Unable to send a verification code, please try again later");
    }

    info!(email = %payload.email, "Verification code resent");

    (
        StatusCode::OK,
        Json(json!({ "message": "Verification code sent to email" })),
    )
        .into_response()
}

/// POST /auth/sign-in - Authenticate a member and return tokens.
async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SignInRequest>,
) -> impl IntoResponse {
    if let Err(response) = check_rate_limit(&state, &headers).await {
        return response;
    }
    if let Err(report) = payload.validate() {
        return validation_failed(&report);
    }

    let user_repo = UserRepository::new((*state.db).clone());

    // Find user by email
    let user = match user_repo.find_by_email(&payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            info!(email = %payload.email, "Sign-in attempt for non-existent user");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "invalid_credentials",
                    "message": "Invalid email or password"
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Database error during sign in");
            return internal_error("An error occurred during sign in");
        }
    };

    // Verify password
    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            info!(user_id = %user.id, "Failed sign-in attempt - invalid password");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "invalid_credentials",
                    "message": "Invalid email or password"
                })),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Password verification error");
            return internal_error("An error occurred during sign in");
        }
    }

    // A failed bump is not worth rejecting a good credential pair.
    if let Err(e) = user_repo
        .touch_activity(libris_shared::types::UserId::from_uuid(user.id))
        .await
    {
        error!(user_id = %user.id, error = %e, "Failed to record activity");
    }

    let tokens = match issue_tokens(&state, &user) {
        Ok(t) => t,
        Err(response) => return response,
    };

    info!(user_id = %user.id, "Member signed in");

    (
        StatusCode::OK,
        Json(json!({
            "user": user_json(&user),
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expires_in": tokens.expires_in
        })),
    )
        .into_response()
}

/// POST /auth/refresh - Refresh access token using refresh token.
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> impl IntoResponse {
    // Validate refresh token
    let claims = match state.jwt_service.validate_token(&payload.refresh_token) {
        Ok(c) => c,
        Err(e) => {
            let (error, message) = match e {
                libris_shared::JwtError::Expired => ("token_expired", "Refresh token has expired"),
                _ => ("invalid_token", "Invalid refresh token"),
            };
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": error, "message": message })),
            )
                .into_response();
        }
    };

    // Generate new access token
    let access_token = match state
        .jwt_service
        .generate_access_token(claims.user_id(), &claims.role)
    {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to generate access token");
            return internal_error("An error occurred during token refresh");
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "access_token": access_token,
            "expires_in": state.jwt_service.access_token_expires_in()
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    fn headers_with_forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[rstest]
    #[case("203.0.113.9", "203.0.113.9")]
    #[case("203.0.113.9, 10.0.0.1", "203.0.113.9")]
    #[case("  203.0.113.9 , 10.0.0.1", "203.0.113.9")]
    fn client_ip_takes_the_first_forwarded_hop(#[case] header: &str, #[case] expected: &str) {
        let headers = headers_with_forwarded(header);
        assert_eq!(client_ip(&headers), expected);
    }

    #[test]
    fn client_ip_falls_back_to_loopback() {
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
        assert_eq!(client_ip(&headers_with_forwarded("")), "127.0.0.1");
    }

    #[test]
    fn sign_up_payload_is_validated() {
        let ok = SignUpRequest {
            email: "ada@example.com".to_string(),
            password: "correct-horse".to_string(),
            full_name: "Ada Lovelace".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad_email = SignUpRequest {
            email: "not-an-email".to_string(),
            ..ok
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignUpRequest {
            email: "ada@example.com".to_string(),
            password: "short".to_string(),
            full_name: "Ada Lovelace".to_string(),
        };
        assert!(short_password.validate().is_err());
    }

    #[test]
    fn otp_must_be_six_characters() {
        let request = VerifyOtpRequest {
            email: "ada@example.com".to_string(),
            password: "correct-horse".to_string(),
            full_name: "Ada Lovelace".to_string(),
            otp: "12345".to_string(),
        };
        assert!(request.validate().is_err());

        let request = VerifyOtpRequest {
            otp: "123456".to_string(),
            ..request
        };
        assert!(request.validate().is_ok());
    }
}
