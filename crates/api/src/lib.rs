//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes
//! - Authentication middleware
//! - Response types

pub mod middleware;
pub mod routes;

use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use libris_core::otp::OtpFlow;
use libris_core::ratelimit::FixedWindowLimiter;
use libris_core::workflow::WorkflowEngine;
use libris_db::QueryCache;
use libris_shared::{JwtService, Mailer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// Outbound mailer for notification emails.
    pub mailer: Arc<dyn Mailer>,
    /// Read-through cache over the keyed store.
    pub cache: Arc<QueryCache>,
    /// Fixed-window limiter for the auth endpoints.
    pub limiter: Arc<FixedWindowLimiter>,
    /// One-time passcode flow for registration.
    pub otp: Arc<OtpFlow>,
    /// Workflow engine for reminder and nurture runs.
    pub engine: Arc<WorkflowEngine>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
