//! Shared types, errors, and configuration for Libris.
//!
//! This crate provides common building blocks used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Pagination types for list endpoints
//! - Application-wide error types
//! - Configuration management
//! - The TTL keyed store port (and its in-memory implementation)
//! - The mailer port (SMTP and in-memory implementations)
//! - JWT token handling

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod jwt;
pub mod kv;
pub mod types;

pub use auth::{Claims, TokenPair};
pub use config::AppConfig;
pub use email::{EmailError, Mailer, MemoryMailer, SmtpMailer};
pub use error::{AppError, AppResult};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use kv::{CounterState, KeyedStore, KeyedStoreError, MemoryKeyedStore};
