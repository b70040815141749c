//! Core business logic for Libris.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, decision rules, and calculations live here.
//!
//! # Modules
//!
//! - `lending` - Loan statuses, due-date math, and return decisions
//! - `otp` - One-time passcode issuance and verification
//! - `ratelimit` - Fixed-window request throttling
//! - `dashboard` - Snapshot counts and day-over-day trends
//! - `workflow` - Durable workflow engine (due reminders, nurture)
//! - `notifications` - Outbound message templates
//! - `auth` - Password hashing

pub mod auth;
pub mod dashboard;
pub mod lending;
pub mod notifications;
pub mod otp;
pub mod ratelimit;
pub mod workflow;
