//! Dashboard statistics types.
//!
//! This module provides types for dashboard data:
//! - Headline totals with day-over-day trends
//! - Recent activity listings

pub mod types;

pub use types::*;
