//! Durable email workflows for Libris.
//!
//! This module implements the persistent state machine behind the
//! due-reminder and nurture email sequences. A run is a row with a
//! cursor and a wake time; the engine claims due runs, performs the
//! step the cursor points at (recording it so retries never resend),
//! and moves the cursor forward or finishes the run.
//!
//! # Modules
//!
//! - `types` - Workflow domain types (ProcessKind, RunCursor, WorkflowRun)
//! - `error` - Workflow-specific error types
//! - `reminder` - Due-reminder scheduling and step logic
//! - `nurture` - Engagement sequence step logic
//! - `store` - Run persistence contract and in-memory double
//! - `engine` - Claim, execute, and advance driver

pub mod engine;
pub mod error;
pub mod nurture;
pub mod reminder;
pub mod store;
pub mod types;

pub use engine::{ActivityLookup, TickSummary, WorkflowEngine};
pub use error::WorkflowError;
pub use store::{MemoryRunStore, NewRun, RunStore};
pub use types::{
    NextState, NurturePayload, NurtureStep, PendingSend, ProcessKind, ReminderPayload,
    ReminderStep, RunCursor, RunStatus, StepOutcome, WorkflowRun,
};
