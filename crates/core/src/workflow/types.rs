//! Workflow domain types.
//!
//! This module defines the run record, its cursor, and the step
//! payloads for both workflow kinds. Cursors serialize to short
//! strings so they survive a round trip through the runs table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use libris_shared::types::WorkflowRunId;

use crate::notifications::MailContent;

/// Kind of workflow a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    /// One-shot reminder ahead of a loan's due date.
    DueReminder,
    /// Open-ended engagement sequence for a member.
    Nurture,
}

impl ProcessKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DueReminder => "due-reminder",
            Self::Nurture => "nurture",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "due-reminder" => Some(Self::DueReminder),
            "nurture" => Some(Self::Nurture),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a run.
///
/// Completed runs are deleted rather than kept, so a stored run is
/// always in one of these two states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Waiting for its wake time.
    Scheduled,
    /// Cancelled; the scheduler skips it forever.
    Retired,
}

impl RunStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Retired => "retired",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position within a due-reminder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderStep {
    /// Send the reminder email. The only step.
    Send,
}

/// Position within a nurture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NurtureStep {
    /// Send the welcome email.
    SendWelcome,
    /// Check activity and send the matching engagement email.
    ///
    /// `cycle` starts at 1 and grows by one every pass, keeping each
    /// pass's send distinct for idempotency.
    Evaluate {
        /// One-based loop counter.
        cycle: u32,
    },
}

/// Cursor pointing at the next step of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCursor {
    /// Due-reminder position.
    Reminder(ReminderStep),
    /// Nurture position.
    Nurture(NurtureStep),
}

impl RunCursor {
    /// Parses a cursor from its stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "send-reminder" => Some(Self::Reminder(ReminderStep::Send)),
            "send-welcome" => Some(Self::Nurture(NurtureStep::SendWelcome)),
            _ => s
                .strip_prefix("evaluate:")
                .and_then(|n| n.parse().ok())
                .map(|cycle| Self::Nurture(NurtureStep::Evaluate { cycle })),
        }
    }
}

impl fmt::Display for RunCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reminder(ReminderStep::Send) => write!(f, "send-reminder"),
            Self::Nurture(NurtureStep::SendWelcome) => write!(f, "send-welcome"),
            Self::Nurture(NurtureStep::Evaluate { cycle }) => write!(f, "evaluate:{cycle}"),
        }
    }
}

/// Payload carried by a due-reminder run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    /// Borrower's email address.
    pub email: String,
    /// Borrower's display name.
    pub full_name: String,
    /// Title of the borrowed book.
    pub book_title: String,
    /// When the loan is due back.
    pub due_date: DateTime<Utc>,
}

/// Payload carried by a nurture run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NurturePayload {
    /// Member's email address.
    pub email: String,
    /// Member's display name.
    pub full_name: String,
}

/// A run as stored, with its cursor and wake time.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    /// Run ID.
    pub id: WorkflowRunId,
    /// Which workflow this run executes.
    pub kind: ProcessKind,
    /// Kind-specific payload, decoded when the step runs.
    pub payload: serde_json::Value,
    /// Next step to perform.
    pub cursor: RunCursor,
    /// Earliest time the scheduler should pick the run up.
    pub wake_at: DateTime<Utc>,
    /// Scheduled or retired.
    pub status: RunStatus,
    /// Failed attempts so far.
    pub attempts: u32,
}

/// An email a step wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Recipient address.
    pub to: String,
    /// Rendered subject and body.
    pub content: MailContent,
}

/// What executing one step produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Idempotency key for this step's side effect, unique per run.
    pub step_key: String,
    /// Email to send, if the step sends one.
    pub message: Option<PendingSend>,
    /// Where the run goes next.
    pub next: NextState,
}

/// Next position of a run after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Park the run until `wake_at`, then execute `cursor`.
    Sleep {
        /// Step to execute on wake.
        cursor: RunCursor,
        /// When to wake.
        wake_at: DateTime<Utc>,
    },
    /// The run is finished and its row can go away.
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_as_str() {
        assert_eq!(ProcessKind::DueReminder.as_str(), "due-reminder");
        assert_eq!(ProcessKind::Nurture.as_str(), "nurture");
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            ProcessKind::parse("due-reminder"),
            Some(ProcessKind::DueReminder)
        );
        assert_eq!(ProcessKind::parse("nurture"), Some(ProcessKind::Nurture));
        assert_eq!(ProcessKind::parse("digest"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Scheduled, RunStatus::Retired] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("completed"), None);
    }

    #[test]
    fn cursor_strings_round_trip() {
        let cursors = [
            RunCursor::Reminder(ReminderStep::Send),
            RunCursor::Nurture(NurtureStep::SendWelcome),
            RunCursor::Nurture(NurtureStep::Evaluate { cycle: 1 }),
            RunCursor::Nurture(NurtureStep::Evaluate { cycle: 42 }),
        ];
        for cursor in cursors {
            assert_eq!(RunCursor::parse(&cursor.to_string()), Some(cursor));
        }
    }

    #[test]
    fn cursor_parse_rejects_garbage() {
        assert_eq!(RunCursor::parse("evaluate:"), None);
        assert_eq!(RunCursor::parse("evaluate:abc"), None);
        assert_eq!(RunCursor::parse("send-digest"), None);
        assert_eq!(RunCursor::parse(""), None);
    }

    #[test]
    fn evaluate_cursor_embeds_the_cycle() {
        let cursor = RunCursor::Nurture(NurtureStep::Evaluate { cycle: 7 });
        assert_eq!(cursor.to_string(), "evaluate:7");
    }
}
