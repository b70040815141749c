//! Workflow error types.
//!
//! This module defines all error types that can occur while scheduling
//! runs or driving them forward.

use thiserror::Error;

use libris_shared::types::WorkflowRunId;

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Run not found.
    #[error("workflow run {0} not found")]
    RunNotFound(WorkflowRunId),

    /// The stored payload does not decode for the run's kind.
    #[error("workflow run {run} has a malformed payload: {reason}")]
    MalformedPayload {
        /// The run whose payload failed to decode.
        run: WorkflowRunId,
        /// Decode failure detail.
        reason: String,
    },

    /// The stored cursor string does not name a known step.
    #[error("workflow run {run} has an unknown cursor: {cursor}")]
    UnknownCursor {
        /// The run carrying the cursor.
        run: WorkflowRunId,
        /// The unrecognized cursor string.
        cursor: String,
    },

    /// A step's email could not be sent.
    #[error("send failed: {0}")]
    Send(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl WorkflowError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RunNotFound(_) => 404,
            Self::Send(_) => 502,
            Self::MalformedPayload { .. } | Self::UnknownCursor { .. } | Self::Database(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::RunNotFound(_) => "RUN_NOT_FOUND",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::UnknownCursor { .. } => "UNKNOWN_CURSOR",
            Self::Send(_) => "SEND_FAILED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn nil_run() -> WorkflowRunId {
        WorkflowRunId::from_uuid(Uuid::nil())
    }

    #[test]
    fn test_run_not_found_error() {
        let err = WorkflowError::RunNotFound(nil_run());
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.error_code(), "RUN_NOT_FOUND");
    }

    #[test]
    fn test_malformed_payload_error() {
        let err = WorkflowError::MalformedPayload {
            run: nil_run(),
            reason: "missing field `email`".to_string(),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "MALFORMED_PAYLOAD");
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_unknown_cursor_error() {
        let err = WorkflowError::UnknownCursor {
            run: nil_run(),
            cursor: "send-digest".to_string(),
        };
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "UNKNOWN_CURSOR");
        assert!(err.to_string().contains("send-digest"));
    }

    #[test]
    fn test_send_error() {
        let err = WorkflowError::Send("smtp timeout".to_string());
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.error_code(), "SEND_FAILED");
    }

    #[test]
    fn test_database_error() {
        let err = WorkflowError::Database("connection refused".to_string());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
    }
}
