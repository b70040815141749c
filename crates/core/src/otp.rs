//! One-time passcode issuance and verification.
//!
//! Codes are six digits, stored under a key derived from the normalized
//! email address, and expire after five minutes. Verification is a plain
//! string comparison against the stored code; a mismatch leaves the code
//! in place so the holder can retry until it expires.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use libris_shared::{KeyedStore, KeyedStoreError, Mailer};

use crate::notifications;

/// How long an issued code stays valid.
pub const OTP_TTL: Duration = Duration::from_secs(300);

/// Store key for the pending code of `email`.
///
/// The address is trimmed and lowercased so that re-requests with
/// different casing land on the same entry.
#[must_use]
pub fn otp_key(email: &str) -> String {
    format!("otp:{}", email.trim().to_lowercase())
}

/// Generates a random six-digit code.
#[must_use]
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

/// Errors produced by the OTP flow.
#[derive(Debug, Error)]
pub enum OtpError {
    /// The backing store was unreachable or rejected the operation.
    #[error("otp store error: {0}")]
    Store(#[from] KeyedStoreError),
}

impl OtpError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Store(_) => 500,
        }
    }

    /// Returns the error code string for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Store(_) => "OTP_STORE_ERROR",
        }
    }
}

/// Issues, verifies, and consumes one-time passcodes.
pub struct OtpFlow {
    store: Arc<dyn KeyedStore>,
    mailer: Arc<dyn Mailer>,
}

impl OtpFlow {
    /// Creates a new flow over the given store and mailer.
    #[must_use]
    pub fn new(store: Arc<dyn KeyedStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Generates a code for `email`, stores it, and mails it out.
    ///
    /// The code is persisted before the email is sent. A send failure is
    /// logged and the call still succeeds: the code is live and the
    /// caller can ask for a resend.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store write fails.
    pub async fn issue(&self, email: &str, full_name: &str) -> Result<(), OtpError> {
        let code = generate_code();
        self.store
            .set(&otp_key(email), Value::String(code.clone()), OTP_TTL)
            .await?;

        let content = notifications::otp_code(full_name, &code);
        if let Err(e) = self.mailer.send(email, &content.subject, &content.body).await {
            tracing::error!(email, error = %e, "failed to send otp email");
        }
        Ok(())
    }

    /// Checks `code` against the stored code for `email`.
    ///
    /// Returns false when no code is stored (never issued or expired) or
    /// when the code does not match. A mismatch does not consume the
    /// stored code.
    ///
    /// # Errors
    ///
    /// Returns an error when the store read fails.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool, OtpError> {
        let stored = self.store.get(&otp_key(email)).await?;
        let Some(value) = stored else {
            return Ok(false);
        };
        let stored_code = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(stored_code == code.trim())
    }

    /// Discards any pending code for `email` and issues a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error when a store operation fails.
    pub async fn resend(&self, email: &str, full_name: &str) -> Result<(), OtpError> {
        self.store.delete(&otp_key(email)).await?;
        self.issue(email, full_name).await
    }

    /// Removes the stored code for `email` after a successful flow.
    ///
    /// # Errors
    ///
    /// Returns an error when the store delete fails.
    pub async fn consume(&self, email: &str) -> Result<(), OtpError> {
        self.store.delete(&otp_key(email)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_shared::{MemoryKeyedStore, MemoryMailer};

    fn flow() -> (OtpFlow, Arc<MemoryKeyedStore>, Arc<MemoryMailer>) {
        let store = Arc::new(MemoryKeyedStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let flow = OtpFlow::new(store.clone(), mailer.clone());
        (flow, store, mailer)
    }

    async fn stored_code(store: &MemoryKeyedStore, email: &str) -> String {
        match store.get(&otp_key(email)).await.unwrap() {
            Some(Value::String(s)) => s,
            other => panic!("expected stored code, got {other:?}"),
        }
    }

    #[test]
    fn key_normalizes_email() {
        assert_eq!(otp_key("  Ada@Example.COM "), "otp:ada@example.com");
        assert_eq!(otp_key("ada@example.com"), "otp:ada@example.com");
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.chars().next(), Some('0'));
        }
    }

    #[tokio::test]
    async fn issue_stores_and_mails_the_code() {
        let (flow, store, mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();

        let code = stored_code(&store, "ada@example.com").await;
        assert_eq!(code.len(), 6);
        assert_eq!(mailer.sent_to("ada@example.com"), 1);
        assert!(mailer.sent()[0].body.contains(&code));
    }

    #[tokio::test]
    async fn verify_matches_the_stored_code() {
        let (flow, store, _mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();
        let code = stored_code(&store, "ada@example.com").await;

        assert!(flow.verify("ada@example.com", &code).await.unwrap());
        // Different casing of the address hits the same entry.
        assert!(flow.verify("ADA@example.com", &code).await.unwrap());
        assert!(!flow.verify("ada@example.com", "000000").await.unwrap());
    }

    #[tokio::test]
    async fn mismatch_does_not_consume_the_code() {
        let (flow, store, _mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();
        let code = stored_code(&store, "ada@example.com").await;

        assert!(!flow.verify("ada@example.com", "999999").await.unwrap());
        assert!(flow.verify("ada@example.com", &code).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_code_no_longer_verifies() {
        let (flow, store, _mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();
        let code = stored_code(&store, "ada@example.com").await;

        tokio::time::advance(OTP_TTL + Duration::from_secs(1)).await;
        assert!(!flow.verify("ada@example.com", &code).await.unwrap());
    }

    #[tokio::test]
    async fn resend_supersedes_the_previous_code() {
        let (flow, store, mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();
        let first = stored_code(&store, "ada@example.com").await;

        flow.resend("ada@example.com", "Ada").await.unwrap();
        let second = stored_code(&store, "ada@example.com").await;

        assert!(flow.verify("ada@example.com", &second).await.unwrap());
        if first != second {
            assert!(!flow.verify("ada@example.com", &first).await.unwrap());
        }
        assert_eq!(mailer.sent_to("ada@example.com"), 2);
    }

    #[tokio::test]
    async fn consume_removes_the_code() {
        let (flow, store, _mailer) = flow();
        flow.issue("ada@example.com", "Ada").await.unwrap();
        let code = stored_code(&store, "ada@example.com").await;

        flow.consume("ada@example.com").await.unwrap();
        assert!(!flow.verify("ada@example.com", &code).await.unwrap());
    }

    #[tokio::test]
    async fn send_failure_still_issues_the_code() {
        let (flow, store, mailer) = flow();
        mailer.fail_sends(true);

        flow.issue("ada@example.com", "Ada").await.unwrap();
        let code = stored_code(&store, "ada@example.com").await;
        assert!(flow.verify("ada@example.com", &code).await.unwrap());
    }
}
