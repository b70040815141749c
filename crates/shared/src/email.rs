//! Outbound email port and implementations.
//!
//! All notification-class side effects go through the [`Mailer`] trait so the
//! workflow engine and the lending path can be exercised against an in-memory
//! recorder in tests. The production implementation uses `lettre` over SMTP.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use std::sync::Mutex;
use thiserror::Error;

use crate::config::EmailConfig;

/// Email errors.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Failed to build email message.
    #[error("Failed to build email: {0}")]
    BuildError(String),
    /// Failed to send email.
    #[error("Failed to send email: {0}")]
    SendError(String),
    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Sends notification emails. Fire-and-forget from the caller's point of
/// view; callers log failures and never roll back on them.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a plain-text email.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or delivered.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError>;
}

/// SMTP mailer backed by `lettre`.
#[derive(Clone)]
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    /// Creates a new SMTP mailer.
    #[must_use]
    pub const fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn create_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        let creds = Credentials::new(
            self.config.smtp_username.clone(),
            self.config.smtp_password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| EmailError::SendError(e.to_string()))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        Ok(transport)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);

        let email = Message::builder()
            .from(
                from.parse()
                    .map_err(|e| EmailError::InvalidAddress(format!("{e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| EmailError::InvalidAddress(format!("{e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EmailError::BuildError(e.to_string()))?;

        let transport = self.create_transport()?;
        transport
            .send(email)
            .await
            .map_err(|e| EmailError::SendError(e.to_string()))?;

        Ok(())
    }
}

/// A sent message captured by [`MemoryMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Message subject.
    pub subject: String,
    /// Message body.
    pub body: String,
}

/// In-memory mailer that records every message instead of delivering it.
///
/// Used by tests and by local development without an SMTP relay.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: Mutex<bool>,
}

impl MemoryMailer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Returns the number of messages recorded for `to`.
    #[must_use]
    pub fn sent_to(&self, to: &str) -> usize {
        self.sent().iter().filter(|m| m.to == to).count()
    }

    /// Makes every subsequent send fail, for exercising failure paths.
    pub fn fail_sends(&self, fail: bool) {
        if let Ok(mut f) = self.fail.lock() {
            *f = fail;
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(EmailError::SendError("simulated send failure".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| EmailError::SendError("recorder poisoned".to_string()))?
            .push(OutboundEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records_messages() {
        let mailer = MemoryMailer::new();
        mailer
            .send("reader@example.com", "Hello", "Welcome aboard")
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "reader@example.com");
        assert_eq!(sent[0].subject, "Hello");
        assert_eq!(mailer.sent_to("reader@example.com"), 1);
        assert_eq!(mailer.sent_to("other@example.com"), 0);
    }

    #[tokio::test]
    async fn memory_mailer_can_simulate_failure() {
        let mailer = MemoryMailer::new();
        mailer.fail_sends(true);
        assert!(mailer.send("a@b.c", "s", "b").await.is_err());
        assert!(mailer.sent().is_empty());

        mailer.fail_sends(false);
        assert!(mailer.send("a@b.c", "s", "b").await.is_ok());
        assert_eq!(mailer.sent().len(), 1);
    }
}
