//! The outbound mail collaborator.
//!
//! Actual transport (SMTP session, authentication, TLS) lives outside this
//! crate; the dispatcher only knows the [`Mailer`] trait. [`MockMailer`] is
//! exported for tests and for wiring the dispatcher up before a real relay
//! implementation exists.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

/// A single message handed to the relay.
#[derive(Debug, Clone)]
pub struct OutboundMail {
    /// Sender identity, also the authenticated relay account.
    pub sender: String,
    /// Relay credential. Never persisted, never logged.
    pub credential: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Whether `body` is HTML rather than plain text.
    pub html: bool,
}

/// Relay failures. The dispatcher treats every kind identically: log and
/// continue, never retry within the same pass.
#[derive(Debug, Clone, Error)]
pub enum MailerError {
    /// The relay rejected the credential.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The relay rejected the transaction at the protocol level.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Anything else (connect failure, timeout, ...).
    #[error("Send failed: {0}")]
    Other(String),
}

/// Trait for delivering one message through an authenticated relay.
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// Deliver `mail`, blocking (asynchronously) until the relay accepts or
    /// rejects it.
    ///
    /// # Errors
    /// A [`MailerError`] describing why the relay refused the message.
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailerError>;
}

/// A delivered message as recorded by [`MockMailer`].
#[derive(Debug, Clone)]
pub struct SentMail {
    pub mail: OutboundMail,
    /// When the mock accepted it, on the tokio clock so paused-time tests see
    /// pacing delays.
    pub at: tokio::time::Instant,
}

/// Mock relay for tests.
///
/// Records every send in order and can be told to fail for specific
/// recipients.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    failing: Arc<Mutex<Vec<String>>>,
    notify: Arc<Notify>,
}

impl MockMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message accepted so far, in send order.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("MockMailer sent mutex poisoned").clone()
    }

    /// Number of messages accepted so far.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("MockMailer sent mutex poisoned").len()
    }

    /// Make every send to `recipient` fail with a protocol error.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.failing
            .lock()
            .expect("MockMailer failing mutex poisoned")
            .push(recipient.into());
    }

    /// Wait until at least `expected` messages were accepted, with a timeout.
    ///
    /// # Errors
    /// Returns an error if the timeout elapses first.
    pub async fn wait_for_count(
        &self,
        expected: usize,
        timeout: std::time::Duration,
    ) -> Result<(), tokio::time::error::Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                if self.sent_count() >= expected {
                    return;
                }
                self.notify.notified().await;
            }
        })
        .await
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailerError> {
        let refused = self
            .failing
            .lock()
            .expect("MockMailer failing mutex poisoned")
            .contains(&mail.recipient);
        if refused {
            // Failures still count as an attempt the task had to get past
            self.notify.notify_waiters();
            return Err(MailerError::Protocol(format!(
                "550 refused for {}",
                mail.recipient
            )));
        }

        self.sent
            .lock()
            .expect("MockMailer sent mutex poisoned")
            .push(SentMail {
                mail: mail.clone(),
                at: tokio::time::Instant::now(),
            });
        self.notify.notify_waiters();

        Ok(())
    }
}
