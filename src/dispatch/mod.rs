//! Campaign intake and background dispatch.
//!
//! [`Dispatcher::submit`] is the synchronous phase: validate the request,
//! reserve quota, and only then hand the campaign to a detached background
//! task. The caller gets an answer before a single message moves; delivery
//! itself never blocks the submitting request.

mod task;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    address,
    config::Config,
    mailer::Mailer,
    quota::{QuotaError, QuotaStore, ReserveError},
};

/// A bulk message campaign as submitted by a user.
///
/// Transient: constructed per request, cloned into the background task, never
/// persisted. The credential in particular exists only for the lifetime of
/// the sends it authenticates.
#[derive(Debug, Clone)]
pub struct Campaign {
    /// Sender identity; quota key and "from" address.
    pub sender: String,
    /// Relay credential for `sender`.
    pub credential: String,
    pub subject: String,
    pub body: String,
    /// Raw recipient strings, contacted in this order.
    pub recipients: Vec<String>,
}

/// What the caller gets back when a campaign is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Number of recipients the background task will work through.
    pub recipient_count: usize,
    pub message: String,
}

/// Why a submission was refused. Every variant is side-effect free: nothing
/// was sent and no quota was consumed.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// A required field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The sender identity does not look like an address.
    #[error("Sender address is invalid")]
    InvalidSender,

    /// The identity's daily allowance cannot cover this campaign.
    #[error("Daily quota exceeded, {remaining} sends remaining")]
    QuotaExceeded { remaining: u32 },

    /// The quota ledger could not be read or written.
    #[error(transparent)]
    Storage(#[from] QuotaError),
}

impl From<ReserveError> for SubmitError {
    fn from(error: ReserveError) -> Self {
        match error {
            ReserveError::Exceeded { remaining, .. } => Self::QuotaExceeded { remaining },
            ReserveError::Storage(e) => Self::Storage(e),
        }
    }
}

/// Orchestrates validation, quota reservation, and background delivery.
#[derive(Debug)]
pub struct Dispatcher {
    config: Config,
    store: Arc<QuotaStore>,
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: Config, store: Arc<QuotaStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            store,
            mailer,
        }
    }

    /// Accept or refuse a campaign.
    ///
    /// On success the quota for `recipients.len() + 2` sends (recipients plus
    /// the self-confirmation and the telemetry notification) has been durably
    /// reserved and a detached task owns delivery; the returned [`Receipt`]
    /// does not wait for any send. Reserved quota is pessimistic: recipients
    /// later skipped or failed are not refunded.
    ///
    /// # Errors
    /// A [`SubmitError`]; all of them fail closed with zero side effects.
    pub async fn submit(&self, campaign: Campaign) -> Result<Receipt, SubmitError> {
        let mut campaign = campaign;
        campaign.sender = campaign.sender.trim().to_lowercase();

        validate(&campaign)?;

        let requested =
            u32::try_from(campaign.recipients.len()).unwrap_or(u32::MAX).saturating_add(2);

        let remaining = self
            .store
            .reserve(&campaign.sender, requested, self.config.daily_limit)
            .await?;

        info!(
            sender = %campaign.sender,
            recipients = campaign.recipients.len(),
            remaining,
            "Campaign accepted, handing off to background delivery"
        );

        let recipient_count = campaign.recipients.len();

        // Detached on purpose: the submitting request's lifetime and the
        // campaign's lifetime are independent, and there is no cancellation
        // of an accepted campaign
        tokio::spawn(task::run(
            self.mailer.clone(),
            campaign,
            self.config.pacing(),
            self.config.telemetry_address.clone(),
        ));

        Ok(Receipt {
            recipient_count,
            message: "Campaign accepted; delivery started in the background".to_string(),
        })
    }
}

fn validate(campaign: &Campaign) -> Result<(), SubmitError> {
    if campaign.sender.is_empty() {
        return Err(SubmitError::MissingField("sender"));
    }
    if campaign.credential.is_empty() {
        return Err(SubmitError::MissingField("credential"));
    }
    if campaign.subject.is_empty() {
        return Err(SubmitError::MissingField("subject"));
    }
    if campaign.body.is_empty() {
        return Err(SubmitError::MissingField("body"));
    }
    if campaign.recipients.is_empty() {
        return Err(SubmitError::MissingField("recipients"));
    }

    if !address::is_valid(&campaign.sender) {
        return Err(SubmitError::InvalidSender);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::mailer::MockMailer;

    use super::*;

    fn campaign() -> Campaign {
        Campaign {
            sender: "sender@example.com".to_string(),
            credential: "secret".to_string(),
            subject: "Hello".to_string(),
            body: "Hi {name}".to_string(),
            recipients: vec!["a@example.com".to_string()],
        }
    }

    async fn dispatcher(dir: &tempfile::TempDir, mailer: MockMailer) -> Dispatcher {
        let store = QuotaStore::open(dir.path().join("quota.json"))
            .await
            .expect("open store");
        Dispatcher::new(Config::default(), Arc::new(store), Arc::new(mailer))
    }

    #[tokio::test]
    async fn missing_fields_are_refused_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = MockMailer::new();
        let dispatcher = dispatcher(&dir, mailer.clone()).await;

        for (mutate, field) in [
            (
                Box::new(|c: &mut Campaign| c.sender.clear()) as Box<dyn Fn(&mut Campaign)>,
                "sender",
            ),
            (Box::new(|c: &mut Campaign| c.credential.clear()), "credential"),
            (Box::new(|c: &mut Campaign| c.subject.clear()), "subject"),
            (Box::new(|c: &mut Campaign| c.body.clear()), "body"),
            (Box::new(|c: &mut Campaign| c.recipients.clear()), "recipients"),
        ] {
            let mut campaign = campaign();
            mutate(&mut campaign);

            let err = dispatcher.submit(campaign).await.unwrap_err();
            match err {
                SubmitError::MissingField(name) => assert_eq!(name, field),
                other => panic!("Unexpected error: {other}"),
            }
        }

        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn malformed_sender_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = MockMailer::new();
        let dispatcher = dispatcher(&dir, mailer.clone()).await;

        let mut bad = campaign();
        bad.sender = "not-an-address".to_string();

        assert!(matches!(
            dispatcher.submit(bad).await.unwrap_err(),
            SubmitError::InvalidSender
        ));
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn sender_is_normalized_before_validation_and_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = MockMailer::new();
        let dispatcher = dispatcher(&dir, mailer.clone()).await;

        let mut mixed = campaign();
        mixed.sender = "  Sender@Example.COM ".to_string();

        dispatcher.submit(mixed).await.expect("accepted");
        mailer
            .wait_for_count(3, std::time::Duration::from_secs(5))
            .await
            .expect("all sends recorded");

        // Confirmation goes to the normalized identity
        assert_eq!(mailer.sent()[0].mail.sender, "sender@example.com");
        assert_eq!(mailer.sent()[0].mail.recipient, "sender@example.com");
    }
}
