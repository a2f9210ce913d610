//! The detached delivery task for one accepted campaign.
//!
//! Runs independently of the request that created it. Quota was already
//! reserved; from here on every failure is isolated: a refused confirmation,
//! telemetry, or recipient send is logged and the campaign keeps going.
//! There is no retry and no cancellation.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    address,
    mailer::{Mailer, OutboundMail},
};

use super::Campaign;

/// Tag prefixed to the self-confirmation subject.
const TOOL_TAG: &str = "CAMPAIGNER";

/// Placeholder substituted with the recipient's capitalized local part.
const NAME_PLACEHOLDER: &str = "{name}";

/// Appended to every personalized recipient body.
const WATERMARK: &str = "\n\nSent with Campaigner (https://campaigner.tools)\n";

/// Subject of the telemetry notification sent to the operator address.
const TELEMETRY_SUBJECT: &str = "Campaigner usage notification";

/// Fixed self-confirmation body, promotional footer included.
const CONFIRMATION_BODY: &str = "\
<!DOCTYPE html>
<html>
  <body style=\"font-family: Arial, sans-serif; color: #333;\">
    <h1>Your campaign is being processed</h1>
    <p>Your message is being delivered to your recipient list. Depending on
    the list size this can take a while; sends are paced to respect relay
    limits.</p>
    <p>This confirmation in your sent folder is your record that the campaign
    was accepted and the recipient count matched your expectations.</p>
    <p style=\"font-size: 12px; color: #777; border-top: 1px solid #eee;
    padding-top: 10px;\">
      Sent with <a href=\"https://campaigner.tools\">Campaigner</a>
    </p>
  </body>
</html>
";

/// Substitute the name placeholder and append the watermark.
fn personalize(body: &str, recipient: &str) -> String {
    let mut personalized = body.replace(NAME_PLACEHOLDER, &address::personal_name(recipient));
    personalized.push_str(WATERMARK);
    personalized
}

/// Deliver one campaign: self-confirmation, telemetry, then every recipient
/// in input order with a fixed pacing delay between consecutive sends.
pub(super) async fn run(
    mailer: Arc<dyn Mailer>,
    campaign: Campaign,
    pacing: Duration,
    telemetry_address: String,
) {
    // 1. Self-confirmation, so the sender has a record in their own mailbox
    let confirmation = OutboundMail {
        sender: campaign.sender.clone(),
        credential: campaign.credential.clone(),
        recipient: campaign.sender.clone(),
        subject: format!("[FROM {TOOL_TAG}] {}", campaign.subject),
        body: CONFIRMATION_BODY.to_string(),
        html: true,
    };
    if let Err(e) = mailer.send(&confirmation).await {
        warn!(sender = %campaign.sender, error = %e, "Confirmation send failed");
    }

    // 2. Usage telemetry. Only the sender identity and the recipient count
    // cross this boundary; the body and the recipient list never do.
    let telemetry = OutboundMail {
        sender: campaign.sender.clone(),
        credential: campaign.credential.clone(),
        recipient: telemetry_address,
        subject: TELEMETRY_SUBJECT.to_string(),
        body: format!(
            "Sender: {}\nRecipient count: {}\n",
            campaign.sender,
            campaign.recipients.len()
        ),
        html: false,
    };
    if let Err(e) = mailer.send(&telemetry).await {
        warn!(sender = %campaign.sender, error = %e, "Telemetry send failed");
    }

    // 3. The recipients, in input order
    let total = campaign.recipients.len();
    for (index, recipient) in campaign.recipients.iter().enumerate() {
        if !address::is_valid(recipient) {
            // Quota for skipped recipients stays reserved; the reservation
            // was pessimistic and is not reconciled against actual sends
            debug!(%recipient, "Skipping invalid recipient");
            continue;
        }

        let mail = OutboundMail {
            sender: campaign.sender.clone(),
            credential: campaign.credential.clone(),
            recipient: recipient.clone(),
            subject: campaign.subject.clone(),
            body: personalize(&campaign.body, recipient),
            html: false,
        };

        if let Err(e) = mailer.send(&mail).await {
            warn!(%recipient, error = %e, "Recipient send failed, continuing");
        }

        if index + 1 < total {
            tokio::time::sleep(pacing).await;
        }
    }

    info!(
        sender = %campaign.sender,
        recipients = total,
        "Campaign delivery finished"
    );
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn personalize_substitutes_and_watermarks() {
        let body = personalize("Hi {name}, offer inside", "jane.doe@example.com");
        assert!(body.starts_with("Hi Jane.doe, offer inside"));
        assert!(body.ends_with(WATERMARK));
    }

    #[test]
    fn personalize_without_placeholder_only_watermarks() {
        let body = personalize("No greeting", "jane@example.com");
        assert_eq!(body, format!("No greeting{WATERMARK}"));
    }
}
