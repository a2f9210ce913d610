//! Quota-gated bulk mail campaign dispatcher with recipient list extraction.
//!
//! Two subsystems share this crate:
//!
//! - the **campaign dispatcher** ([`dispatch`]): accepts a campaign,
//!   atomically reserves quota against a durable per-identity rolling
//!   counter ([`quota`]), and delivers it from a detached background task
//!   through an injected [`mailer::Mailer`] with fixed inter-message pacing;
//! - the **extraction pipeline** ([`extract`]): turns uploaded list files
//!   (plain lists, CSV tables, spreadsheets) into a deduplicated, validated
//!   candidate address set via a sampled address-column heuristic.
//!
//! Transport, routing, and templating live outside the crate; the only
//! collaborator seam is the [`mailer::Mailer`] trait.

pub mod address;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod logging;
pub mod mailer;
pub mod quota;

pub use config::Config;
pub use dispatch::{Campaign, Dispatcher, Receipt, SubmitError};
pub use extract::{extract, Extraction, FileFormat, UploadedFile};
pub use mailer::{Mailer, MailerError, MockMailer, OutboundMail};
pub use quota::{QuotaRecord, QuotaStore, ReserveError};
