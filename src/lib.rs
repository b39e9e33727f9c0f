//! # mail-relay
//!
//! Relays trigger-tagged emails from an IMAP mailbox to WhatsApp.
//!
//! Each poll cycle connects to the mailbox, finds unseen messages whose
//! subject contains a trigger token, pulls the first phone number out of the
//! body, reformats the text for WhatsApp and sends it through the WhatsApp
//! Cloud API. Handled messages are flagged `\Seen`, so the mailbox itself is
//! the only queue.
//!
//! The crate provides:
//! - [`MailboxRelay`], the poll cycle, built from a [`SessionFactory`] and a
//!   [`Notifier`]
//! - [`spawn_poller`] to run it on a fixed interval
//! - [`webhook::router`], an axum router answering inbound WhatsApp messages
//! - [`RelayConfig`] to load all of it from the environment
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_relay::{
//!     spawn_poller, ImapSessionFactory, MailboxRelay, PhoneMatcher, RelayConfig,
//!     RelaySettings, WhatsAppClient,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> mail_relay::Result<()> {
//! let config = RelayConfig::from_env()?;
//!
//! let relay = Arc::new(MailboxRelay::new(
//!     Arc::new(ImapSessionFactory::new(config.imap.clone())),
//!     Arc::new(WhatsAppClient::new(config.whatsapp.clone())?),
//!     PhoneMatcher::new(),
//!     RelaySettings {
//!         mailbox: config.imap.mailbox.clone(),
//!         recent_subjects: config.polling.recent_subjects,
//!     },
//! ));
//!
//! let poller = spawn_poller(relay, config.polling.trigger_token, config.polling.interval);
//! // ... serve the webhook, wait for shutdown ...
//! poller.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pure helpers
//!
//! ```
//! use mail_relay::dispatcher::normalize_phone_number;
//! use mail_relay::formatter::format_for_whatsapp;
//! use mail_relay::matcher::extract_phone_number;
//!
//! let body = "Call me at 555-123-4567 **now**";
//! let phone = extract_phone_number(body).unwrap();
//!
//! assert_eq!(normalize_phone_number(&phone), "+5551234567");
//! assert_eq!(format_for_whatsapp(body), "Call me at 555-123-4567 *now*");
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. [`Error::category`] groups
//! errors for logging and [`Error::is_retryable`] flags transient ones.
//! [`MailboxRelay::poll`] itself never fails; it logs and summarizes.
//!
//! ## Observability
//!
//! The crate uses `tracing`. Spans:
//!
//! - `relay::poll` - one poll cycle (`server`, `mailbox`, `trigger_token`)
//! - `relay::process_message` - one candidate (`uid`)
//! - `session::open`, `session::select`, `session::search`, ... - IMAP commands
//! - `connection::establish_tls` - TCP and TLS setup
//! - `dispatcher::send` - one WhatsApp API call (`to`)
//!
//! Failures carry a `category` field with the [`ErrorCategory`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod known_servers;
pub mod matcher;
pub mod parser;
pub mod relay;
pub mod scheduler;
pub mod session;
pub mod webhook;

// Internal modules
mod connection;

// Re-exports for ergonomic API
pub use config::{
    ImapConfig, ImapConfigBuilder, PollingConfig, RelayConfig, TimeoutConfig, WebhookConfig,
    WhatsAppConfig,
};
pub use dispatcher::{Acknowledgment, Notifier, WhatsAppClient};
pub use error::{Error, ErrorCategory, Result};
pub use matcher::{Matcher, PhoneMatcher};
pub use relay::{CycleSummary, MailboxRelay, MessageOutcome, RelaySettings};
pub use scheduler::{spawn_poller, PollerHandle};
pub use session::{ImapSessionFactory, MailSession, SessionFactory, SessionState};
