//! The mailbox connector: one poll cycle from session open to teardown.
//!
//! [`MailboxRelay::poll`] opens a fresh [`MailSession`], selects the mailbox,
//! searches for unseen messages whose subject carries the trigger token and
//! relays each of them:
//!
//! ```text
//! fetch (peek) → decode → extract phone → format → send → mark \Seen
//! ```
//!
//! Every candidate is marked seen once it has been looked at, whether or not
//! the dispatch succeeded. Only errors from the mail session abort a cycle;
//! the session is closed and logged out in every case.
//!
//! # Example
//!
//! ```no_run
//! use mail_relay::{
//!     ImapConfig, ImapSessionFactory, MailboxRelay, PhoneMatcher, RelaySettings,
//!     WhatsAppClient, WhatsAppConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> mail_relay::Result<()> {
//! let imap = ImapConfig::builder()
//!     .email("alerts@example.com")
//!     .password("app-password")
//!     .build()?;
//! let whatsapp = WhatsAppClient::new(WhatsAppConfig::new("10987", "token"))?;
//!
//! let relay = MailboxRelay::new(
//!     Arc::new(ImapSessionFactory::new(imap)),
//!     Arc::new(whatsapp),
//!     PhoneMatcher::new(),
//!     RelaySettings::default(),
//! );
//!
//! let summary = relay.poll("WHATSAPP_NOTIFICATION").await;
//! println!("dispatched {} message(s)", summary.dispatched);
//! # Ok(())
//! # }
//! ```

use crate::config::DEFAULT_MAILBOX;
use crate::dispatcher::{normalize_phone_number, Notifier};
use crate::error::{Error, Result};
use crate::formatter::format_for_whatsapp;
use crate::matcher::Matcher;
use crate::parser;
use crate::session::{quote, MailSession, SessionFactory, SessionState};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Mailbox-level settings of a [`MailboxRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Mailbox to select. Defaults to `INBOX`.
    pub mailbox: String,
    /// How many of the newest subjects to log each cycle. `0` disables it.
    pub recent_subjects: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            mailbox: DEFAULT_MAILBOX.to_string(),
            recent_subjects: 5,
        }
    }
}

/// What happened to one candidate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The provider accepted the notification.
    Dispatched {
        /// Normalized destination number.
        destination: String,
        /// Provider message id, when returned.
        message_id: Option<String>,
    },
    /// The body contains nothing phone-shaped.
    NoPhoneNumber,
    /// The payload was missing or could not be decoded.
    Undecodable,
    /// The dispatch was attempted and failed.
    DispatchFailed {
        /// Normalized destination number.
        destination: String,
    },
}

/// Counters describing one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Messages matching `UNSEEN SUBJECT <token>`.
    pub candidates: usize,
    /// Notifications accepted by the provider.
    pub dispatched: usize,
    /// Messages skipped without a dispatch (no phone number or undecodable).
    pub skipped: usize,
    /// Dispatch attempts that failed.
    pub dispatch_failures: usize,
    /// Messages flagged `\Seen`.
    pub marked_seen: usize,
    /// Whether a mail-session error ended the cycle early.
    pub aborted: bool,
}

impl CycleSummary {
    fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Dispatched { .. } => self.dispatched += 1,
            MessageOutcome::NoPhoneNumber | MessageOutcome::Undecodable => self.skipped += 1,
            MessageOutcome::DispatchFailed { .. } => self.dispatch_failures += 1,
        }
    }
}

/// Relays trigger emails from a mailbox to WhatsApp.
///
/// Holds no session between cycles. Concurrent calls to [`poll`](Self::poll)
/// on the same relay never overlap: the later one returns immediately.
pub struct MailboxRelay {
    sessions: Arc<dyn SessionFactory>,
    notifier: Arc<dyn Notifier>,
    matcher: Box<dyn Matcher>,
    settings: RelaySettings,
    active: Mutex<()>,
}

impl MailboxRelay {
    /// Creates a relay from its collaborators.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        notifier: Arc<dyn Notifier>,
        matcher: impl Matcher + 'static,
        settings: RelaySettings,
    ) -> Self {
        Self {
            sessions,
            notifier,
            matcher: Box::new(matcher),
            settings,
            active: Mutex::new(()),
        }
    }

    /// Settings this relay was built with.
    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Runs one poll cycle.
    ///
    /// Never fails: errors are logged with their category and reflected in
    /// the returned [`CycleSummary`].
    #[instrument(
        name = "relay::poll",
        skip(self),
        fields(server = %self.sessions.server_address(), mailbox = %self.settings.mailbox)
    )]
    pub async fn poll(&self, trigger_token: &str) -> CycleSummary {
        let mut summary = CycleSummary::default();

        if trigger_token.is_empty() {
            warn!("Empty trigger token, skipping cycle");
            return summary;
        }

        let Ok(_active) = self.active.try_lock() else {
            warn!("Previous poll cycle still running, skipping");
            return summary;
        };

        let mut session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, category = %e.category(), "Failed to open mail session");
                summary.aborted = true;
                return summary;
            }
        };

        if let Err(e) = self
            .run_cycle(session.as_mut(), trigger_token, &mut summary)
            .await
        {
            error!(error = %e, category = %e.category(), "Poll cycle aborted");
            summary.aborted = true;
        }

        teardown(session.as_mut()).await;

        info!(
            candidates = summary.candidates,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            dispatch_failures = summary.dispatch_failures,
            marked_seen = summary.marked_seen,
            aborted = summary.aborted,
            "Poll cycle finished"
        );
        summary
    }

    async fn run_cycle(
        &self,
        session: &mut dyn MailSession,
        trigger_token: &str,
        summary: &mut CycleSummary,
    ) -> Result<()> {
        let exists = session.select(&self.settings.mailbox).await?;
        info!(exists, "Mailbox selected");

        let unseen = session.search("UNSEEN").await?;
        info!(unseen = unseen.len(), "Unread messages");

        let candidates = session
            .search(&format!("UNSEEN SUBJECT {}", quote(trigger_token)))
            .await?;
        summary.candidates = candidates.len();
        info!(candidates = candidates.len(), "Trigger messages found");

        self.log_recent_subjects(session).await;

        for uid in candidates {
            let outcome = self.process_message(session, uid).await?;
            summary.record(&outcome);

            session.mark_seen(uid).await?;
            summary.marked_seen += 1;
            debug!(uid, ?outcome, "Message marked seen");
        }

        Ok(())
    }

    /// Logs the subjects of the newest messages. Failures are only logged.
    async fn log_recent_subjects(&self, session: &mut dyn MailSession) {
        let limit = self.settings.recent_subjects;
        if limit == 0 {
            return;
        }

        let recent = async {
            let all = session.search("ALL").await?;
            let start = all.len().saturating_sub(limit);
            session.fetch_subjects(&all[start..]).await
        };

        match recent.await {
            Ok(subjects) => {
                for (uid, subject) in subjects {
                    info!(uid, subject = subject.as_deref().unwrap_or(""), "Recent message");
                }
            }
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Could not list recent subjects");
            }
        }
    }

    #[instrument(name = "relay::process_message", skip(self, session))]
    async fn process_message(
        &self,
        session: &mut dyn MailSession,
        uid: u32,
    ) -> Result<MessageOutcome> {
        let decoded = match session.fetch_message(uid).await? {
            Some(raw) => parser::decode_message(&raw),
            None => Err(Error::MissingBody { uid }),
        };

        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Skipping undecodable message");
                return Ok(MessageOutcome::Undecodable);
            }
        };

        info!(subject = message.subject.as_deref().unwrap_or(""), "Processing message");

        let Some(phone) = self.matcher.find_match(&message.text) else {
            warn!(matcher = self.matcher.description(), "No phone number in message body");
            return Ok(MessageOutcome::NoPhoneNumber);
        };

        let destination = normalize_phone_number(&phone);
        let body = format_for_whatsapp(&message.text);

        match self.notifier.send(&destination, &body).await {
            Ok(ack) => {
                info!(to = %destination, "Notification dispatched");
                Ok(MessageOutcome::Dispatched {
                    destination,
                    message_id: ack.message_id().map(str::to_string),
                })
            }
            Err(e) => {
                error!(
                    to = %destination,
                    content = %body,
                    error = %e,
                    category = %e.category(),
                    retryable = e.is_retryable(),
                    "Failed to dispatch notification"
                );
                Ok(MessageOutcome::DispatchFailed { destination })
            }
        }
    }
}

impl std::fmt::Debug for MailboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxRelay")
            .field("server", &self.sessions.server_address())
            .field("matcher", &self.matcher.description())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Closes the mailbox if one is selected, then logs out.
async fn teardown(session: &mut dyn MailSession) {
    if session.state() == SessionState::Selected {
        if let Err(e) = session.close().await {
            warn!(error = %e, category = %e.category(), "CLOSE failed during teardown");
        }
    }

    if session.state() != SessionState::LoggedOut {
        if let Err(e) = session.logout().await {
            warn!(error = %e, category = %e.category(), "LOGOUT failed during teardown");
        }
    }
}
