//! Mail-session abstraction and its async-imap implementation.
//!
//! A poll cycle talks to the mail server exclusively through the
//! [`MailSession`] trait, obtained from a [`SessionFactory`]. The production
//! implementation is [`ImapSessionFactory`], which opens an implicit-TLS IMAP
//! connection per cycle; tests substitute in-memory fakes.
//!
//! Every session tracks its [`SessionState`]. Teardown decides whether a
//! CLOSE is needed from that state rather than from the outcome of earlier
//! commands.

use crate::config::{ImapConfig, TimeoutConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use crate::parser;
use async_imap::types::Fetch;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

/// Selection state of a mail session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is selected; search, fetch and store are allowed.
    Selected,
    /// LOGOUT was issued; the session is unusable.
    LoggedOut,
}

/// Commands that change the selection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// SELECT a mailbox.
    Select,
    /// CLOSE the selected mailbox.
    Close,
    /// LOGOUT.
    Logout,
}

impl SessionState {
    /// Transition table. `None` means the event is not allowed in this state.
    #[must_use]
    pub fn on(self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent::{Close, Logout, Select};
        use SessionState::{Authenticated, LoggedOut, Selected};

        match (self, event) {
            (Authenticated | Selected, Select) => Some(Selected),
            (Selected, Close) => Some(Authenticated),
            (Authenticated | Selected, Logout) => Some(LoggedOut),
            (Authenticated, Close) | (LoggedOut, Select | Close | Logout) => None,
        }
    }

    /// Like [`on`](Self::on), but reports a rejected event as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionState`] when the table has no entry.
    pub fn apply(self, event: SessionEvent) -> Result<SessionState> {
        self.on(event).ok_or(Error::InvalidSessionState {
            state: self.as_str(),
            event: event.as_str(),
        })
    }

    /// Stable lowercase name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Authenticated => "authenticated",
            SessionState::Selected => "selected",
            SessionState::LoggedOut => "logged_out",
        }
    }
}

impl SessionEvent {
    /// Stable lowercase name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEvent::Select => "select",
            SessionEvent::Close => "close",
            SessionEvent::Logout => "logout",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authenticated conversation with the mail server.
///
/// Message identifiers are IMAP UIDs.
#[async_trait]
pub trait MailSession: Send {
    /// Current selection state.
    fn state(&self) -> SessionState;

    /// Selects `mailbox` and returns the number of messages it holds.
    async fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// Runs a UID SEARCH and returns matching UIDs in ascending order.
    async fn search(&mut self, query: &str) -> Result<Vec<u32>>;

    /// Fetches the raw RFC 822 message without setting `\Seen`.
    ///
    /// Returns `Ok(None)` if the server sent no body for the UID.
    async fn fetch_message(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Fetches the subject of each UID without setting `\Seen`.
    async fn fetch_subjects(&mut self, uids: &[u32]) -> Result<Vec<(u32, Option<String>)>>;

    /// Adds the `\Seen` flag to a message.
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// Closes the selected mailbox.
    async fn close(&mut self) -> Result<()>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens a fresh [`MailSession`] for each poll cycle.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connects and authenticates. The returned session has no mailbox selected.
    async fn open(&self) -> Result<Box<dyn MailSession>>;

    /// Address of the server, for logging.
    fn server_address(&self) -> String;
}

/// Quotes a string for use inside an IMAP SEARCH criterion.
#[must_use]
pub fn quote(value: &str) -> String {
    let escaped = value.replace('\\', r"\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

type ImapClientSession = async_imap::Session<TlsStream>;

/// [`SessionFactory`] backed by a real IMAP server.
#[derive(Debug, Clone)]
pub struct ImapSessionFactory {
    config: ImapConfig,
}

impl ImapSessionFactory {
    /// Creates a factory that connects with `config` on every [`open`](SessionFactory::open).
    #[must_use]
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for ImapSessionFactory {
    #[instrument(
        name = "session::open",
        skip_all,
        fields(email = %self.config.email(), imap_host = %self.config.effective_imap_host())
    )]
    async fn open(&self) -> Result<Box<dyn MailSession>> {
        let config = &self.config;
        let imap_host = config.effective_imap_host();
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&imap_host, &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let client = async_imap::Client::new(tls_stream);
        let session = tokio::time::timeout(
            timeouts.auth,
            client.login(config.email(), config.password()),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            email: config.email().to_string(),
            timeout: timeouts.auth,
        })?
        .map_err(|(source, _client)| Error::ImapLogin {
            email: config.email().to_string(),
            source,
        })?;

        debug!("Authenticated");

        Ok(Box::new(ImapSession {
            inner: session,
            state: SessionState::Authenticated,
            timeouts: timeouts.clone(),
        }))
    }

    fn server_address(&self) -> String {
        self.config.server_address()
    }
}

/// [`MailSession`] over an async-imap session.
pub struct ImapSession {
    inner: ImapClientSession,
    state: SessionState,
    timeouts: TimeoutConfig,
}

impl ImapSession {
    fn ensure_selected(&self, command: &'static str) -> Result<()> {
        if self.state == SessionState::Selected {
            Ok(())
        } else {
            Err(Error::InvalidSessionState {
                state: self.state.as_str(),
                event: command,
            })
        }
    }
}

async fn bounded<T, F>(command: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::CommandTimeout { command, timeout })?
}

#[async_trait]
impl MailSession for ImapSession {
    fn state(&self) -> SessionState {
        self.state
    }

    #[instrument(name = "session::select", skip(self), fields(mailbox = %mailbox))]
    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let next = self.state.apply(SessionEvent::Select)?;
        let timeout = self.timeouts.select;

        let status = bounded("SELECT", timeout, async {
            self.inner
                .select(mailbox)
                .await
                .map_err(|source| Error::SelectMailbox {
                    mailbox: mailbox.to_string(),
                    source,
                })
        })
        .await?;

        self.state = next;
        debug!(exists = status.exists, "Mailbox selected");
        Ok(status.exists)
    }

    #[instrument(name = "session::search", skip(self), fields(query = %query))]
    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        self.ensure_selected("search")?;
        let timeout = self.timeouts.search;

        let uids = bounded("SEARCH", timeout, async {
            self.inner
                .uid_search(query)
                .await
                .map_err(|source| Error::ImapSearch {
                    query: query.to_string(),
                    source,
                })
        })
        .await?;

        // the server returns an unordered set; UID order is arrival order
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();

        debug!(uid_count = uids.len(), "Search complete");
        Ok(uids)
    }

    #[instrument(name = "session::fetch_message", skip(self))]
    async fn fetch_message(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        self.ensure_selected("fetch")?;
        let timeout = self.timeouts.fetch;

        let fetches = bounded("FETCH", timeout, async {
            let fetched = async {
                let stream = self.inner.uid_fetch(uid.to_string(), "BODY.PEEK[]").await?;
                stream.try_collect::<Vec<Fetch>>().await
            };
            fetched.await.map_err(|source| Error::ImapFetch { uid, source })
        })
        .await?;

        Ok(fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.first())
            .and_then(Fetch::body)
            .map(<[u8]>::to_vec))
    }

    #[instrument(name = "session::fetch_subjects", skip(self), fields(uid_count = uids.len()))]
    async fn fetch_subjects(&mut self, uids: &[u32]) -> Result<Vec<(u32, Option<String>)>> {
        self.ensure_selected("fetch")?;
        let Some(&first) = uids.first() else {
            return Ok(Vec::new());
        };
        let timeout = self.timeouts.fetch;
        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let fetches = bounded("FETCH", timeout, async {
            let fetched = async {
                let stream = self.inner.uid_fetch(&uid_set, "BODY.PEEK[HEADER]").await?;
                stream.try_collect::<Vec<Fetch>>().await
            };
            fetched
                .await
                .map_err(|source| Error::ImapFetch { uid: first, source })
        })
        .await?;

        let mut subjects: Vec<(u32, Option<String>)> = fetches
            .iter()
            .filter_map(|f| {
                let uid = f.uid?;
                Some((uid, f.header().and_then(parser::subject_from_header)))
            })
            .collect();
        subjects.sort_unstable_by_key(|(uid, _)| *uid);
        Ok(subjects)
    }

    #[instrument(name = "session::mark_seen", skip(self))]
    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.ensure_selected("store")?;
        let timeout = self.timeouts.store;

        bounded("STORE", timeout, async {
            let stored = async {
                let stream = self.inner.uid_store(uid.to_string(), "+FLAGS (\\Seen)").await?;
                // the untagged FETCH responses must be drained before the next command
                stream.try_collect::<Vec<Fetch>>().await
            };
            stored
                .await
                .map(drop)
                .map_err(|source| Error::ImapStore { uid, source })
        })
        .await
    }

    #[instrument(name = "session::close", skip(self))]
    async fn close(&mut self) -> Result<()> {
        let next = self.state.apply(SessionEvent::Close)?;
        let timeout = self.timeouts.logout;

        bounded("CLOSE", timeout, async {
            self.inner
                .close()
                .await
                .map_err(|source| Error::ImapClose { source })
        })
        .await?;

        self.state = next;
        Ok(())
    }

    #[instrument(name = "session::logout", skip(self))]
    async fn logout(&mut self) -> Result<()> {
        self.state.apply(SessionEvent::Logout)?;
        // whatever the server answers, the session is finished
        self.state = SessionState::LoggedOut;
        let timeout = self.timeouts.logout;

        bounded("LOGOUT", timeout, async {
            self.inner
                .logout()
                .await
                .map_err(|source| Error::ImapLogout { source })
        })
        .await
    }
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession")
            .field("state", &self.state)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
