//! Error types for the mail-relay crate.
//!
//! Every failure in the relay pipeline is a variant of [`Error`]. Variants are
//! grouped by [`ErrorCategory`] so that log events can carry a stable
//! `category` field, and [`Error::is_retryable`] tells whether the next poll
//! cycle has a chance of succeeding where this one failed.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying mail to the messaging API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid mailbox address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The rejected address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// A required environment variable is not set.
    #[error("missing environment variable {name}")]
    MissingEnvVar {
        /// Variable name.
        name: &'static str,
    },

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value '{value}' for environment variable {name}")]
    InvalidEnvVar {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeouts (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The mailbox address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// An IMAP command on an established session timed out.
    #[error("IMAP {command} timed out after {timeout:?}")]
    CommandTimeout {
        /// The IMAP command (SELECT, SEARCH, FETCH, ...).
        command: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The mailbox address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed for query {query}")]
    ImapSearch {
        /// The search criteria sent to the server.
        query: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID {uid}")]
    ImapFetch {
        /// The UID being fetched.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP flag update failed.
    #[error("failed to flag UID {uid} as seen")]
    ImapStore {
        /// The UID being flagged.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP CLOSE failed.
    #[error("IMAP close failed")]
    ImapClose {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// A session command was issued in a state that does not allow it.
    #[error("cannot {event} a session in state {state}")]
    InvalidSessionState {
        /// Current state name.
        state: &'static str,
        /// Rejected event name.
        event: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Email decoding errors (NOT retryable - malformed content won't change)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to parse email message.
    #[error("failed to parse email")]
    ParseEmail {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// Failed to decode email body.
    #[error("failed to extract email body")]
    ExtractBody {
        /// The underlying parse error.
        #[source]
        source: mailparse::MailParseError,
    },

    /// The server returned no body for a fetched message.
    #[error("message UID {uid} has no body")]
    MissingBody {
        /// The UID that came back empty.
        uid: u32,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The messaging API answered with a non-200 status.
    #[error("messaging API rejected message to {destination}: {status} {reason}")]
    DispatchRejected {
        /// Normalized destination phone number.
        destination: String,
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase plus any response body.
        reason: String,
    },

    /// The request never produced an HTTP response.
    #[error("failed to reach messaging API for {destination}")]
    DispatchTransport {
        /// Normalized destination phone number.
        destination: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The messaging API returned 200 but the body was not an acknowledgment.
    #[error("unreadable acknowledgment from messaging API")]
    DispatchResponse {
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Host process errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Could not bind or serve the webhook listener.
    #[error("webhook server failed on {addr}")]
    Server {
        /// Listen address.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might
    /// succeed in a later poll cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapStore { .. }
            | Error::DispatchTransport { .. } => true,

            // 5xx and 429 may clear up; 4xx will not
            Error::DispatchRejected { status, .. } => *status >= 500 || *status == 429,

            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::MissingEnvVar { .. }
            | Error::InvalidEnvVar { .. }
            | Error::InvalidDnsName { .. }
            | Error::ImapClose { .. }
            | Error::ImapLogout { .. }
            | Error::InvalidSessionState { .. }
            | Error::ParseEmail { .. }
            | Error::ExtractBody { .. }
            | Error::MissingBody { .. }
            | Error::DispatchResponse { .. }
            | Error::Server { .. } => false,
        }
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::MissingEnvVar { .. }
            | Error::InvalidEnvVar { .. }
            | Error::InvalidDnsName { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } | Error::Server { .. } => {
                ErrorCategory::Network
            }

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapStore { .. }
            | Error::ImapClose { .. }
            | Error::ImapLogout { .. }
            | Error::InvalidSessionState { .. } => ErrorCategory::Protocol,

            Error::ParseEmail { .. } | Error::ExtractBody { .. } | Error::MissingBody { .. } => {
                ErrorCategory::Parse
            }

            Error::DispatchRejected { .. }
            | Error::DispatchTransport { .. }
            | Error::DispatchResponse { .. } => ErrorCategory::Dispatch,
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Email decoding errors.
    Parse,
    /// Outbound messaging API errors.
    Dispatch,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Parse => write!(f, "parse"),
            ErrorCategory::Dispatch => write!(f, "dispatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        let err = Error::MissingBody { uid: 7 };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_dispatch_rejection_retryability_follows_status() {
        let rejected = |status| Error::DispatchRejected {
            destination: "+15551234567".into(),
            status,
            reason: "error".into(),
        };

        assert!(rejected(500).is_retryable());
        assert!(rejected(503).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(401).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::MissingEnvVar {
            name: "EMAIL_ADDRESS",
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::CommandTimeout {
            command: "FETCH",
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = Error::DispatchRejected {
            destination: "+15551234567".into(),
            status: 500,
            reason: "Internal Server Error".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Dispatch);
        assert_eq!(err.category().to_string(), "dispatch");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidSessionState {
            state: "logged_out",
            event: "select",
        };
        assert_eq!(err.to_string(), "cannot select a session in state logged_out");
    }
}
