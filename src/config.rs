//! Configuration for the mailbox relay.
//!
//! Each collaborator has its own section: [`ImapConfig`] for the mail session,
//! [`PollingConfig`] for the scheduler, [`WhatsAppConfig`] for the outbound
//! messaging API and [`WebhookConfig`] for the inbound endpoint. The host
//! process loads all of them at once with [`RelayConfig::from_env`]; library
//! users can assemble them directly:
//!
//! ```
//! use mail_relay::ImapConfig;
//!
//! let config = ImapConfig::builder()
//!     .email("alerts@example.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.server_address(), "imap.example.com:993");
//! ```

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Subject token used when `EMAIL_SUBJECT_TRIGGER` is not set.
pub const DEFAULT_TRIGGER_TOKEN: &str = "WHATSAPP_NOTIFICATION";

/// Mailbox selected when `IMAP_MAILBOX` is not set.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Configuration for connecting to an IMAP server.
///
/// The password is kept in a [`SecretString`] and never shows up in `Debug`.
#[derive(Clone)]
pub struct ImapConfig {
    email: EmailAddress,
    password: SecretString,
    /// IMAP server hostname (discovered from the address domain if not set).
    pub imap_host: Option<String>,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// Mailbox watched for trigger messages.
    pub mailbox: String,
    /// Per-command timeouts.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConfig")
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("mailbox", &self.mailbox)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ImapConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ImapConfigBuilder {
        ImapConfigBuilder::default()
    }

    /// Returns the mailbox address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the password for authentication.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the configured IMAP host, or the one discovered from the address.
    #[must_use]
    pub fn effective_imap_host(&self) -> String {
        match &self.imap_host {
            Some(host) => host.clone(),
            None => crate::known_servers::discover_imap_host(self.email.as_str()),
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.effective_imap_host(), self.imap_port)
    }
}

/// Timeouts bounding every mail-session command.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// TCP connect plus TLS handshake.
    pub connect: Duration,
    /// LOGIN.
    pub auth: Duration,
    /// SELECT.
    pub select: Duration,
    /// UID SEARCH.
    pub search: Duration,
    /// UID FETCH, including draining the response stream.
    pub fetch: Duration,
    /// UID STORE.
    pub store: Duration,
    /// CLOSE and LOGOUT.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            store: Duration::from_secs(10),
            logout: Duration::from_secs(5),
        }
    }
}

fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`ImapConfig`].
#[derive(Debug, Default)]
pub struct ImapConfigBuilder {
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    mailbox: Option<String>,
    timeouts: Option<TimeoutConfig>,
}

impl ImapConfigBuilder {
    /// Sets the mailbox address (required).
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required). Gmail and Outlook need an app password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the mailbox to watch (default `INBOX`).
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or invalid.
    pub fn build(self) -> Result<ImapConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;
        let email = validate_email(&email_raw)?;

        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let mailbox = self.mailbox.unwrap_or_else(|| DEFAULT_MAILBOX.to_string());
        if mailbox.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "mailbox name must not be empty".into(),
            });
        }

        Ok(ImapConfig {
            email,
            password: SecretString::from(password),
            imap_host: self.imap_host.filter(|h| !h.trim().is_empty()),
            imap_port: self.imap_port.unwrap_or(993),
            mailbox,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

/// Scheduling of poll cycles.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Delay between cycle starts.
    pub interval: Duration,
    /// Subject substring that marks a message for relaying.
    pub trigger_token: String,
    /// How many of the newest messages get their subject logged each cycle.
    pub recent_subjects: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            trigger_token: DEFAULT_TRIGGER_TOKEN.to_string(),
            recent_subjects: 5,
        }
    }
}

impl PollingConfig {
    /// Checks the values that would make polling meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero interval or an empty token.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be greater than zero".into(),
            });
        }
        if self.trigger_token.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "trigger token must not be empty".into(),
            });
        }
        // the token is sent inside a single IMAP command line
        if self.trigger_token.chars().any(char::is_control) {
            return Err(Error::InvalidConfig {
                message: "trigger token must not contain control characters".into(),
            });
        }
        Ok(())
    }
}

/// WhatsApp Cloud API settings.
#[derive(Clone)]
pub struct WhatsAppConfig {
    /// Scheme and host of the Graph API, without trailing slash.
    pub api_base: String,
    /// API version path segment, e.g. `v18.0`.
    pub api_version: String,
    /// Sender phone number identifier.
    pub phone_number_id: String,
    access_token: SecretString,
    /// Timeout applied to each send request.
    pub request_timeout: Duration,
}

impl WhatsAppConfig {
    /// Creates a configuration for the public Graph API endpoint.
    #[must_use]
    pub fn new(phone_number_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_base: "https://graph.facebook.com".to_string(),
            api_version: "v18.0".to_string(),
            phone_number_id: phone_number_id.into(),
            access_token: SecretString::from(access_token.into()),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the API base URL (used by tests and proxies).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the API version.
    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// Returns the send-message endpoint.
    #[must_use]
    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base, self.api_version, self.phone_number_id
        )
    }
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Inbound webhook settings.
#[derive(Clone)]
pub struct WebhookConfig {
    verify_token: SecretString,
    /// Listen address for the HTTP server.
    pub bind_address: String,
}

impl WebhookConfig {
    /// Creates a webhook configuration listening on `0.0.0.0:8000`.
    #[must_use]
    pub fn new(verify_token: impl Into<String>) -> Self {
        Self {
            verify_token: SecretString::from(verify_token.into()),
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }

    /// Returns the token the provider must echo during verification.
    #[must_use]
    pub fn verify_token(&self) -> &str {
        self.verify_token.expose_secret()
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("verify_token", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .finish()
    }
}

/// Everything the host process needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Mail session settings.
    pub imap: ImapConfig,
    /// Poll scheduling.
    pub polling: PollingConfig,
    /// Outbound messaging API.
    pub whatsapp: WhatsAppConfig,
    /// Inbound webhook.
    pub webhook: WebhookConfig,
}

impl RelayConfig {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for missing required variables or unusable values.
    pub fn from_env() -> Result<Self> {
        // a missing .env file is the normal case in production
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error for missing required variables or unusable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(Error::MissingEnvVar { name });

        let mut imap = ImapConfig::builder()
            .email(require("EMAIL_ADDRESS")?)
            .password(require("EMAIL_PASSWORD")?);
        if let Some(host) = get("IMAP_SERVER") {
            imap = imap.imap_host(host);
        }
        if let Some(port) = get("IMAP_PORT") {
            imap = imap.imap_port(parse_var("IMAP_PORT", &port)?);
        }
        if let Some(mailbox) = get("IMAP_MAILBOX") {
            imap = imap.mailbox(mailbox);
        }
        let imap = imap.build()?;

        let mut polling = PollingConfig::default();
        if let Some(secs) = get("EMAIL_CHECK_INTERVAL") {
            polling.interval = Duration::from_secs(parse_var("EMAIL_CHECK_INTERVAL", &secs)?);
        }
        if let Some(token) = get("EMAIL_SUBJECT_TRIGGER") {
            polling.trigger_token = token;
        }
        polling.validate()?;

        let mut whatsapp =
            WhatsAppConfig::new(require("PHONE_NUMBER_ID")?, require("ACCESS_TOKEN")?);
        if let Some(version) = get("VERSION") {
            whatsapp = whatsapp.with_api_version(version);
        }
        if let Some(base) = get("WHATSAPP_API_BASE") {
            whatsapp = whatsapp.with_api_base(base);
        }

        let mut webhook = WebhookConfig::new(require("VERIFY_TOKEN")?);
        if let Some(addr) = get("BIND_ADDRESS") {
            webhook.bind_address = addr;
        }

        Ok(Self {
            imap,
            polling,
            whatsapp,
            webhook,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidEnvVar {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("EMAIL_ADDRESS", "alerts@gmail.com"),
        ("EMAIL_PASSWORD", "app-password"),
        ("ACCESS_TOKEN", "EAAG-token"),
        ("PHONE_NUMBER_ID", "1234567890"),
        ("VERIFY_TOKEN", "hub-secret"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend_from_slice(extra);
        pairs
    }

    #[test]
    fn test_builder_minimal() {
        let config = ImapConfig::builder()
            .email("user@example.com")
            .password("secret")
            .build()
            .unwrap();

        assert_eq!(config.email(), "user@example.com");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.mailbox, "INBOX");
    }

    #[test]
    fn test_builder_missing_fields() {
        assert!(ImapConfig::builder().password("secret").build().is_err());
        assert!(ImapConfig::builder().email("user@example.com").build().is_err());
    }

    #[test]
    fn test_builder_invalid_email() {
        let result = ImapConfig::builder()
            .email("invalid-email")
            .password("secret")
            .build();
        assert!(matches!(result, Err(Error::InvalidEmailFormat { .. })));
    }

    #[test]
    fn test_explicit_host_wins_over_discovery() {
        let config = ImapConfig::builder()
            .email("user@gmail.com")
            .password("secret")
            .imap_host("mail.internal")
            .imap_port(1993)
            .build()
            .unwrap();

        assert_eq!(config.server_address(), "mail.internal:1993");
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = ImapConfig::builder()
            .email("user@example.com")
            .password("super-secret-password")
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = RelayConfig::from_lookup(env(REQUIRED)).unwrap();

        assert_eq!(config.imap.effective_imap_host(), "imap.gmail.com");
        assert_eq!(config.polling.interval, Duration::from_secs(300));
        assert_eq!(config.polling.trigger_token, DEFAULT_TRIGGER_TOKEN);
        assert_eq!(
            config.whatsapp.messages_url(),
            "https://graph.facebook.com/v18.0/1234567890/messages"
        );
        assert_eq!(config.webhook.bind_address, "0.0.0.0:8000");
        assert_eq!(config.webhook.verify_token(), "hub-secret");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RelayConfig::from_lookup(env(&with(&[
            ("IMAP_SERVER", "imap.corp.example"),
            ("IMAP_PORT", "1993"),
            ("IMAP_MAILBOX", "Alerts"),
            ("EMAIL_CHECK_INTERVAL", "60"),
            ("EMAIL_SUBJECT_TRIGGER", "SMS_RELAY"),
            ("VERSION", "v19.0"),
            ("WHATSAPP_API_BASE", "http://127.0.0.1:9000/"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
        ])))
        .unwrap();

        assert_eq!(config.imap.server_address(), "imap.corp.example:1993");
        assert_eq!(config.imap.mailbox, "Alerts");
        assert_eq!(config.polling.interval, Duration::from_secs(60));
        assert_eq!(config.polling.trigger_token, "SMS_RELAY");
        assert_eq!(
            config.whatsapp.messages_url(),
            "http://127.0.0.1:9000/v19.0/1234567890/messages"
        );
        assert_eq!(config.webhook.bind_address, "127.0.0.1:8080");
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let result = RelayConfig::from_lookup(env(&[("EMAIL_ADDRESS", "a@example.com")]));
        assert!(matches!(
            result,
            Err(Error::MissingEnvVar {
                name: "EMAIL_PASSWORD"
            })
        ));
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result = RelayConfig::from_lookup(env(&with(&[("EMAIL_CHECK_INTERVAL", "soon")])));
        assert!(matches!(
            result,
            Err(Error::InvalidEnvVar {
                name: "EMAIL_CHECK_INTERVAL",
                ..
            })
        ));

        let result = RelayConfig::from_lookup(env(&with(&[("EMAIL_CHECK_INTERVAL", "0")])));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));

        let result = RelayConfig::from_lookup(env(&with(&[("IMAP_PORT", "99999")])));
        assert!(matches!(result, Err(Error::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_blank_trigger_falls_back_to_default() {
        let config =
            RelayConfig::from_lookup(env(&with(&[("EMAIL_SUBJECT_TRIGGER", "   ")]))).unwrap();
        assert_eq!(config.polling.trigger_token, DEFAULT_TRIGGER_TOKEN);
    }

    #[test]
    fn test_polling_validation() {
        let polling = PollingConfig {
            trigger_token: String::new(),
            ..PollingConfig::default()
        };
        assert!(polling.validate().is_err());
        assert!(PollingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_trigger_token_rejects_control_characters() {
        for token in ["ALERT\r\nA001 LOGOUT", "ALERT\n", "AL\tERT", "ALERT\0"] {
            let polling = PollingConfig {
                trigger_token: token.to_string(),
                ..PollingConfig::default()
            };
            assert!(
                matches!(polling.validate(), Err(Error::InvalidConfig { .. })),
                "{token:?}"
            );
        }

        let err = RelayConfig::from_lookup(env(&with(&[(
            "EMAIL_SUBJECT_TRIGGER",
            "WHATSAPP\r\nNOTIFICATION",
        )])))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let config = RelayConfig::from_lookup(env(REQUIRED)).unwrap();
        let debug_str = format!("{config:?}");

        assert!(!debug_str.contains("app-password"));
        assert!(!debug_str.contains("EAAG-token"));
        assert!(!debug_str.contains("hub-secret"));
    }
}
