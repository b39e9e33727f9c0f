//! Integration tests against a real IMAP server.
//!
//! This file only builds with the `integration-tests` feature, and the
//! real-server tests are additionally `#[ignore]`d. To run them:
//!
//! ```bash
//! export MAIL_RELAY_TEST_EMAIL="your@email.com"
//! export MAIL_RELAY_TEST_PASSWORD="your-app-password"
//!
//! # Optional: explicit server
//! export MAIL_RELAY_TEST_IMAP_SERVER="imap.example.com"
//!
//! cargo test --features integration-tests -- --ignored
//! ```
//!
//! Nothing here sends WhatsApp messages: dispatches go to a recording notifier.

#![cfg(feature = "integration-tests")]

use async_trait::async_trait;
use mail_relay::dispatcher::Acknowledgment;
use mail_relay::session::{ImapSessionFactory, SessionFactory, SessionState};
use mail_relay::{ImapConfig, MailboxRelay, Notifier, PhoneMatcher, RelaySettings};
use std::env;
use std::sync::{Arc, Mutex};

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_config() -> Option<ImapConfig> {
    dotenvy::dotenv().ok();
    let email = env::var("MAIL_RELAY_TEST_EMAIL").ok()?;
    let password = env::var("MAIL_RELAY_TEST_PASSWORD").ok()?;

    let mut builder = ImapConfig::builder().email(email).password(password);
    if let Ok(host) = env::var("MAIL_RELAY_TEST_IMAP_SERVER") {
        builder = builder.imap_host(host);
    }

    builder.build().ok()
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, destination: &str, body: &str) -> mail_relay::Result<Acknowledgment> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), body.to_string()));
        Ok(Acknowledgment::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_open_select_and_logout() {
    let config = get_test_config().expect("Test config from environment variables");
    let factory = ImapSessionFactory::new(config);

    let mut session = factory.open().await.expect("Failed to open session");
    assert_eq!(session.state(), SessionState::Authenticated);

    session.select("INBOX").await.expect("Failed to select INBOX");
    assert_eq!(session.state(), SessionState::Selected);

    let unseen = session.search("UNSEEN").await.expect("Failed to search");
    assert!(unseen.windows(2).all(|w| w[0] < w[1]));

    session.close().await.expect("Failed to close");
    session.logout().await.expect("Failed to logout");
    assert_eq!(session.state(), SessionState::LoggedOut);
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_recent_subjects_do_not_mark_seen() {
    let config = get_test_config().expect("Test config from environment variables");
    let factory = ImapSessionFactory::new(config);

    let mut session = factory.open().await.expect("Failed to open session");
    session.select("INBOX").await.expect("Failed to select INBOX");

    let unseen_before = session.search("UNSEEN").await.expect("Failed to search");
    let all = session.search("ALL").await.expect("Failed to search");
    let recent = &all[all.len().saturating_sub(5)..];

    let subjects = session
        .fetch_subjects(recent)
        .await
        .expect("Failed to fetch subjects");
    for (uid, subject) in &subjects {
        println!("{uid}: {}", subject.as_deref().unwrap_or("<none>"));
    }

    let unseen_after = session.search("UNSEEN").await.expect("Failed to search");
    assert_eq!(unseen_before, unseen_after);

    session.logout().await.expect("Failed to logout");
}

// ─────────────────────────────────────────────────────────────────────────────
// Poll Cycle Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_poll_with_unmatched_token() {
    let config = get_test_config().expect("Test config from environment variables");
    let notifier = Arc::new(RecordingNotifier::default());

    let relay = MailboxRelay::new(
        Arc::new(ImapSessionFactory::new(config)),
        notifier.clone(),
        PhoneMatcher::new(),
        RelaySettings::default(),
    );

    let summary = relay.poll("MAIL_RELAY_NEVER_MATCHES_8D1F").await;

    assert!(!summary.aborted);
    assert_eq!(summary.candidates, 0);
    assert!(notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires intentionally wrong credentials"]
async fn test_poll_with_invalid_credentials() {
    let config = ImapConfig::builder()
        .email("test@gmail.com")
        .password("wrong-password")
        .build()
        .expect("valid config structure");
    let notifier = Arc::new(RecordingNotifier::default());

    let relay = MailboxRelay::new(
        Arc::new(ImapSessionFactory::new(config)),
        notifier.clone(),
        PhoneMatcher::new(),
        RelaySettings::default(),
    );

    let summary = relay.poll("WHATSAPP_NOTIFICATION").await;

    assert!(summary.aborted);
    assert_eq!(summary.marked_seen, 0);
    assert!(notifier.sent.lock().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invalid_email_format() {
    let result = ImapConfig::builder()
        .email("not-an-email")
        .password("password")
        .build();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_missing_required_fields() {
    let result = ImapConfig::builder().password("password").build();
    assert!(result.is_err());

    let result = ImapConfig::builder().email("test@example.com").build();
    assert!(result.is_err());
}
