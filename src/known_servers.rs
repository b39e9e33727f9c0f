//! IMAP host discovery from the mailbox address.
//!
//! Used when `IMAP_SERVER` is not configured: well-known providers map to
//! their published IMAP endpoint, every other domain falls back to
//! `imap.<domain>`.
//!
//! ```
//! use mail_relay::known_servers::discover_imap_host;
//!
//! assert_eq!(discover_imap_host("alerts@gmail.com"), "imap.gmail.com");
//! assert_eq!(discover_imap_host("ops@example.org"), "imap.example.org");
//! ```

use once_cell::sync::Lazy;
use std::collections::HashMap;

static KNOWN_SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("gmail.com", "imap.gmail.com"),
        ("googlemail.com", "imap.gmail.com"),
        ("yahoo.com", "imap.mail.yahoo.com"),
        ("hotmail.com", "outlook.office365.com"),
        ("outlook.com", "outlook.office365.com"),
        ("live.com", "outlook.office365.com"),
        ("aol.com", "imap.aol.com"),
        ("icloud.com", "imap.mail.me.com"),
        ("me.com", "imap.mail.me.com"),
        ("mac.com", "imap.mail.me.com"),
        ("zoho.com", "imap.zoho.com"),
        ("fastmail.com", "imap.fastmail.com"),
        ("gmx.com", "imap.gmx.com"),
        ("gmx.net", "imap.gmx.net"),
        ("web.de", "imap.web.de"),
        ("yandex.com", "imap.yandex.com"),
        ("mail.ru", "imap.mail.ru"),
    ])
});

/// Returns the IMAP hostname for a mailbox address.
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    let domain = domain_of(email);

    KNOWN_SERVERS
        .get(domain.as_str())
        .map_or_else(|| format!("imap.{domain}"), |&host| host.to_string())
}

/// Returns `true` if the address belongs to a provider in the built-in table.
#[must_use]
pub fn is_known_provider(email: &str) -> bool {
    KNOWN_SERVERS.contains_key(domain_of(email).as_str())
}

fn domain_of(email: &str) -> String {
    email.rsplit_once('@').map_or(email, |(_, d)| d).to_lowercase()
}
