//! Rewrites email text into WhatsApp-flavoured markup.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"【.*?】").expect("valid regex"));
static DOUBLE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));

/// Formats `text` for a WhatsApp text message.
///
/// 1. Drops every `【…】` annotation, brackets included, then trims.
/// 2. Turns `**bold**` into WhatsApp's `*bold*`.
///
/// The emphasis rewrite is repeated until nothing changes, so runs such as
/// `****` settle and `format_for_whatsapp` is idempotent.
///
/// ```
/// use mail_relay::formatter::format_for_whatsapp;
///
/// assert_eq!(format_for_whatsapp("【drop】keep **bold**"), "keep *bold*");
/// ```
#[must_use]
pub fn format_for_whatsapp(text: &str) -> String {
    let stripped = ANNOTATION.replace_all(text, "");
    let mut current = stripped.trim().to_string();

    loop {
        let next = match DOUBLE_EMPHASIS.replace_all(&current, "*$1*") {
            Cow::Borrowed(_) => break,
            Cow::Owned(next) => next,
        };
        current = next;
    }
    current
}
