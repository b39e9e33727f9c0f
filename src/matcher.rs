//! Content matching for pulling values out of email bodies.
//!
//! The relay only needs one value per message, the destination phone number,
//! which [`PhoneMatcher`] finds. It sits behind the [`Matcher`] trait so the
//! relay can be pointed at a different extraction rule.
//!
//! ```
//! use mail_relay::matcher::extract_phone_number;
//!
//! assert_eq!(
//!     extract_phone_number("Call me at 555-123-4567 **now**").as_deref(),
//!     Some("555-123-4567")
//! );
//! assert_eq!(extract_phone_number("no digits here"), None);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Trait for matching and extracting content from email bodies.
pub trait Matcher: Send + Sync {
    /// Returns the first matching value in `text`, if any.
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>>;

    /// Human-readable description used in log events.
    fn description(&self) -> &str;
}

/// Regex-based matcher.
///
/// Yields the first capture group when the pattern has one, otherwise the
/// whole match.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
    description: String,
}

impl RegexMatcher {
    /// Creates a matcher described by its own pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::with_description(pattern, format!("regex pattern: {pattern}"))
    }

    /// Creates a matcher with a custom description.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex pattern is invalid.
    pub fn with_description(
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            description: description.into(),
        })
    }
}

impl Matcher for RegexMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        let caps = self.regex.captures(text)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| Cow::Borrowed(m.as_str()))
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Optional `+` and 1–3 digit country code, optional parenthesized area code,
/// 3-digit exchange and 4-digit line, with optional space/dot/hyphen between
/// groups.
const PHONE_PATTERN: &str = r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}";

static DEFAULT_PHONE_MATCHER: Lazy<PhoneMatcher> = Lazy::new(PhoneMatcher::new);

/// Finds the first phone-number-shaped substring.
///
/// The match is purely by shape: nothing checks that the number is dialable.
/// The result keeps the original separators; see
/// [`normalize_phone_number`](crate::dispatcher::normalize_phone_number).
#[derive(Debug, Clone)]
pub struct PhoneMatcher {
    inner: RegexMatcher,
}

impl PhoneMatcher {
    /// Creates the matcher for common North American and international layouts.
    ///
    /// # Panics
    ///
    /// Never in practice: the built-in pattern is a constant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RegexMatcher::with_description(PHONE_PATTERN, "phone number")
                .expect("valid phone regex"),
        }
    }
}

impl Default for PhoneMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for PhoneMatcher {
    fn find_match<'a>(&self, text: &'a str) -> Option<Cow<'a, str>> {
        self.inner.find_match(text)
    }

    fn description(&self) -> &str {
        self.inner.description()
    }
}

/// Returns the first phone number in `content`, in document order.
#[must_use]
pub fn extract_phone_number(content: &str) -> Option<String> {
    DEFAULT_PHONE_MATCHER
        .find_match(content)
        .map(Cow::into_owned)
}
