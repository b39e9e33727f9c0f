//! Decoding of fetched RFC 822 messages into relayable text.

use crate::error::{Error, Result};
use mailparse::{parse_headers, parse_mail, MailHeaderMap, ParsedMail};

/// Text content and subject of a fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Decoded `Subject` header, if present.
    pub subject: Option<String>,
    /// Decoded body text. Empty when a multipart message has no `text/plain` part.
    pub text: String,
}

/// Parses a raw message and decodes its text body.
///
/// Multipart messages yield their first `text/plain` part in depth-first
/// order; single-part messages yield their only body. Transfer encoding and
/// charset come from the part's own headers.
///
/// # Errors
///
/// Returns [`Error::ParseEmail`] if the message structure cannot be parsed and
/// [`Error::ExtractBody`] if the selected part cannot be decoded.
pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage> {
    let parsed = parse_mail(raw).map_err(|source| Error::ParseEmail { source })?;
    let subject = parsed.headers.get_first_value("Subject");

    let body_part = if parsed.subparts.is_empty() {
        Some(&parsed)
    } else {
        first_plain_text(&parsed)
    };

    let text = match body_part {
        Some(part) => part
            .get_body()
            .map_err(|source| Error::ExtractBody { source })?,
        None => String::new(),
    };

    Ok(DecodedMessage { subject, text })
}

/// Extracts the decoded `Subject` from a raw header block.
pub(crate) fn subject_from_header(header: &[u8]) -> Option<String> {
    let (headers, _) = parse_headers(header).ok()?;
    headers.get_first_value("Subject")
}

fn first_plain_text<'a>(part: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        return Some(part);
    }
    part.subparts.iter().find_map(first_plain_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_message() {
        let raw = b"From: ops@example.com\r\nSubject: WHATSAPP_NOTIFICATION\r\n\r\nCall me at 555-123-4567";
        let decoded = decode_message(raw).unwrap();

        assert_eq!(decoded.subject.as_deref(), Some("WHATSAPP_NOTIFICATION"));
        assert_eq!(decoded.text, "Call me at 555-123-4567");
    }

    #[test]
    fn test_multipart_prefers_plain_text() {
        let raw = concat!(
            "Subject: alert\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "plain body\r\n",
            "--b1--\r\n",
        );
        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert_eq!(decoded.text.trim(), "plain body");
    }

    #[test]
    fn test_nested_multipart_walks_depth_first() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first plain\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "attachment text\r\n",
            "--outer--\r\n",
        );
        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert_eq!(decoded.text.trim(), "first plain");
    }

    #[test]
    fn test_multipart_without_plain_text_is_empty() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>555-123-4567</b>\r\n",
            "--b--\r\n",
        );
        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert!(decoded.text.is_empty());
    }

    #[test]
    fn test_transfer_encodings_and_charset() {
        let raw = concat!(
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Caf=E9 at +1 555 123 4567",
        );
        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert_eq!(decoded.text, "Café at +1 555 123 4567");

        let raw = concat!(
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "NTU1LTEyMy00NTY3\r\n",
        );
        let decoded = decode_message(raw.as_bytes()).unwrap();
        assert_eq!(decoded.text.trim(), "555-123-4567");
    }

    #[test]
    fn test_invalid_base64_is_extract_error() {
        let raw = concat!(
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "!!!@@@###",
        );
        let err = decode_message(raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ExtractBody { .. }), "{err:?}");
    }

    #[test]
    fn test_encoded_subject() {
        let header = b"Subject: =?UTF-8?B?V0hBVFNBUFBfTk9USUZJQ0FUSU9O?=\r\nFrom: a@b.c\r\n\r\n";
        assert_eq!(
            subject_from_header(header).as_deref(),
            Some("WHATSAPP_NOTIFICATION")
        );
        assert_eq!(subject_from_header(b"From: a@b.c\r\n\r\n"), None);
    }
}
