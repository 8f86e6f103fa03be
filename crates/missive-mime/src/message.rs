//! Complete MIME messages: top-level headers over a root part.

use crate::encoding::decode_rfc2047;
use crate::error::Result;
use crate::header::Headers;
use crate::part::{Part, split_head};
use std::io::Write;

/// Headers that belong to the root part rather than the message envelope.
fn is_content_header(name: &str) -> bool {
    name.get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("content-"))
}

/// MIME message.
///
/// `headers` carries the RFC 5322 message headers (Date, From, Subject, ...);
/// the `Content-*` headers live on `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMessage {
    /// Message headers.
    pub headers: Headers,
    /// Root body part.
    pub root: Part,
}

impl MimeMessage {
    /// Creates a message from headers and a root part.
    #[must_use]
    pub const fn new(headers: Headers, root: Part) -> Self {
        Self { headers, root }
    }

    /// Gets the decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers
            .get("subject")
            .map(|s| decode_rfc2047(s).unwrap_or_else(|_| s.to_string()))
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Writes the message to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        self.write_filtered(out, |_| true)
    }

    /// Serializes the complete message, Bcc included.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serializes the message for delivery: identical to [`Self::to_bytes`]
    /// except that `Bcc` headers are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_transport_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_filtered(&mut out, |name| !name.eq_ignore_ascii_case("bcc"))?;
        Ok(out)
    }

    fn write_filtered<W: Write>(&self, out: &mut W, keep: impl Fn(&str) -> bool) -> Result<()> {
        let mut headers = Headers::new();
        for (name, value) in self.headers.iter().filter(|(n, _)| keep(n)) {
            headers.add(name, value);
        }
        for (name, value) in self.root.headers.iter() {
            headers.add(name, value);
        }
        headers.write_to(out)?;
        out.write_all(b"\r\n")?;
        self.root.write_body(out)
    }

    /// Parses a raw RFC 5322 message.
    ///
    /// # Errors
    ///
    /// Returns an error if headers or the multipart structure are malformed.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head(raw);
        let all = Headers::parse(&String::from_utf8_lossy(head))?;

        let mut headers = Headers::new();
        let mut content = Headers::new();
        for (name, value) in all.iter() {
            if is_content_header(name) {
                content.add(name, value);
            } else {
                headers.add(name, value);
            }
        }

        Ok(Self {
            headers,
            root: Part::from_parts(content, body)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::content_type::{ContentType, MultipartKind};

    fn sample() -> MimeMessage {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        headers.add("Bcc", "hidden@example.com");
        headers.add("Subject", "=?UTF-8?B?SMOpbGxv?=");
        headers.add("MIME-Version", "1.0");

        let mut root = Part::multipart(MultipartKind::Mixed);
        root.as_multipart_mut()
            .unwrap()
            .push(Part::text(&ContentType::text_plain("UTF-8"), b"Hello".to_vec()));
        MimeMessage::new(headers, root)
    }

    #[test]
    fn test_subject_decoded() {
        assert_eq!(sample().subject().as_deref(), Some("Héllo"));
    }

    #[test]
    fn test_transport_bytes_skip_bcc() {
        let message = sample();
        let full = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        let wire = String::from_utf8(message.to_transport_bytes().unwrap()).unwrap();
        assert!(full.contains("Bcc: hidden@example.com\r\n"));
        assert!(!wire.contains("hidden@example.com"));
        assert!(wire.contains("Content-Type: multipart/mixed"));
    }

    #[test]
    fn test_parse_round_trip() {
        let message = sample();
        let parsed = MimeMessage::parse(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.headers, message.headers);
        assert_eq!(parsed.root.parts().len(), 1);
        assert_eq!(parsed.root.parts()[0].body_text().unwrap(), "Hello");
        assert!(parsed.headers.get("content-type").is_none());
    }

    #[test]
    fn test_parse_single_part() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Hello, World!"
        );
        let message = MimeMessage::parse(raw.as_bytes()).unwrap();
        assert_eq!(message.subject().as_deref(), Some("Test"));
        assert_eq!(message.root.body_text().unwrap(), "Hello, World!");
    }
}
