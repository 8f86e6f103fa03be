//! Reading raw messages back into [`EmailMessage`] values.

use crate::address::Address;
use crate::attachment::{Attachment, ContentDisposition};
use crate::error::Result;
use crate::message::{EmailMessage, Header, MailHeader, MessageKind, MessagePriority, RootContentType};
use crate::tree::strip_brackets;
use missive_mime::{MimeMessage, MultipartKind, Part};
use tracing::debug;

/// Headers that assembly writes itself; they are mapped onto message fields
/// instead of being copied as user headers.
const GENERATED_HEADERS: &[&str] = &[
    "date",
    "message-id",
    "from",
    "to",
    "cc",
    "bcc",
    "reply-to",
    "subject",
    "mime-version",
    "x-priority",
    "priority",
    "importance",
    "return-receipt-to",
    "disposition-notification-to",
];

/// Part headers that are rebuilt from attachment fields.
const PART_HEADERS: &[&str] = &[
    "content-type",
    "content-transfer-encoding",
    "content-id",
    "content-disposition",
];

/// Splits an address list on commas outside quotes and angle brackets.
fn split_address_list(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut depth = 0usize;

    for (i, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => depth += 1,
            '>' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn addresses(mime: &MimeMessage, name: &str) -> Result<Vec<Address>> {
    mime.headers
        .get_all(name)
        .into_iter()
        .flat_map(split_address_list)
        .map(Address::parse)
        .collect()
}

fn is_attachment(part: &Part) -> bool {
    part.disposition().as_deref() == Some("attachment") || part.file_name().is_some()
}

fn to_attachment(part: &Part) -> Result<Attachment> {
    let mut content_type = part.content_type()?;
    content_type.parameters.retain(|(key, _)| !key.eq_ignore_ascii_case("name"));

    let disposition = part
        .headers
        .get("content-disposition")
        .map_or(Ok(ContentDisposition::Attachment), str::parse::<ContentDisposition>)?;

    let mut attachment = Attachment::restore(
        part.content_id().map(str::to_string),
        part.file_name(),
        content_type.to_string(),
        disposition,
        part.data().map(<[u8]>::to_vec).unwrap_or_default(),
    );
    for (name, value) in part.headers.iter() {
        if !PART_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            attachment = attachment.with_header(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }
    Ok(attachment)
}

/// Reads a raw RFC 5322 message into an [`EmailMessage`].
///
/// Address headers, subject, Message-ID, priority and receipt headers map
/// onto their fields; other headers are kept as user headers. The first
/// inline `text/plain` and `text/html` leaves become the bodies and every
/// other leaf becomes an attachment.
///
/// # Errors
///
/// Returns an error if the message cannot be parsed, an address header is
/// malformed, or an attachment carries an unsupported disposition.
pub fn parse_message(raw: &[u8]) -> Result<EmailMessage> {
    let mime = MimeMessage::parse(raw)?;
    from_mime(&mime)
}

/// Converts a parsed MIME message into an [`EmailMessage`].
///
/// # Errors
///
/// See [`parse_message`].
pub fn from_mime(mime: &MimeMessage) -> Result<EmailMessage> {
    let mut message = EmailMessage::new();

    message.from = addresses(mime, "From")?;
    message.to = addresses(mime, "To")?;
    message.cc = addresses(mime, "Cc")?;
    message.bcc = addresses(mime, "Bcc")?;
    message.reply_to = addresses(mime, "Reply-To")?;
    message.delivery_receipt = addresses(mime, MailHeader::DeliveryReceipt.header_name())?;
    message.read_receipt = addresses(mime, MailHeader::ReadReceipt.header_name())?;

    message.subject = mime.subject();
    message.message_id = mime.message_id().map(|id| strip_brackets(id).to_string());
    message.importance = mime
        .headers
        .get("X-Priority")
        .map_or(MessagePriority::Normal, MessagePriority::from_x_priority);

    for (name, value) in mime.headers.iter() {
        if !GENERATED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            message.add_header(Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    message.root_content_type = match mime.root.content_type()?.multipart_kind() {
        Some(MultipartKind::Related) => RootContentType::Related,
        Some(MultipartKind::Alternative) => RootContentType::Alternative,
        Some(MultipartKind::Mixed) | None => RootContentType::Mixed,
    };

    let mut charset = None;
    for leaf in mime.root.leaves() {
        let content_type = leaf.content_type()?;
        if content_type.is("text", "calendar") {
            message.kind = MessageKind::CalendarInvite;
        }

        if !is_attachment(leaf) {
            if content_type.is("text", "plain") && message.text_body.is_none() {
                message.text_body = Some(leaf.body_text()?);
                charset = charset.or_else(|| content_type.charset().map(str::to_string));
                continue;
            }
            if content_type.is("text", "html") && message.html_body.is_none() {
                message.html_body = Some(leaf.body_text()?);
                charset = charset.or_else(|| content_type.charset().map(str::to_string));
                continue;
            }
        }
        message.add_attachment(to_attachment(leaf)?);
    }
    if let Some(charset) = charset {
        message.charset = charset;
    }

    debug!(
        message_id = message.message_id.as_deref().unwrap_or_default(),
        attachments = message.attachments.len(),
        "Converted message"
    );
    Ok(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_address_list() {
        assert_eq!(
            split_address_list(r#"a@x.com, "Doe, Jane" <j@x.com>,, <k@x.com>"#),
            vec!["a@x.com", r#""Doe, Jane" <j@x.com>"#, "<k@x.com>"]
        );
    }

    #[test]
    fn test_simple_message() {
        let raw = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com, carol@example.com\r\n\
Subject: =?UTF-8?B?SMOpbGxv?=\r\n\
Message-ID: <abc@example.com>\r\n\
X-Priority: 1\r\n\
X-Mailer: test\r\n\
Content-Type: text/plain; charset=UTF-8\r\n\
\r\n\
Hi Bob";
        let message = parse_message(raw).unwrap();

        assert_eq!(message.from[0].name(), Some("Alice"));
        assert_eq!(message.to.len(), 2);
        assert_eq!(message.subject.as_deref(), Some("Héllo"));
        assert_eq!(message.message_id.as_deref(), Some("abc@example.com"));
        assert_eq!(message.importance, MessagePriority::High);
        assert_eq!(message.text_body.as_deref(), Some("Hi Bob"));
        assert_eq!(message.charset, "UTF-8");
        assert_eq!(message.headers.len(), 1);
        assert_eq!(message.headers[0].name, "X-Mailer");
    }

    #[test]
    fn test_unknown_disposition_rejected() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/pdf; name=a.pdf\r\n\
Content-Disposition: form-data; filename=a.pdf\r\n\
\r\n\
x\r\n\
--b--\r\n";
        assert!(matches!(
            parse_message(raw),
            Err(crate::Error::UnsupportedDisposition(_))
        ));
    }

    #[test]
    fn test_bad_address_rejected() {
        let raw = b"To: woo foo @bar.com\r\n\r\nbody";
        assert!(matches!(
            parse_message(raw),
            Err(crate::Error::InvalidAddress { .. })
        ));
    }
}
