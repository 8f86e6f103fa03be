//! MIME tree assembly.
//!
//! Turns an [`EmailMessage`] into a [`MimeMessage`]: one top-level
//! container typed by the message's root content type, the bodies nested
//! under it by the body rule, and attachments placed by disposition.
//!
//! | Bodies       | Standard layout                                  |
//! |--------------|--------------------------------------------------|
//! | text + html  | root[related[alternative[text, html]], ...]      |
//! | text only    | root[text, ...]                                  |
//! | html only    | root[related[html], ...]                         |
//! | none         | root[...]                                        |
//!
//! Inline attachments join the related container when one exists and has
//! content; everything else lands in the root.

use crate::address::Address;
use crate::attachment::{Attachment, ContentDisposition};
use crate::error::{Error, Result};
use crate::message::{EmailMessage, MailHeader, MessageKind, MessagePriority};
use chrono::{DateTime, FixedOffset};
use missive_mime::encoding::{encode_charset, encode_rfc2047, needs_encoding};
use missive_mime::{
    ContentType, Headers, MimeMessage, Multipart, MultipartKind, Part, TransferEncoding,
    format_parameter_value,
};
use tracing::debug;

/// Settings that influence assembly but are not part of the message.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Domain used for generated Message-IDs; the local host name when unset.
    pub domain: Option<String>,
    /// Value of the `Date` header; the current time when unset.
    pub date: Option<DateTime<FixedOffset>>,
}

impl AssemblyOptions {
    /// Options generating Message-IDs in `domain`.
    #[must_use]
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            date: None,
        }
    }
}

/// SMTP envelope of an assembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope sender (envelope-from, else the first From address).
    pub sender: Option<Address>,
    /// All recipients: To, Cc and Bcc.
    pub recipients: Vec<Address>,
}

/// The result of assembly.
#[derive(Debug, Clone)]
pub struct AssembledMessage {
    /// The MIME tree, headers included.
    pub mime: MimeMessage,
    /// The Message-ID without angle brackets.
    pub message_id: String,
    /// SMTP envelope.
    pub envelope: Envelope,
}

impl AssembledMessage {
    /// Bytes to hand to a transport (Bcc removed).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_transport_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.mime.to_transport_bytes()?)
    }
}

/// Stateful placement of body parts and attachments.
///
/// Placement depends on call order: an inline attachment added before any
/// related content exists lands in the root container.
#[derive(Debug)]
pub struct MimeTreeBuilder {
    kind: MultipartKind,
    charset: String,
    root: Multipart,
    /// Related container and the root index it will occupy.
    related: Option<(usize, Multipart)>,
}

impl MimeTreeBuilder {
    /// Starts a tree with a root container of `kind`.
    #[must_use]
    pub fn new(kind: MultipartKind, charset: impl Into<String>) -> Self {
        Self {
            kind,
            charset: charset.into(),
            root: Multipart::new(),
            related: None,
        }
    }

    fn body_part(&self, sub_type: &str, body: &str) -> Result<Part> {
        let content_type = ContentType::new("text", sub_type).with_parameter("charset", &self.charset);
        let mut part = Part::text(&content_type, encode_charset(body, &self.charset)?);
        part.headers
            .set("Content-Disposition", ContentDisposition::Inline.as_str());
        Ok(part)
    }

    fn related_container(&mut self) -> &mut Multipart {
        let position = self.root.len();
        &mut self
            .related
            .get_or_insert_with(|| (position, Multipart::new()))
            .1
    }

    /// Adds an inline text part to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be encoded in the charset.
    pub fn set_text(&mut self, text: &str) -> Result<&mut Self> {
        let part = self
            .body_part("plain", text)
            .map_err(|e| Error::assembly("text body", e))?;
        self.root.push(part);
        Ok(self)
    }

    /// Adds an HTML part inside the related container.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTML cannot be encoded in the charset.
    pub fn set_html(&mut self, html: &str) -> Result<&mut Self> {
        let part = self
            .body_part("html", html)
            .map_err(|e| Error::assembly("html body", e))?;
        self.related_container().push(part);
        Ok(self)
    }

    /// Adds an HTML part directly to the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTML cannot be encoded in the charset.
    pub fn set_html_not_related(&mut self, html: &str) -> Result<&mut Self> {
        let part = self
            .body_part("html", html)
            .map_err(|e| Error::assembly("html body", e))?;
        self.root.push(part);
        Ok(self)
    }

    /// Adds an alternative container holding text then HTML, inside the
    /// related container.
    ///
    /// # Errors
    ///
    /// Returns an error if either body cannot be encoded in the charset.
    pub fn set_html_text_alt(&mut self, html: &str, text: &str) -> Result<&mut Self> {
        let text = self
            .body_part("plain", text)
            .map_err(|e| Error::assembly("text body", e))?;
        let html = self
            .body_part("html", html)
            .map_err(|e| Error::assembly("html body", e))?;

        // Richest alternative last.
        let mut alternative = Multipart::new();
        alternative.push(text);
        alternative.push(html);
        self.related_container()
            .push(Part::from_multipart(MultipartKind::Alternative, alternative));
        Ok(self)
    }

    /// Places an attachment by its disposition.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment's MIME type is malformed.
    pub fn add_attachment(&mut self, attachment: &Attachment) -> Result<&mut Self> {
        let label = attachment
            .file_name()
            .unwrap_or_else(|| attachment.content_id());
        let part = self
            .attachment_part(attachment)
            .map_err(|e| Error::assembly(format!("attachment {label}"), e))?;

        match attachment.disposition() {
            ContentDisposition::Attachment => self.root.push(part),
            ContentDisposition::Inline => match self.related.as_mut() {
                Some((_, related)) if !related.is_empty() => related.push(part),
                _ => self.root.push(part),
            },
        }
        Ok(self)
    }

    fn attachment_part(&self, attachment: &Attachment) -> Result<Part> {
        let mut content_type = ContentType::parse(attachment.mime_type())?;
        let mut disposition = attachment.disposition().as_str().to_string();

        if let Some(name) = attachment.file_name() {
            let name = if needs_encoding(name) {
                encode_rfc2047(name, &self.charset)?
            } else {
                name.to_string()
            };
            disposition.push_str("; filename=");
            disposition.push_str(&format_parameter_value(&name));
            content_type.set_parameter("name", name);
        }

        let mut part = Part::leaf(
            &content_type,
            TransferEncoding::Base64,
            attachment.bytes().to_vec(),
        );
        part.headers
            .set("Content-ID", format!("<{}>", attachment.content_id()));
        part.headers.set("Content-Disposition", disposition);
        for header in attachment.headers() {
            part.headers.add(&header.name, &header.value);
        }
        Ok(part)
    }

    /// Returns the number of parts directly under the root so far.
    #[must_use]
    pub fn root_len(&self) -> usize {
        self.root.len() + usize::from(self.related.is_some())
    }

    /// Closes the tree and returns the root part.
    #[must_use]
    pub fn finish(self) -> Part {
        let mut root = self.root;
        if let Some((index, related)) = self.related {
            root.insert(index, Part::from_multipart(MultipartKind::Related, related));
        }
        Part::from_multipart(self.kind, root)
    }
}

fn join_addresses(addresses: &[Address], charset: &str) -> Result<String> {
    let rendered = addresses
        .iter()
        .map(|a| a.to_header_value(charset))
        .collect::<Result<Vec<_>>>()?;
    Ok(rendered.join(", "))
}

fn set_addresses(
    headers: &mut Headers,
    name: &str,
    field: &str,
    addresses: &[Address],
    charset: &str,
) -> Result<()> {
    if addresses.is_empty() {
        return Ok(());
    }
    let value = join_addresses(addresses, charset).map_err(|e| Error::assembly(field, e))?;
    headers.set(name, value);
    Ok(())
}

/// Generates `uuid@domain`, using the local host name when no domain is given.
#[must_use]
pub fn generate_message_id(domain: Option<&str>) -> String {
    let domain = domain
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map_or_else(
            || {
                hostname::get()
                    .ok()
                    .map(|h| h.to_string_lossy().into_owned())
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| "localhost".to_string())
            },
            str::to_string,
        );
    format!("{}@{domain}", uuid::Uuid::new_v4())
}

/// Removes surrounding angle brackets from a Message-ID.
#[must_use]
pub fn strip_brackets(id: &str) -> &str {
    let trimmed = id.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed)
}

/// Assembles a message into a MIME tree.
///
/// # Errors
///
/// Returns [`Error::Assembly`] naming the field that could not be built.
pub fn assemble(message: &EmailMessage, options: &AssemblyOptions) -> Result<AssembledMessage> {
    let charset = message.charset.as_str();
    let mut headers = Headers::new();

    let date = options
        .date
        .unwrap_or_else(|| chrono::Local::now().fixed_offset());
    headers.set("Date", date.to_rfc2822());

    let message_id = message
        .message_id
        .as_deref()
        .map(strip_brackets)
        .filter(|id| !id.is_empty())
        .map_or_else(
            || generate_message_id(options.domain.as_deref()),
            str::to_string,
        );
    if message_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::assembly(
            "Message-ID",
            missive_mime::Error::InvalidHeader(message_id.escape_debug().to_string()),
        ));
    }
    headers.set("Message-ID", format!("<{message_id}>"));

    set_addresses(&mut headers, "From", "sender From", &message.from, charset)?;
    set_addresses(&mut headers, "To", "recipient To", &message.to, charset)?;
    set_addresses(&mut headers, "Cc", "recipient Cc", &message.cc, charset)?;
    set_addresses(&mut headers, "Bcc", "recipient Bcc", &message.bcc, charset)?;
    set_addresses(&mut headers, "Reply-To", "Reply-To", &message.reply_to, charset)?;

    for (kind, addresses) in [
        (MailHeader::DeliveryReceipt, &message.delivery_receipt),
        (MailHeader::ReadReceipt, &message.read_receipt),
    ] {
        for address in addresses {
            headers.add(kind.header_name(), format!("<{}>", address.email()));
        }
    }

    if message.importance != MessagePriority::Normal {
        headers.set("X-Priority", message.importance.x_priority());
        headers.set("Priority", message.importance.priority());
        headers.set("Importance", message.importance.importance());
    }

    for header in &message.headers {
        headers.add(&header.name, &header.value);
    }

    if let Some(subject) = &message.subject {
        let encoded =
            Headers::encode_value("Subject", subject, charset).map_err(|e| Error::assembly("subject", e))?;
        headers.set("Subject", encoded);
    }
    headers.set("MIME-Version", "1.0");

    let mut tree = MimeTreeBuilder::new(message.root_content_type.into(), charset);
    let html = message.html_body.as_deref();
    let text = message.text_body.as_deref();
    match (message.kind, html, text) {
        (MessageKind::Standard, Some(html), Some(text)) => {
            tree.set_html_text_alt(html, text)?;
        }
        (MessageKind::Standard, Some(html), None) => {
            tree.set_html(html)?;
        }
        (MessageKind::CalendarInvite, Some(html), _) => {
            tree.set_html_not_related(html)?;
        }
        (_, None, Some(text)) => {
            tree.set_text(text)?;
        }
        (_, None, None) => {}
    }
    for attachment in &message.attachments {
        tree.add_attachment(attachment)?;
    }

    let root = tree.finish();
    debug!(
        %message_id,
        parts = root.parts().len(),
        attachments = message.attachments.len(),
        "Assembled message"
    );

    Ok(AssembledMessage {
        mime: MimeMessage::new(headers, root),
        message_id,
        envelope: Envelope {
            sender: message.sender().cloned(),
            recipients: message.recipients().cloned().collect(),
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::{Header, RootContentType};

    fn kinds(part: &Part) -> Vec<String> {
        part.parts()
            .iter()
            .map(|p| p.content_type().unwrap().essence())
            .collect()
    }

    fn inline(name: &str) -> Attachment {
        Attachment::new(name, "image/png", ContentDisposition::Inline, vec![1, 2, 3])
    }

    #[test]
    fn test_text_only() {
        let mut message = EmailMessage::new();
        message.text_body = Some("Hello".to_string());
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();

        let root = &assembled.mime.root;
        assert_eq!(root.content_type().unwrap().essence(), "multipart/mixed");
        assert_eq!(kinds(root), vec!["text/plain"]);
        assert_eq!(root.parts()[0].body_text().unwrap(), "Hello");
        assert_eq!(root.parts()[0].disposition().as_deref(), Some("inline"));
    }

    #[test]
    fn test_html_only_with_inline() {
        let mut message = EmailMessage::new();
        message.html_body = Some("<img src=\"cid:x\">".to_string());
        message.add_attachment(inline("logo.png"));
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();

        let root = &assembled.mime.root;
        assert_eq!(kinds(root), vec!["multipart/related"]);
        assert_eq!(kinds(&root.parts()[0]), vec!["text/html", "image/png"]);
    }

    #[test]
    fn test_text_html_and_attachments() {
        let mut message = EmailMessage::new();
        message.text_body = Some("text".to_string());
        message.html_body = Some("<p>html</p>".to_string());
        message.add_attachment(Attachment::new(
            "report.pdf",
            "application/pdf",
            ContentDisposition::Attachment,
            vec![0],
        ));
        message.add_attachment(inline("logo.png"));
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();

        let root = &assembled.mime.root;
        assert_eq!(kinds(root), vec!["multipart/related", "application/pdf"]);
        let related = &root.parts()[0];
        assert_eq!(kinds(related), vec!["multipart/alternative", "image/png"]);
        assert_eq!(kinds(&related.parts()[0]), vec!["text/plain", "text/html"]);
    }

    #[test]
    fn test_no_body() {
        let mut message = EmailMessage::new();
        message.add_attachment(inline("logo.png"));
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();
        assert_eq!(kinds(&assembled.mime.root), vec!["image/png"]);
    }

    #[test]
    fn test_inline_before_related_lands_in_root() {
        let mut tree = MimeTreeBuilder::new(MultipartKind::Mixed, "UTF-8");
        tree.add_attachment(&inline("early.png")).unwrap();
        assert_eq!(tree.root_len(), 1);
        tree.set_html("<p>hi</p>").unwrap();
        assert_eq!(tree.root_len(), 2);
        tree.add_attachment(&inline("late.png")).unwrap();
        assert_eq!(tree.root_len(), 2);
        let root = tree.finish();

        assert_eq!(kinds(&root), vec!["image/png", "multipart/related"]);
        let related = &root.parts()[1];
        assert_eq!(kinds(related), vec!["text/html", "image/png"]);
        assert_eq!(related.parts()[1].file_name().as_deref(), Some("late.png"));
    }

    #[test]
    fn test_calendar_invite_layout() {
        let mut message = EmailMessage::new();
        message.kind = MessageKind::CalendarInvite;
        message.html_body = Some("<p>Meeting</p>".to_string());
        message.text_body = Some("Meeting".to_string());
        message.add_attachment(
            Attachment::new(
                "",
                "text/calendar;method=REQUEST",
                ContentDisposition::Inline,
                b"BEGIN:VCALENDAR".to_vec(),
            )
            .with_content_class(crate::attachment::CALENDAR_CONTENT_CLASS)
            .unwrap(),
        );
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();

        let root = &assembled.mime.root;
        assert_eq!(kinds(root), vec!["text/html", "text/calendar"]);
        let invite = &root.parts()[1];
        assert_eq!(
            invite.content_type().unwrap().parameter("method"),
            Some("REQUEST")
        );
        assert_eq!(
            invite.headers.get("Content-Class"),
            Some("urn:content-classes:calendarmessage")
        );
    }

    #[test]
    fn test_root_content_type() {
        let mut message = EmailMessage::new();
        message.root_content_type = RootContentType::Alternative;
        message.text_body = Some("x".to_string());
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();
        assert_eq!(
            assembled.mime.root.content_type().unwrap().essence(),
            "multipart/alternative"
        );
    }

    #[test]
    fn test_header_order_and_values() {
        let mut message = EmailMessage::new();
        message.from.push(Address::parse("Sender <s@example.com>").unwrap());
        message.to.push(Address::parse("t@example.com").unwrap());
        message.bcc.push(Address::parse("b@example.com").unwrap());
        message.reply_to.push(Address::parse("r@example.com").unwrap());
        message.read_receipt.push(Address::parse("Reader <read@example.com>").unwrap());
        message.importance = MessagePriority::High;
        message.add_header(Header::new("X-Tag", "one").unwrap());
        message.add_header(Header::new("X-Tag", "two").unwrap());
        message.subject = Some("Hi".to_string());
        message.message_id = Some("<fixed@example.com>".to_string());

        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();
        let headers = &assembled.mime.headers;
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "Date",
                "Message-ID",
                "From",
                "To",
                "Bcc",
                "Reply-To",
                "Disposition-Notification-To",
                "X-Priority",
                "Priority",
                "Importance",
                "X-Tag",
                "X-Tag",
                "Subject",
                "MIME-Version",
            ]
        );
        assert_eq!(headers.get("Message-ID"), Some("<fixed@example.com>"));
        assert_eq!(assembled.message_id, "fixed@example.com");
        assert_eq!(headers.get("Disposition-Notification-To"), Some("<read@example.com>"));
        assert_eq!(headers.get("From"), Some("Sender <s@example.com>"));
    }

    #[test]
    fn test_generated_message_id_uses_domain() {
        let message = EmailMessage::new();
        let assembled = assemble(&message, &AssemblyOptions::with_domain("mail.test")).unwrap();
        assert!(assembled.message_id.ends_with("@mail.test"));
        assert!(generate_message_id(None).contains('@'));
    }

    #[test]
    fn test_unsupported_charset_names_field() {
        let mut message = EmailMessage::new();
        message.charset = "KOI8-R".to_string();
        message.text_body = Some("x".to_string());
        let err = assemble(&message, &AssemblyOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Assembly { ref field, .. } if field == "text body"));
    }

    #[test]
    fn test_mime_type_with_line_break_fails() {
        let mut message = EmailMessage::new();
        message.text_body = Some("x".to_string());
        message.add_attachment(Attachment::new(
            "report.pdf",
            "application/pdf; x=\"a\r\nX-Evil: 1\"",
            ContentDisposition::Attachment,
            vec![0],
        ));
        let err = assemble(&message, &AssemblyOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Assembly { ref field, .. } if field == "attachment report.pdf"));
    }

    #[test]
    fn test_line_break_in_message_id_fails() {
        let mut message = EmailMessage::new();
        message.message_id = Some("id@example.com>\r\nX-Evil: 1".to_string());
        message.text_body = Some("x".to_string());
        let err = assemble(&message, &AssemblyOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Assembly { ref field, .. } if field == "Message-ID"));
    }

    #[test]
    fn test_raw_header_with_line_break_never_reaches_wire() {
        let mut message = EmailMessage::new();
        message.headers.push(Header {
            name: "X-Note".to_string(),
            value: "ok\r\nBcc: evil@example.com".to_string(),
        });
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();
        assert!(assembled.to_transport_bytes().is_err());
    }

    #[test]
    fn test_latin1_body() {
        let mut message = EmailMessage::new();
        message.charset = "ISO-8859-1".to_string();
        message.text_body = Some("café".to_string());
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();
        let text = &assembled.mime.root.parts()[0];
        assert_eq!(text.data().unwrap().len(), 4);
        assert_eq!(text.body_text().unwrap(), "café");
    }

    #[test]
    fn test_envelope_and_bcc_hidden() {
        let mut message = EmailMessage::new();
        message.from.push(Address::parse("s@example.com").unwrap());
        message.to.push(Address::parse("t@example.com").unwrap());
        message.bcc.push(Address::parse("b@example.com").unwrap());
        message.text_body = Some("x".to_string());
        let assembled = assemble(&message, &AssemblyOptions::default()).unwrap();

        assert_eq!(assembled.envelope.recipients.len(), 2);
        let wire = String::from_utf8(assembled.to_transport_bytes().unwrap()).unwrap();
        assert!(!wire.contains("b@example.com"));
    }
}
