//! The email message aggregate and its value types.

use crate::address::Address;
use crate::attachment::Attachment;
use crate::error::Result;
use missive_mime::{Headers, MultipartKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Charset used when none is configured.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// A free-form message header.
///
/// The value is stored RFC 2047 encoded and folded, ready for the wire.
/// Deserialized headers are checked the same way: a valid field name and no
/// line break other than a fold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawHeader")]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Encoded header value.
    pub value: String,
}

impl Header {
    /// Creates a header, encoding a non-ASCII value as UTF-8 encoded words
    /// and folding long values.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid field name or the value
    /// contains a line break.
    pub fn new(name: impl Into<String>, value: &str) -> Result<Self> {
        let name = name.into();
        if !Headers::is_valid_name(&name) {
            return Err(missive_mime::Error::InvalidHeader(name).into());
        }
        let value = Headers::encode_value(&name, value, DEFAULT_CHARSET)?;
        Ok(Self { name, value })
    }

    /// Decodes the value back to text.
    #[must_use]
    pub fn decoded_value(&self) -> String {
        Headers::decode_value(&self.value).unwrap_or_else(|_| self.value.clone())
    }
}

#[derive(Deserialize)]
struct RawHeader {
    name: String,
    value: String,
}

impl TryFrom<RawHeader> for Header {
    type Error = missive_mime::Error;

    fn try_from(raw: RawHeader) -> std::result::Result<Self, Self::Error> {
        if !Headers::is_valid_name(&raw.name) {
            return Err(missive_mime::Error::InvalidHeader(raw.name));
        }
        if !Headers::is_valid_value(&raw.value) {
            return Err(missive_mime::Error::InvalidHeader(format!(
                "{}: value contains a line break",
                raw.name
            )));
        }
        Ok(Self {
            name: raw.name,
            value: raw.value,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Well-known receipt headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailHeader {
    /// Delivery receipt request.
    DeliveryReceipt,
    /// Read receipt request.
    ReadReceipt,
}

impl MailHeader {
    /// The header name written for this receipt kind.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::DeliveryReceipt => "Return-Receipt-To",
            Self::ReadReceipt => "Disposition-Notification-To",
        }
    }
}

/// Message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePriority {
    /// Low priority.
    Low,
    /// Normal priority; no priority headers are written.
    #[default]
    Normal,
    /// High priority.
    High,
}

impl MessagePriority {
    /// Value of the `X-Priority` header.
    #[must_use]
    pub const fn x_priority(self) -> &'static str {
        match self {
            Self::Low => "5",
            Self::Normal => "3",
            Self::High => "1",
        }
    }

    /// Value of the `Priority` header.
    #[must_use]
    pub const fn priority(self) -> &'static str {
        match self {
            Self::Low => "non-urgent",
            Self::Normal => "normal",
            Self::High => "urgent",
        }
    }

    /// Value of the `Importance` header.
    #[must_use]
    pub const fn importance(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    /// Maps an `X-Priority` value back to a priority.
    #[must_use]
    pub fn from_x_priority(value: &str) -> Self {
        match value.trim().chars().next() {
            Some('1' | '2') => Self::High,
            Some('4' | '5') => Self::Low,
            _ => Self::Normal,
        }
    }
}

/// Type of the top-level multipart container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootContentType {
    /// multipart/mixed.
    #[default]
    Mixed,
    /// multipart/related.
    Related,
    /// multipart/alternative.
    Alternative,
}

impl From<RootContentType> for MultipartKind {
    fn from(value: RootContentType) -> Self {
        match value {
            RootContentType::Mixed => Self::Mixed,
            RootContentType::Related => Self::Related,
            RootContentType::Alternative => Self::Alternative,
        }
    }
}

/// Kind of message being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Regular message with text and/or HTML bodies.
    #[default]
    Standard,
    /// Calendar invitation carrying a `text/calendar` payload.
    CalendarInvite,
}

/// iCalendar method of a calendar invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum ICalMethod {
    Publish,
    Request,
    Refresh,
    Cancel,
    Add,
    Reply,
    Counter,
    DeclineCounter,
}

impl ICalMethod {
    /// Upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "PUBLISH",
            Self::Request => "REQUEST",
            Self::Refresh => "REFRESH",
            Self::Cancel => "CANCEL",
            Self::Add => "ADD",
            Self::Reply => "REPLY",
            Self::Counter => "COUNTER",
            Self::DeclineCounter => "DECLINECOUNTER",
        }
    }
}

impl fmt::Display for ICalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The message aggregate.
///
/// Serialized field order is stable: message id, importance, charset, the
/// address lists, subject, bodies, headers, root content type, type and
/// attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailMessage {
    /// Caller-supplied or sent Message-ID, without angle brackets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Priority.
    pub importance: MessagePriority,
    /// Charset for text parts and encoded headers.
    pub charset: String,
    /// From addresses.
    pub from: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To recipients.
    pub to: Vec<Address>,
    /// Cc recipients.
    pub cc: Vec<Address>,
    /// Bcc recipients.
    pub bcc: Vec<Address>,
    /// SMTP envelope sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope_from: Option<Address>,
    /// Addresses receiving a delivery receipt.
    pub delivery_receipt: Vec<Address>,
    /// Addresses receiving a read receipt.
    pub read_receipt: Vec<Address>,
    /// Subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Plain text body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    /// HTML body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// User headers, in the order they were added.
    pub headers: Vec<Header>,
    /// Top-level container type.
    pub root_content_type: RootContentType,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Attachments, in the order they were added.
    pub attachments: Vec<Attachment>,
}

impl Default for EmailMessage {
    fn default() -> Self {
        Self {
            message_id: None,
            importance: MessagePriority::Normal,
            charset: DEFAULT_CHARSET.to_string(),
            from: Vec::new(),
            reply_to: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            envelope_from: None,
            delivery_receipt: Vec::new(),
            read_receipt: Vec::new(),
            subject: None,
            text_body: None,
            html_body: None,
            headers: Vec::new(),
            root_content_type: RootContentType::Mixed,
            kind: MessageKind::Standard,
            attachments: Vec::new(),
        }
    }
}

impl EmailMessage {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attachment.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Adds a header; repeated names accumulate.
    pub fn add_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Every envelope recipient: To, then Cc, then Bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// The SMTP envelope sender: the envelope-from address, else the first
    /// From address.
    #[must_use]
    pub fn sender(&self) -> Option<&Address> {
        self.envelope_from.as_ref().or_else(|| self.from.first())
    }

    /// Serializes the message to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    /// Deserializes a message from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a message.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_priority_literals() {
        assert_eq!(
            (
                MessagePriority::High.x_priority(),
                MessagePriority::High.priority(),
                MessagePriority::High.importance()
            ),
            ("1", "urgent", "high")
        );
        assert_eq!(
            (
                MessagePriority::Low.x_priority(),
                MessagePriority::Low.priority(),
                MessagePriority::Low.importance()
            ),
            ("5", "non-urgent", "low")
        );
        assert_eq!(MessagePriority::from_x_priority("1 (Highest)"), MessagePriority::High);
        assert_eq!(MessagePriority::from_x_priority("3"), MessagePriority::Normal);
    }

    #[test]
    fn test_header_encodes_and_compares_both_fields() {
        let header = Header::new("X-Note", "Grüße").unwrap();
        assert!(header.value.starts_with("=?UTF-8?B?"));
        assert_eq!(header.decoded_value(), "Grüße");

        let a = Header::new("X-A", "same").unwrap();
        let b = Header::new("X-B", "same").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, Header::new("X-A", "same").unwrap());
    }

    #[test]
    fn test_header_rejects_injection() {
        assert!(Header::new("X-A", "one\r\nBcc: evil@example.com").is_err());
        assert!(Header::new("Bad Name", "v").is_err());
        assert!(Header::new("", "v").is_err());
    }

    #[test]
    fn test_deserialized_header_is_checked() {
        let folded: Header =
            serde_json::from_str(r#"{"name":"X-Long","value":"a\r\n b"}"#).unwrap();
        assert_eq!(folded.decoded_value(), "a b");

        for json in [
            r#"{"name":"X-Note","value":"ok\r\nBcc: evil@example.com"}"#,
            r#"{"name":"X-Note","value":"ok\nBcc: evil@example.com"}"#,
            r#"{"name":"X Note","value":"ok"}"#,
        ] {
            assert!(serde_json::from_str::<Header>(json).is_err(), "{json}");
        }
    }

    #[test]
    fn test_from_json_rejects_invalid_fields() {
        let bad_address = r#"{"to":[{"email":"woo foo @bar.com"}]}"#;
        assert!(matches!(EmailMessage::from_json(bad_address), Err(Error::Serde(_))));

        let bad_header = r#"{"headers":[{"name":"X-Note","value":"ok\r\nBcc: evil@example.com"}]}"#;
        assert!(matches!(EmailMessage::from_json(bad_header), Err(Error::Serde(_))));
    }

    #[test]
    fn test_defaults() {
        let message = EmailMessage::new();
        assert_eq!(message.charset, "UTF-8");
        assert_eq!(message.root_content_type, RootContentType::Mixed);
        assert_eq!(message.kind, MessageKind::Standard);
        assert_eq!(message.importance, MessagePriority::Normal);
    }

    #[test]
    fn test_json_field_order() {
        let mut message = EmailMessage::new();
        message.message_id = Some("id@example.com".to_string());
        message.subject = Some("Hi".to_string());
        let json = message.to_json().unwrap();

        let keys = [
            "\"messageId\"",
            "\"importance\"",
            "\"charset\"",
            "\"from\"",
            "\"replyTo\"",
            "\"to\"",
            "\"cc\"",
            "\"bcc\"",
            "\"deliveryReceipt\"",
            "\"readReceipt\"",
            "\"subject\"",
            "\"headers\"",
            "\"rootContentType\"",
            "\"type\"",
            "\"attachments\"",
        ];
        let positions: Vec<_> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
        assert!(json.contains("\"type\": \"STANDARD\""));
    }

    #[test]
    fn test_sender_prefers_envelope_from() {
        let mut message = EmailMessage::new();
        message.from.push(Address::parse("a@example.com").unwrap());
        assert_eq!(message.sender().unwrap().email(), "a@example.com");
        message.envelope_from = Some(Address::parse("bounce@example.com").unwrap());
        assert_eq!(message.sender().unwrap().email(), "bounce@example.com");
    }
}
