//! The fluent message builder.
//!
//! [`MailMessage`] accumulates addresses, content and attachments into an
//! [`EmailMessage`], renders any deferred templates, and hands the result to
//! whichever delivery target it was given.
//!
//! ```
//! use missive::mail::MailMessage;
//! use missive::transport::MemoryTransport;
//!
//! let outbox = MemoryTransport::new();
//! let sent = MailMessage::with_transport(outbox.clone())
//!     .from("Sender <sender@example.com>")?
//!     .to("recipient@example.com")?
//!     .subject("Hello")
//!     .body_text("Hi there")
//!     .send()?;
//!
//! assert!(sent.message_id.is_some());
//! assert_eq!(outbox.len(), 1);
//! # Ok::<(), missive::Error>(())
//! ```

use crate::address::{Address, EmailContact};
use crate::attachment::{Attachment, CALENDAR_CONTENT_CLASS, ContentDisposition};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::message::{EmailMessage, Header, ICalMethod, MessageKind, MessagePriority, RootContentType};
use crate::template::{MailContext, TemplateContext, TemplateProvider};
use crate::transport::{SmtpTransport, Transport};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// A content field: either final text or a template rendered at merge time.
pub enum Field {
    /// Text used as is.
    Literal(String),
    /// Rendered once when templates are merged.
    Deferred(Box<dyn TemplateProvider>),
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl Field {
    /// Resolves the field, replacing a deferred template with its output.
    fn resolve(&mut self, context: &TemplateContext) -> Result<String> {
        let text = match self {
            Self::Literal(text) => return Ok(text.clone()),
            Self::Deferred(template) => template.render(context)?,
        };
        *self = Self::Literal(text.clone());
        Ok(text)
    }

    const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

macro_rules! address_setters {
    (
        $field:ident, $label:literal,
        $one:ident, $all:ident, $address:ident, $contact:ident, $contacts:ident
    ) => {
        #[doc = concat!("Adds a ", $label, " address parsed from `raw`.")]
        ///
        /// # Errors
        ///
        /// Returns [`Error::InvalidAddress`] if `raw` is malformed.
        pub fn $one(&mut self, raw: &str) -> Result<&mut Self> {
            self.message.$field.push(Address::parse(raw)?);
            Ok(self)
        }

        #[doc = concat!("Adds several ", $label, " addresses; nothing is added unless all parse.")]
        ///
        /// # Errors
        ///
        /// Returns [`Error::InvalidAddress`] naming the first malformed literal.
        pub fn $all<I, S>(&mut self, raws: I) -> Result<&mut Self>
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            let addresses = Address::parse_many(raws)?;
            self.message.$field.extend(addresses);
            Ok(self)
        }

        #[doc = concat!("Adds an already validated ", $label, " address.")]
        pub fn $address(&mut self, address: Address) -> &mut Self {
            self.message.$field.push(address);
            self
        }

        #[doc = concat!("Adds a ", $label, " address from a contact.")]
        ///
        /// # Errors
        ///
        /// Returns [`Error::InvalidAddress`] if the contact cannot be converted.
        pub fn $contact(&mut self, contact: &impl EmailContact) -> Result<&mut Self> {
            self.message.$field.push(Address::from_contact(contact)?);
            Ok(self)
        }

        #[doc = concat!("Adds ", $label, " addresses from contacts, skipping repeats.")]
        ///
        /// # Errors
        ///
        /// Returns [`Error::InvalidAddress`] for the first contact that cannot be
        /// converted; nothing is added in that case.
        pub fn $contacts<I>(&mut self, contacts: I) -> Result<&mut Self>
        where
            I: IntoIterator,
            I::Item: EmailContact,
        {
            let addresses = Address::from_contacts(contacts)?;
            self.message.$field.extend(addresses);
            Ok(self)
        }
    };
}

/// Fluent builder for a single message.
///
/// Delivery goes to the explicit transport if one is set, else the raw SMTP
/// session, else a transport built from the session configuration.
#[derive(Default)]
pub struct MailMessage {
    message: EmailMessage,
    subject: Option<Field>,
    text: Option<Field>,
    html: Option<Field>,
    values: HashMap<String, Value>,
    merged: bool,
    transport: Option<Box<dyn Transport>>,
    session: Option<lettre::SmtpTransport>,
    config: Option<SessionConfig>,
}

impl fmt::Debug for MailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailMessage")
            .field("message", &self.message)
            .field("subject", &self.subject)
            .field("text", &self.text)
            .field("html", &self.html)
            .field("values", &self.values)
            .field("merged", &self.merged)
            .field("transport", &self.transport.is_some())
            .field("session", &self.session.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl MailMessage {
    /// Creates a builder with no delivery target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder delivering through `transport`.
    #[must_use]
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        let mut mail = Self::new();
        mail.set_transport(transport);
        mail
    }

    /// Creates a builder delivering through a lettre SMTP session.
    #[must_use]
    pub fn with_session(session: lettre::SmtpTransport) -> Self {
        let mut mail = Self::new();
        mail.set_session(session);
        mail
    }

    /// Creates a builder delivering through a session configuration.
    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        let mut mail = Self::new();
        mail.set_config(config);
        mail
    }

    /// Sets the explicit transport.
    pub fn set_transport(&mut self, transport: impl Transport + 'static) -> &mut Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets the SMTP session.
    pub fn set_session(&mut self, session: lettre::SmtpTransport) -> &mut Self {
        self.session = Some(session);
        self
    }

    /// Sets the session configuration.
    pub fn set_config(&mut self, config: SessionConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    address_setters!(from, "From", from, from_all, from_address, from_contact, from_contacts);
    address_setters!(
        reply_to, "Reply-To",
        reply_to, reply_to_all, reply_to_address, reply_to_contact, reply_to_contacts
    );
    address_setters!(to, "To", to, to_all, to_address, to_contact, to_contacts);
    address_setters!(cc, "Cc", cc, cc_all, cc_address, cc_contact, cc_contacts);
    address_setters!(bcc, "Bcc", bcc, bcc_all, bcc_address, bcc_contact, bcc_contacts);

    /// Sets the SMTP envelope sender.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `raw` is malformed.
    pub fn envelope_from(&mut self, raw: &str) -> Result<&mut Self> {
        self.message.envelope_from = Some(Address::parse(raw)?);
        Ok(self)
    }

    /// Sets the SMTP envelope sender from a contact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the contact cannot be converted.
    pub fn envelope_from_contact(&mut self, contact: &impl EmailContact) -> Result<&mut Self> {
        self.message.envelope_from = Some(Address::from_contact(contact)?);
        Ok(self)
    }

    /// Requests a delivery receipt sent to `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `raw` is malformed.
    pub fn delivery_receipt(&mut self, raw: &str) -> Result<&mut Self> {
        self.message.delivery_receipt.push(Address::parse(raw)?);
        Ok(self)
    }

    /// Requests a read receipt sent to `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `raw` is malformed.
    pub fn read_receipt(&mut self, raw: &str) -> Result<&mut Self> {
        self.message.read_receipt.push(Address::parse(raw)?);
        Ok(self)
    }

    /// Sets the subject.
    pub fn subject(&mut self, subject: impl Into<String>) -> &mut Self {
        let subject = subject.into();
        self.message.subject = Some(subject.clone());
        self.subject = Some(Field::Literal(subject));
        self
    }

    /// Sets the plain text body.
    pub fn body_text(&mut self, text: impl Into<String>) -> &mut Self {
        let text = text.into();
        self.message.text_body = Some(text.clone());
        self.text = Some(Field::Literal(text));
        self
    }

    /// Sets the HTML body.
    pub fn body_html(&mut self, html: impl Into<String>) -> &mut Self {
        let html = html.into();
        self.message.html_body = Some(html.clone());
        self.html = Some(Field::Literal(html));
        self
    }

    /// Sets HTML and plain text alternatives of the same content.
    pub fn body_html_text_alt(&mut self, html: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.body_html(html).body_text(text)
    }

    fn defer(&mut self) {
        self.merged = false;
    }

    /// Renders the subject from a template at merge time.
    pub fn subject_template(&mut self, template: impl TemplateProvider + 'static) -> &mut Self {
        self.subject = Some(Field::Deferred(Box::new(template)));
        self.defer();
        self
    }

    /// Renders the plain text body from a template at merge time.
    pub fn body_text_template(&mut self, template: impl TemplateProvider + 'static) -> &mut Self {
        self.text = Some(Field::Deferred(Box::new(template)));
        self.defer();
        self
    }

    /// Renders the HTML body from a template at merge time.
    pub fn body_html_template(&mut self, template: impl TemplateProvider + 'static) -> &mut Self {
        self.html = Some(Field::Deferred(Box::new(template)));
        self.defer();
        self
    }

    /// Renders HTML and plain text alternatives from templates at merge time.
    pub fn body_html_text_alt_template(
        &mut self,
        html: impl TemplateProvider + 'static,
        text: impl TemplateProvider + 'static,
    ) -> &mut Self {
        self.body_html_template(html).body_text_template(text)
    }

    /// Sets the priority.
    pub const fn importance(&mut self, priority: MessagePriority) -> &mut Self {
        self.message.importance = priority;
        self
    }

    /// Uses a caller-chosen Message-ID instead of a generated one.
    pub fn message_id(&mut self, message_id: impl Into<String>) -> &mut Self {
        self.message.message_id = Some(message_id.into());
        self
    }

    /// Sets the charset of text parts and encoded headers.
    pub fn charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.message.charset = charset.into();
        self
    }

    /// Sets the type of the top-level container.
    pub const fn content_type(&mut self, root: RootContentType) -> &mut Self {
        self.message.root_content_type = root;
        self
    }

    /// Adds a header; repeated names accumulate.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the value contains a line
    /// break.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.message.add_header(Header::new(name, value)?);
        Ok(self)
    }

    /// Adds an attachment.
    pub fn add_attachment(&mut self, attachment: Attachment) -> &mut Self {
        self.message.add_attachment(attachment);
        self
    }

    /// Adds several attachments.
    pub fn add_attachments(&mut self, attachments: impl IntoIterator<Item = Attachment>) -> &mut Self {
        self.message.attachments.extend(attachments);
        self
    }

    /// Attaches raw bytes.
    pub fn attach_bytes(
        &mut self,
        file_name: &str,
        mime_type: &str,
        disposition: ContentDisposition,
        bytes: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.add_attachment(Attachment::new(file_name, mime_type, disposition, bytes))
    }

    /// Attaches the contents of a reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if reading fails.
    pub fn attach_reader(
        &mut self,
        file_name: &str,
        mime_type: &str,
        disposition: ContentDisposition,
        reader: impl Read,
    ) -> Result<&mut Self> {
        let attachment = Attachment::from_reader(file_name, mime_type, disposition, reader)?;
        Ok(self.add_attachment(attachment))
    }

    /// Attaches a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if the file cannot be read.
    pub fn attach_file(
        &mut self,
        disposition: ContentDisposition,
        path: impl AsRef<Path>,
    ) -> Result<&mut Self> {
        let attachment = Attachment::from_file(disposition, path)?;
        Ok(self.add_attachment(attachment))
    }

    /// Attaches a document fetched from a URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] naming the URL if the fetch fails.
    pub fn attach_url(
        &mut self,
        url: &str,
        file_name: &str,
        disposition: ContentDisposition,
    ) -> Result<&mut Self> {
        let attachment = Attachment::from_url(url, file_name, disposition)?;
        Ok(self.add_attachment(attachment))
    }

    fn add_invite(&mut self, method: ICalMethod, ics: impl Into<Vec<u8>>) -> Result<&mut Self> {
        self.message.kind = MessageKind::CalendarInvite;
        let invite = Attachment::new(
            "",
            &format!("text/calendar;method={method}"),
            ContentDisposition::Inline,
            ics,
        )
        .with_content_class(CALENDAR_CONTENT_CLASS)?;
        Ok(self.add_attachment(invite))
    }

    /// Turns the message into a calendar invitation with HTML and text
    /// descriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar payload cannot be built.
    pub fn ical(
        &mut self,
        html: impl Into<String>,
        text: impl Into<String>,
        method: ICalMethod,
        ics: impl Into<Vec<u8>>,
    ) -> Result<&mut Self> {
        self.body_html_text_alt(html, text);
        self.add_invite(method, ics)
    }

    /// Turns the message into a calendar invitation with a text description.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar payload cannot be built.
    pub fn ical_text(
        &mut self,
        text: impl Into<String>,
        method: ICalMethod,
        ics: impl Into<Vec<u8>>,
    ) -> Result<&mut Self> {
        self.body_text(text);
        self.add_invite(method, ics)
    }

    /// Exposes a value to templates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serde`] if the value cannot be represented as JSON.
    pub fn put(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<&mut Self> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Exposes several values to templates.
    pub fn put_all<I, K>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.values
            .extend(values.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    /// The message as built so far.
    #[must_use]
    pub const fn email_message(&self) -> &EmailMessage {
        &self.message
    }

    /// Replaces the message being built.
    ///
    /// Literal subject and bodies set earlier are dropped in favour of the
    /// new message's; pending templates are kept and render into it.
    pub fn set_email_message(&mut self, message: EmailMessage) -> &mut Self {
        self.message = message;
        for field in [&mut self.subject, &mut self.text, &mut self.html] {
            if field.as_ref().is_some_and(|f| !f.is_deferred()) {
                *field = None;
            }
        }
        self
    }

    /// Renders deferred fields and copies every field into the message.
    ///
    /// Each template renders once; later calls reuse its output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if a template fails to render.
    pub fn merge_templates(&mut self) -> Result<&EmailMessage> {
        let deferred = [&self.subject, &self.text, &self.html]
            .into_iter()
            .flatten()
            .filter(|field| field.is_deferred())
            .count();
        let context = TemplateContext::new(
            self.values.clone(),
            MailContext::new(&self.message.attachments),
        );

        if let Some(field) = self.subject.as_mut() {
            self.message.subject = Some(field.resolve(&context)?);
        }
        if let Some(field) = self.text.as_mut() {
            self.message.text_body = Some(field.resolve(&context)?);
        }
        if let Some(field) = self.html.as_mut() {
            self.message.html_body = Some(field.resolve(&context)?);
        }

        self.merged = true;
        if deferred > 0 {
            debug!(templates = deferred, "Merged templates");
        }
        Ok(&self.message)
    }

    fn dispatch(&self) -> Result<EmailMessage> {
        if let Some(transport) = &self.transport {
            debug!("Sending through configured transport");
            return transport.send(&self.message);
        }
        if let Some(session) = &self.session {
            debug!("Sending through SMTP session");
            return SmtpTransport::new(session.clone(), None).send(&self.message);
        }
        if let Some(config) = &self.config {
            debug!(host = %config.host, port = config.port, "Sending through session configuration");
            return SmtpTransport::from_config(config)?.send(&self.message);
        }
        Err(Error::send(
            "No resource available to send: set a transport, session or configuration",
        ))
    }

    /// Sends through `transport`, ignoring any configured target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if a template fails, otherwise
    /// [`Error::Send`] wrapping the delivery failure.
    pub fn send_with(&mut self, transport: &impl Transport) -> Result<EmailMessage> {
        if !self.merged {
            self.merge_templates()?;
        }
        let sent = transport.send(&self.message).map_err(wrap_send)?;
        self.finish_send(sent)
    }

    /// Merges templates if needed and sends.
    ///
    /// Returns the message as sent, carrying its final Message-ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Templating`] if a template fails, otherwise
    /// [`Error::Send`]: when no delivery target is set, or wrapping the
    /// assembly or transport failure.
    pub fn send(&mut self) -> Result<EmailMessage> {
        if !self.merged {
            self.merge_templates()?;
        }
        let sent = self.dispatch().map_err(wrap_send)?;
        self.finish_send(sent)
    }

    fn finish_send(&mut self, sent: EmailMessage) -> Result<EmailMessage> {
        self.message.message_id.clone_from(&sent.message_id);
        info!(
            message_id = sent.message_id.as_deref().unwrap_or_default(),
            recipients = sent.recipients().count(),
            "Mail sent"
        );
        Ok(sent)
    }
}

fn wrap_send(error: Error) -> Error {
    match error {
        Error::Send { .. } => error,
        other => Error::send_failed(other.to_string(), other),
    }
}
