//! # missive
//!
//! Fluent email composition on top of `missive-mime`.
//!
//! This crate provides:
//! - **Addresses** - RFC 822 validation of literals and contacts
//! - **Attachments** - bytes, readers, files and URLs with stable content ids
//! - **MIME assembly** - mixed, related and alternative trees from a message model
//! - **Templates** - deferred subjects and bodies rendered with Tera, with `cid:` lookups
//! - **Builder** - [`MailMessage`], the fluent façade
//! - **Transports** - SMTP through lettre, plus an in-memory mailbox
//! - **Conversion** - raw RFC 5322 messages back into [`EmailMessage`] values
//!
//! ## Quick Start
//!
//! ```
//! use missive::{ContentDisposition, MailMessage, MemoryTransport, MessagePriority};
//!
//! let outbox = MemoryTransport::new();
//! let mut mail = MailMessage::with_transport(outbox.clone());
//! mail.from("Reports <reports@example.com>")?
//!     .to("team@example.com")?
//!     .subject("Weekly numbers")
//!     .body_html_text_alt("<p>See attached.</p>", "See attached.")
//!     .importance(MessagePriority::High)
//!     .attach_bytes("numbers.csv", "text/csv", ContentDisposition::Attachment, b"a,b\n1,2\n".to_vec());
//! mail.send()?;
//!
//! let sent = outbox.last().expect("one message");
//! assert_eq!(sent.mime.headers.get("X-Priority"), Some("1"));
//! # Ok::<(), missive::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod attachment;
pub mod config;
pub mod convert;
mod error;
pub mod mail;
pub mod message;
pub mod template;
pub mod transport;
pub mod tree;

pub use address::{Address, Contact, EmailContact};
pub use attachment::{Attachment, ContentDisposition};
pub use config::{SessionConfig, register_session};
pub use convert::parse_message;
pub use error::{BoxError, Error, Result};
pub use mail::{Field, MailMessage};
pub use message::{
    EmailMessage, Header, ICalMethod, MailHeader, MessageKind, MessagePriority, RootContentType,
};
pub use template::{MailContext, TemplateContext, TemplateProvider, TeraTemplate};
pub use transport::{MemoryTransport, SmtpTransport, Transport};
pub use tree::{AssembledMessage, AssemblyOptions, Envelope, MimeTreeBuilder, assemble};
