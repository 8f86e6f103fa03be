//! # missive-mime
//!
//! The MIME toolkit underneath `missive`: content types, ordered headers,
//! transfer and header encodings, and a multipart tree that can be written to
//! and parsed from RFC 5322 bytes.
//!
//! ## Features
//!
//! - **Headers**: ordered, case-insensitive, with `add` (accumulate) versus `set` (replace)
//! - **Encoding/Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words, header folding
//! - **Charsets**: UTF-8, US-ASCII and ISO-8859-1 transcoding
//! - **Multipart**: mixed, related and alternative containers with generated boundaries
//! - **Parsing**: recursive multipart parser for complete messages
//!
//! ## Quick Start
//!
//! ### Building a message
//!
//! ```
//! use missive_mime::{ContentType, Headers, MimeMessage, MultipartKind, Part};
//!
//! let mut root = Part::multipart(MultipartKind::Mixed);
//! if let Some(container) = root.as_multipart_mut() {
//!     container.push(Part::text(&ContentType::text_plain("UTF-8"), b"Hello".to_vec()));
//! }
//!
//! let mut headers = Headers::new();
//! headers.add("Subject", "Greetings");
//! let message = MimeMessage::new(headers, root);
//! let bytes = message.to_transport_bytes()?;
//! assert!(bytes.starts_with(b"Subject: Greetings\r\n"));
//! # Ok::<(), missive_mime::Error>(())
//! ```
//!
//! ### Parsing a message
//!
//! ```
//! use missive_mime::MimeMessage;
//!
//! let raw = b"Subject: Test\r\nContent-Type: text/plain\r\n\r\nHello, World!";
//! let message = MimeMessage::parse(raw)?;
//! assert_eq!(message.subject().as_deref(), Some("Test"));
//! assert_eq!(message.root.body_text()?, "Hello, World!");
//! # Ok::<(), missive_mime::Error>(())
//! ```
//!
//! ### Encoding/Decoding
//!
//! ```
//! use missive_mime::encoding::{decode_rfc2047, encode_rfc2047};
//!
//! let encoded = encode_rfc2047("Héllo", "UTF-8")?;
//! assert_eq!(decode_rfc2047(&encoded)?, "Héllo");
//! # Ok::<(), missive_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;
mod part;

pub mod encoding;

pub use content_type::{ContentType, MultipartKind, format_parameter_value};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::MimeMessage;
pub use part::{Body, Multipart, Part, TransferEncoding};
