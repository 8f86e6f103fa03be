//! Attachments: named, typed, disposition-tagged byte payloads.

use crate::error::{Error, Result};
use crate::message::Header;
use missive_mime::ContentType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Content class carried by calendar invitation payloads.
pub const CALENDAR_CONTENT_CLASS: &str = "urn:content-classes:calendarmessage";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// How an attachment is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentDisposition {
    /// Offered as a separate file.
    Attachment,
    /// Displayed within the body, typically referenced through `cid:`.
    Inline,
}

impl ContentDisposition {
    /// Header token for this disposition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

impl fmt::Display for ContentDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentDisposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.split(';').next().unwrap_or_default().trim();
        if token.eq_ignore_ascii_case("attachment") {
            Ok(Self::Attachment)
        } else if token.eq_ignore_ascii_case("inline") {
            Ok(Self::Inline)
        } else {
            Err(Error::UnsupportedDisposition(s.to_string()))
        }
    }
}

/// An attachment.
///
/// Every constructor assigns a fresh random content id; it stays the same
/// for the lifetime of the value and is what `cid:` references point at.
/// Deserialization rejects a malformed MIME type or content id.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAttachment")]
pub struct Attachment {
    content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    mime_type: String,
    #[serde(rename = "contentDisposition")]
    disposition: ContentDisposition,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAttachment {
    content_id: String,
    #[serde(default)]
    file_name: Option<String>,
    mime_type: String,
    #[serde(rename = "contentDisposition")]
    disposition: ContentDisposition,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(with = "base64_bytes")]
    bytes: Vec<u8>,
}

fn is_valid_content_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_graphic() && c != '<' && c != '>')
}

impl TryFrom<RawAttachment> for Attachment {
    type Error = Error;

    fn try_from(raw: RawAttachment) -> Result<Self> {
        ContentType::parse(&raw.mime_type)?;
        if !is_valid_content_id(&raw.content_id) {
            return Err(missive_mime::Error::InvalidHeader(format!(
                "Content-ID: {}",
                raw.content_id.escape_debug()
            ))
            .into());
        }
        Ok(Self {
            content_id: raw.content_id,
            file_name: raw
                .file_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            mime_type: raw.mime_type,
            disposition: raw.disposition,
            headers: raw.headers,
            bytes: raw.bytes,
        })
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("content_id", &self.content_id)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("disposition", &self.disposition)
            .field("headers", &self.headers)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn new_content_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Guesses a MIME type from a file name's extension.
fn guess_mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map_or_else(|| DEFAULT_MIME_TYPE.to_string(), |mime| mime.to_string())
}

impl Attachment {
    /// Creates an attachment from raw bytes.
    ///
    /// A blank file name leaves the attachment unnamed; unnamed attachments
    /// cannot be referenced from templates.
    #[must_use]
    pub fn new(
        file_name: &str,
        mime_type: &str,
        disposition: ContentDisposition,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let file_name = file_name.trim();
        Self {
            content_id: new_content_id(),
            file_name: (!file_name.is_empty()).then(|| file_name.to_string()),
            mime_type: mime_type.to_string(),
            disposition,
            headers: Vec::new(),
            bytes: bytes.into(),
        }
    }

    /// Creates an attachment by reading a stream to its end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if reading fails.
    pub fn from_reader(
        file_name: &str,
        mime_type: &str,
        disposition: ContentDisposition,
        mut reader: impl Read,
    ) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|e| {
            Error::attachment(format!("Wasn't able to read attachment {file_name}"), e)
        })?;
        Ok(Self::new(file_name, mime_type, disposition, bytes))
    }

    /// Creates an attachment from a file; the name comes from the path and
    /// the MIME type is guessed from its extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] if the file cannot be read.
    pub fn from_file(disposition: ContentDisposition, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::attachment(
                format!("Wasn't able to create email attachment from file {}", path.display()),
                e,
            )
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = guess_mime_type(&file_name);
        debug!(file = %path.display(), %mime_type, size = bytes.len(), "Loaded attachment");
        Ok(Self::new(&file_name, &mime_type, disposition, bytes))
    }

    /// Fetches an attachment over HTTP(S), blocking until the body is read.
    ///
    /// The MIME type comes from the response's `Content-Type`, falling back
    /// to a guess from the file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] naming the URL if it is malformed, the
    /// request fails or the server answers with an error status.
    pub fn from_url(url: &str, file_name: &str, disposition: ContentDisposition) -> Result<Self> {
        let failed = |e: Box<dyn std::error::Error + Send + Sync>| {
            Error::attachment(
                format!("Wasn't able to create email attachment from URL: {url}"),
                e,
            )
        };

        let parsed = reqwest::Url::parse(url).map_err(|e| failed(e.into()))?;
        debug!(%url, "Fetching attachment");

        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| failed(e.into()))?;
        let response = client
            .get(parsed)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| {
                warn!(%url, error = %e, "Attachment fetch failed");
                failed(e.into())
            })?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| guess_mime_type(file_name));
        let bytes = response.bytes().map_err(|e| failed(e.into()))?;

        debug!(%url, %mime_type, size = bytes.len(), "Fetched attachment");
        Ok(Self::new(file_name, &mime_type, disposition, bytes.to_vec()))
    }

    /// Adds a `Content-Class` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the class contains a line break.
    pub fn with_content_class(self, content_class: &str) -> Result<Self> {
        Ok(self.with_header(Header::new("Content-Class", content_class)?))
    }

    /// Adds a header written on the attachment's part.
    #[must_use]
    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// The content id (without `cid:` or angle brackets).
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// The `cid:` URI referencing this attachment.
    #[must_use]
    pub fn cid(&self) -> String {
        format!("cid:{}", self.content_id)
    }

    /// The file name, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// The MIME type, possibly with parameters.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The disposition.
    #[must_use]
    pub const fn disposition(&self) -> ContentDisposition {
        self.disposition
    }

    /// Extra part headers.
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The payload.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reassembles an attachment read back from a message, keeping its id.
    pub(crate) fn restore(
        content_id: Option<String>,
        file_name: Option<String>,
        mime_type: String,
        disposition: ContentDisposition,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            content_id: content_id.unwrap_or_else(new_content_id),
            file_name,
            mime_type,
            disposition,
            headers: Vec::new(),
            bytes,
        }
    }
}

/// Indexes attachments by file name; unnamed attachments are left out.
///
/// When two attachments share a name the later one wins.
#[must_use]
pub fn lookup_by_file_name(attachments: &[Attachment]) -> HashMap<&str, &Attachment> {
    attachments
        .iter()
        .filter_map(|a| a.file_name().map(|name| (name, a)))
        .collect()
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
