//! MIME body parts and multipart containers.

use crate::content_type::{ContentType, MultipartKind};
use crate::encoding::{
    decode_base64, decode_charset, decode_quoted_printable, encode_base64_lines,
    encode_quoted_printable,
};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;
use std::io::Write;

/// Longest line a 7bit body may carry (RFC 5322).
const MAX_7BIT_LINE: usize = 998;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }

    /// Picks the encoding for a text body: 7bit when it is plain ASCII with
    /// short lines, quoted-printable otherwise.
    #[must_use]
    pub fn for_text(data: &[u8]) -> Self {
        let ascii = data.iter().all(|&b| b != 0 && b.is_ascii());
        let short_lines = data
            .split(|&b| b == b'\n')
            .all(|line| line.len() <= MAX_7BIT_LINE);
        if ascii && short_lines {
            Self::SevenBit
        } else {
            Self::QuotedPrintable
        }
    }

    fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64 => encode_base64_lines(data).into_bytes(),
            Self::QuotedPrintable => encode_quoted_printable(data).into_bytes(),
            Self::SevenBit | Self::EightBit => normalize_line_endings(data),
            Self::Binary => data.to_vec(),
        }
    }

    fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(&String::from_utf8_lossy(data)),
            Self::QuotedPrintable => decode_quoted_printable(&String::from_utf8_lossy(data)),
            _ => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Converts bare `\n` line endings to `\r\n`.
fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut previous = 0u8;
    for &byte in data {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    out
}

/// Body of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Decoded leaf content.
    Leaf(Vec<u8>),
    /// Nested parts.
    Multipart(Multipart),
}

/// A multipart container: a boundary and its child parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    boundary: String,
    parts: Vec<Part>,
}

impl Multipart {
    /// Creates an empty container with a fresh random boundary.
    #[must_use]
    pub fn new() -> Self {
        Self::with_boundary(format!("----=_Part_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Creates an empty container with the given boundary.
    #[must_use]
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    /// Returns the boundary.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Appends a child part.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    /// Inserts a child part at `index`, shifting later parts back.
    ///
    /// An index past the end appends.
    pub fn insert(&mut self, index: usize, part: Part) {
        let index = index.min(self.parts.len());
        self.parts.insert(index, part);
    }

    /// Returns the child parts.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Number of child parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Checks whether the container has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

/// MIME message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body.
    pub body: Body,
}

impl Part {
    /// Creates a leaf part holding decoded content.
    ///
    /// Sets `Content-Type` and `Content-Transfer-Encoding`.
    #[must_use]
    pub fn leaf(content_type: &ContentType, encoding: TransferEncoding, data: Vec<u8>) -> Self {
        let mut headers = Headers::new();
        headers.set("Content-Type", content_type.to_string());
        headers.set("Content-Transfer-Encoding", encoding.to_string());
        Self {
            headers,
            body: Body::Leaf(data),
        }
    }

    /// Creates a text leaf in the given content type, choosing 7bit or
    /// quoted-printable from the encoded bytes.
    #[must_use]
    pub fn text(content_type: &ContentType, data: Vec<u8>) -> Self {
        let encoding = TransferEncoding::for_text(&data);
        Self::leaf(content_type, encoding, data)
    }

    /// Creates an empty multipart part of the given kind.
    #[must_use]
    pub fn multipart(kind: MultipartKind) -> Self {
        Self::from_multipart(kind, Multipart::new())
    }

    /// Wraps a container into a part of the given kind.
    #[must_use]
    pub fn from_multipart(kind: MultipartKind, multipart: Multipart) -> Self {
        let mut headers = Headers::new();
        headers.set(
            "Content-Type",
            ContentType::multipart(kind, multipart.boundary()).to_string(),
        );
        Self {
            headers,
            body: Body::Multipart(multipart),
        }
    }

    /// Gets the content type, defaulting to `text/plain; charset=us-ascii`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers.get("content-type").map_or_else(
            || Ok(ContentType::text_plain("us-ascii")),
            ContentType::parse,
        )
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Checks if this part is a multipart container.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, Body::Multipart(_))
    }

    /// Returns the container when this part is multipart.
    #[must_use]
    pub const fn as_multipart(&self) -> Option<&Multipart> {
        match &self.body {
            Body::Multipart(m) => Some(m),
            Body::Leaf(_) => None,
        }
    }

    /// Returns the mutable container when this part is multipart.
    pub fn as_multipart_mut(&mut self) -> Option<&mut Multipart> {
        match &mut self.body {
            Body::Multipart(m) => Some(m),
            Body::Leaf(_) => None,
        }
    }

    /// Child parts (empty for leaves).
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        self.as_multipart().map_or(&[][..], Multipart::parts)
    }

    /// Decoded leaf content.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Leaf(data) => Some(data),
            Body::Multipart(_) => None,
        }
    }

    /// Decodes the leaf content as text in its declared charset.
    ///
    /// # Errors
    ///
    /// Returns an error for multipart parts or malformed content.
    pub fn body_text(&self) -> Result<String> {
        let data = self
            .data()
            .ok_or_else(|| Error::InvalidMultipart("Use parts for multipart bodies".to_string()))?;
        let content_type = self.content_type()?;
        decode_charset(data, content_type.charset().unwrap_or("us-ascii"))
    }

    /// Returns the `Content-ID` without angle brackets.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        self.headers
            .get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
    }

    /// Returns the disposition type (e.g. `inline`), lower-cased.
    #[must_use]
    pub fn disposition(&self) -> Option<String> {
        let value = self.headers.get("content-disposition")?;
        let kind = value.split(';').next()?.trim();
        (!kind.is_empty()).then(|| kind.to_ascii_lowercase())
    }

    /// Returns the file name from `Content-Disposition` or the type's `name`.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        let from_disposition = self
            .headers
            .get("content-disposition")
            .and_then(|value| ContentType::parse(&format!("x/x;{value}")).ok())
            .and_then(|ct| ct.parameter("filename").map(str::to_string));
        from_disposition
            .or_else(|| {
                self.content_type()
                    .ok()
                    .and_then(|ct| ct.parameter("name").map(str::to_string))
            })
            .map(|name| crate::encoding::decode_rfc2047(&name).unwrap_or(name))
    }

    /// Every leaf part, depth-first.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match &self.body {
            Body::Leaf(_) => out.push(self),
            Body::Multipart(m) => m.parts.iter().for_each(|p| p.collect_leaves(out)),
        }
    }

    /// Writes the part (headers, blank line, body).
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        self.headers.write_to(out)?;
        out.write_all(b"\r\n")?;
        self.write_body(out)
    }

    pub(crate) fn write_body<W: Write>(&self, out: &mut W) -> Result<()> {
        match &self.body {
            Body::Leaf(data) => {
                out.write_all(&self.transfer_encoding().encode(data))?;
            }
            Body::Multipart(multipart) => {
                for part in &multipart.parts {
                    write!(out, "--{}\r\n", multipart.boundary)?;
                    part.write_to(out)?;
                    out.write_all(b"\r\n")?;
                }
                write!(out, "--{}--\r\n", multipart.boundary)?;
            }
        }
        Ok(())
    }

    /// Parses a part from raw bytes (headers, blank line, body).
    ///
    /// # Errors
    ///
    /// Returns an error if headers are malformed or a multipart body has no
    /// boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head))?;
        Self::from_parts(headers, body)
    }

    pub(crate) fn from_parts(headers: Headers, body: &[u8]) -> Result<Self> {
        let content_type = headers.get("content-type").map(ContentType::parse).transpose()?;

        if let Some(ct) = content_type.filter(ContentType::is_multipart) {
            let boundary = ct.boundary().ok_or(Error::MissingBoundary)?;
            let mut multipart = Multipart::with_boundary(boundary);
            for chunk in split_multipart(body, boundary)? {
                multipart.push(Self::parse(chunk)?);
            }
            return Ok(Self {
                headers,
                body: Body::Multipart(multipart),
            });
        }

        let encoding = headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let data = encoding.decode(body)?;
        Ok(Self {
            headers,
            body: Body::Leaf(data),
        })
    }
}

/// Splits raw bytes at the first empty line.
pub(crate) fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.starts_with(b"\r\n") {
        return (&[], &raw[2..]);
    }
    if raw.starts_with(b"\n") {
        return (&[], &raw[1..]);
    }
    let crlf = find(raw, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(raw, b"\n\n").map(|i| (i, i + 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    split.map_or((raw, &[][..]), |(end, start)| (&raw[..end], &raw[start..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn strip_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits a multipart body into its encapsulated parts.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    // (line start, line end, closing)
    let mut markers = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        let end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i + 1);
        let line = strip_line_break(&body[pos..end]);
        if let Some(rest) = line.strip_prefix(delimiter) {
            let closing = rest.starts_with(b"--");
            if closing || rest.iter().all(u8::is_ascii_whitespace) {
                markers.push((pos, end, closing));
                if closing {
                    break;
                }
            }
        }
        pos = end;
    }

    if markers.is_empty() {
        return Err(Error::InvalidMultipart(format!(
            "boundary {boundary} not found"
        )));
    }

    let mut parts = Vec::with_capacity(markers.len());
    for pair in markers.windows(2) {
        let (_, content_start, closing) = pair[0];
        if closing {
            break;
        }
        let content_end = pair[1].0;
        let mut chunk = &body[content_start..content_end.max(content_start)];
        // The line break before a delimiter belongs to the delimiter.
        chunk = chunk.strip_suffix(b"\n").unwrap_or(chunk);
        chunk = chunk.strip_suffix(b"\r").unwrap_or(chunk);
        parts.push(chunk);
    }

    Ok(parts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_transfer_encoding_for_text() {
        assert_eq!(TransferEncoding::for_text(b"Hello"), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::for_text("Grüße".as_bytes()),
            TransferEncoding::QuotedPrintable
        );
        let long = vec![b'a'; 1200];
        assert_eq!(TransferEncoding::for_text(&long), TransferEncoding::QuotedPrintable);
    }

    #[test]
    fn test_text_part_round_trip() {
        let part = Part::text(&ContentType::text_plain("UTF-8"), "Grüße".as_bytes().to_vec());
        let mut out = Vec::new();
        part.write_to(&mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains("Content-Transfer-Encoding: quoted-printable\r\n"));

        let parsed = Part::parse(&out).unwrap();
        assert_eq!(parsed.body_text().unwrap(), "Grüße");
    }

    #[test]
    fn test_multipart_write_and_parse() {
        let mut root = Multipart::with_boundary("outer");
        root.push(Part::text(&ContentType::text_plain("UTF-8"), b"first".to_vec()));
        root.push(Part::leaf(
            &ContentType::new("application", "octet-stream"),
            TransferEncoding::Base64,
            vec![0, 1, 2, 3],
        ));
        let part = Part::from_multipart(MultipartKind::Mixed, root);

        let mut out = Vec::new();
        part.write_to(&mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("--outer\r\n"));
        assert!(text.ends_with("--outer--\r\n"));

        let parsed = Part::parse(&out).unwrap();
        assert_eq!(parsed.parts().len(), 2);
        assert_eq!(parsed.parts()[0].body_text().unwrap(), "first");
        assert_eq!(parsed.parts()[1].data().unwrap(), &[0, 1, 2, 3]);
        assert_eq!(parsed.leaves().len(), 2);
    }

    #[test]
    fn test_parse_ignores_preamble_and_epilogue() {
        let raw = concat!(
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "This is a preamble.\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html</p>\r\n",
            "--b--\r\n",
            "epilogue\r\n"
        );
        let parsed = Part::parse(raw.as_bytes()).unwrap();
        let bodies: Vec<_> = parsed
            .parts()
            .iter()
            .map(|p| p.body_text().unwrap())
            .collect();
        assert_eq!(bodies, vec!["plain", "<p>html</p>"]);
    }

    #[test]
    fn test_missing_boundary() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        assert!(matches!(Part::parse(raw), Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_file_name_and_content_id() {
        let mut part = Part::leaf(
            &ContentType::new("image", "png").with_parameter("name", "logo.png"),
            TransferEncoding::Base64,
            vec![1],
        );
        part.headers.set("Content-ID", "<abc-123>");
        assert_eq!(part.file_name().as_deref(), Some("logo.png"));
        assert_eq!(part.content_id(), Some("abc-123"));

        part.headers
            .set("Content-Disposition", "inline; filename=\"my logo.png\"");
        assert_eq!(part.file_name().as_deref(), Some("my logo.png"));
        assert_eq!(part.disposition().as_deref(), Some("inline"));
    }

    #[test]
    fn test_line_endings_normalized() {
        assert_eq!(normalize_line_endings(b"a\nb\r\nc"), b"a\r\nb\r\nc");
    }
}
