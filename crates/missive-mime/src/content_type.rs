//! MIME content type handling.

use crate::error::{Error, Result};
use std::fmt;

/// MIME content type with parameters.
///
/// Parameters keep their insertion order so that rendered headers are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: Vec<(String, String)>,
}

/// The multipart flavours a message tree is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultipartKind {
    /// Independent parts (body plus attachments).
    Mixed,
    /// A body together with the resources it references.
    Related,
    /// Several renderings of the same content.
    Alternative,
}

impl MultipartKind {
    /// Returns the MIME subtype for this kind.
    #[must_use]
    pub const fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Related => "related",
            Self::Alternative => "alternative",
        }
    }

    /// Maps a multipart subtype back to a kind.
    #[must_use]
    pub fn from_subtype(sub_type: &str) -> Option<Self> {
        match sub_type.to_ascii_lowercase().as_str() {
            "mixed" => Some(Self::Mixed),
            "related" => Some(Self::Related),
            "alternative" => Some(Self::Alternative),
            _ => None,
        }
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a text/plain content type in the given charset.
    #[must_use]
    pub fn text_plain(charset: &str) -> Self {
        Self::new("text", "plain").with_parameter("charset", charset)
    }

    /// Creates a text/html content type in the given charset.
    #[must_use]
    pub fn text_html(charset: &str) -> Self {
        Self::new("text", "html").with_parameter("charset", charset)
    }

    /// Creates a multipart content type of the given kind with a boundary.
    #[must_use]
    pub fn multipart(kind: MultipartKind, boundary: impl Into<String>) -> Self {
        Self::new("multipart", kind.subtype()).with_parameter("boundary", boundary)
    }

    /// Adds a parameter, replacing an existing one with the same name.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(key, value);
        self
    }

    /// Sets a parameter in place, replacing an existing one with the same name.
    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into().to_ascii_lowercase();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((key, value)),
        }
    }

    /// Returns a parameter value by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks the type and subtype, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Returns the multipart kind, if this is one the toolkit knows.
    #[must_use]
    pub fn multipart_kind(&self) -> Option<MultipartKind> {
        if self.is_multipart() {
            MultipartKind::from_subtype(&self.sub_type)
        } else {
            None
        }
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="quoted; value"`
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid or the value contains a
    /// line break.
    pub fn parse(s: &str) -> Result<Self> {
        if s.contains(['\r', '\n']) {
            return Err(Error::InvalidContentType(format!(
                "Line break in {}",
                s.escape_debug()
            )));
        }
        let mut parts = split_parameters(s).into_iter();

        let type_str = parts
            .next()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::InvalidContentType("Empty content type".to_string()))?;

        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in {type_str}")))?;
        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(type_str));
        }

        let mut content_type = Self::new(main_type, sub_type);

        for param in parts {
            if let Some((key, value)) = param.split_once('=') {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .map_or_else(|| value.to_string(), |v| v.replace("\\\"", "\""));
                content_type.set_parameter(key.trim(), value);
            }
        }

        Ok(content_type)
    }
}

/// Splits a header value on `;`, ignoring separators inside quoted strings.
pub(crate) fn split_parameters(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if quoted => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ';' if !quoted => out.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    out.push(current);
    out
}

/// Formats a parameter value, quoting it when it contains tspecials.
#[must_use]
pub fn format_parameter_value(value: &str) -> String {
    if value.is_empty()
        || value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c))
    {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        for (key, value) in &self.parameters {
            write!(f, "; {key}={}", format_parameter_value(value))?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_plain() {
        let ct = ContentType::text_plain("UTF-8");
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.charset(), Some("UTF-8"));
        assert_eq!(ct.to_string(), "text/plain; charset=UTF-8");
    }

    #[test]
    fn test_multipart_kinds() {
        let ct = ContentType::multipart(MultipartKind::Related, "b1");
        assert_eq!(ct.multipart_kind(), Some(MultipartKind::Related));
        assert_eq!(ct.boundary(), Some("b1"));
        assert!(ct.is_multipart());
        assert_eq!(ContentType::text_html("UTF-8").multipart_kind(), None);
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert_eq!(ct.essence(), "multipart/mixed");
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_parse_quoted_semicolon() {
        let ct = ContentType::parse("application/pdf; name=\"a;b.pdf\"; x=1").unwrap();
        assert_eq!(ct.parameter("name"), Some("a;b.pdf"));
        assert_eq!(ct.parameter("X"), Some("1"));
    }

    #[test]
    fn test_parse_calendar_method() {
        let ct = ContentType::parse("text/calendar;method=REQUEST").unwrap();
        assert!(ct.is("text", "calendar"));
        assert_eq!(ct.parameter("method"), Some("REQUEST"));
    }

    #[test]
    fn test_parse_rejects_missing_subtype() {
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("").is_err());
        assert!(ContentType::parse("text/").is_err());
    }

    #[test]
    fn test_parse_rejects_line_breaks() {
        let err = ContentType::parse("application/pdf; x=\"a\r\nX-Evil: 1\"").unwrap_err();
        assert!(matches!(err, Error::InvalidContentType(_)));
        assert!(ContentType::parse("text/plain;\n charset=utf-8").is_err());
    }

    #[test]
    fn test_display_quotes_specials() {
        let ct = ContentType::new("image", "png").with_parameter("name", "my logo.png");
        assert_eq!(ct.to_string(), "image/png; name=\"my logo.png\"");
    }

    #[test]
    fn test_with_parameter_replaces() {
        let ct = ContentType::text_plain("UTF-8").with_parameter("CHARSET", "ISO-8859-1");
        assert_eq!(ct.parameters.len(), 1);
        assert_eq!(ct.charset(), Some("ISO-8859-1"));
    }
}
