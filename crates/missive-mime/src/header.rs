//! MIME header handling.

use crate::encoding::{decode_rfc2047, encode_rfc2047, fold, unfold};
use crate::error::{Error, Result};
use std::fmt;
use std::io::Write;

/// Ordered collection of email headers.
///
/// Names keep the spelling they were added with and lookups ignore case.
/// [`Headers::add`] always appends, so repeated names accumulate, while
/// [`Headers::set`] replaces every existing value of that name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// The value takes the position of the first existing entry, or is
    /// appended when the header is new.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                self.entries[index] = (name.clone(), value);
                let mut seen = 0usize;
                self.entries.retain(|(n, _)| {
                    if n.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header, in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Checks whether a header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses headers from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation
    /// ```
    ///
    /// Parsing stops at the first empty line. Folded values are unfolded.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is neither a header nor a continuation.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidHeader(line.to_string()))?;
            current = Some((name.trim().to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        Ok(headers)
    }

    /// Encodes a header value using RFC 2047 if needed, then folds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in the charset.
    pub fn encode_value(name: &str, value: &str, charset: &str) -> Result<String> {
        if value.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader(format!(
                "{name}: value contains a line break"
            )));
        }
        let encoded = encode_rfc2047(value, charset)?;
        Ok(fold(name.len() + 2, &encoded))
    }

    /// Checks a field name: printable ASCII without a colon.
    #[must_use]
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_graphic() && c != ':')
    }

    /// Checks that every line break in a value is a fold (CRLF followed by a
    /// space or tab), so the value cannot start a new header line.
    #[must_use]
    pub fn is_valid_value(value: &str) -> bool {
        let mut rest = value;
        while let Some(index) = rest.find(['\r', '\n']) {
            let Some(after) = rest[index..].strip_prefix("\r\n") else {
                return false;
            };
            if !after.starts_with([' ', '\t']) {
                return false;
            }
            rest = after;
        }
        true
    }

    /// Writes every header line, folding long values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] for a malformed name or a value with a
    /// line break that is not a fold, and an I/O error if writing fails.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        for (name, value) in &self.entries {
            if !Self::is_valid_name(name) {
                return Err(Error::InvalidHeader(name.clone()));
            }
            if !Self::is_valid_value(value) {
                return Err(Error::InvalidHeader(format!(
                    "{name}: value contains a line break"
                )));
            }
            out.write_all(render_line(name, value).as_bytes())?;
        }
        Ok(())
    }

    /// Decodes a header value from RFC 2047 if encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_value(value: &str) -> Result<String> {
        decode_rfc2047(&unfold(value))
    }
}

fn render_line(name: &str, value: &str) -> String {
    if value.contains("\r\n") {
        format!("{name}: {value}\r\n")
    } else {
        format!("{name}: {}\r\n", fold(name.len() + 2, value))
    }
}

/// Diagnostic rendering. Stray line breaks in a value are shown as spaces;
/// use [`Headers::write_to`] for wire output.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            if Self::is_valid_value(value) {
                f.write_str(&render_line(name, value))?;
            } else {
                f.write_str(&render_line(name, &value.replace(['\r', '\n'], " ")))?;
            }
        }
        Ok(())
    }
}
