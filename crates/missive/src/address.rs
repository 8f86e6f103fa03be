//! Email addresses and contacts.
//!
//! Parsing follows the RFC 822 mailbox grammar: a bare `local@domain`
//! addr-spec, or a display name followed by an addr-spec in angle brackets.

use crate::error::{Error, Result};
use missive_mime::encoding::{decode_rfc2047, encode_rfc2047, needs_encoding};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated mailbox: an addr-spec with an optional display name.
///
/// Deserialization runs the same checks as [`Address::from_contact`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAddress")]
pub struct Address {
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawAddress {
    email: String,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<RawAddress> for Address {
    type Error = Error;

    fn try_from(raw: RawAddress) -> Result<Self> {
        if !is_addr_spec(&raw.email) {
            return Err(Error::invalid_address(raw.email));
        }
        match raw.name.filter(|n| !n.trim().is_empty()) {
            Some(name) if name.chars().any(char::is_control) => Err(Error::invalid_address(name)),
            name => Ok(Self {
                email: raw.email,
                name,
            }),
        }
    }
}

/// Anything that carries an email address and an optional display name.
pub trait EmailContact {
    /// The address, in addr-spec or display form.
    fn address(&self) -> &str;

    /// The display name, if any.
    fn name(&self) -> Option<&str>;
}

/// A plain contact value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// Email address.
    pub address: String,
    /// Display name (may be absent).
    pub name: Option<String>,
}

impl Contact {
    /// Creates a contact with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl EmailContact for Contact {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl EmailContact for Address {
    fn address(&self) -> &str {
        &self.email
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<T: EmailContact + ?Sized> EmailContact for &T {
    fn address(&self) -> &str {
        (**self).address()
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }
}

const SPECIALS: &str = "()<>@,;:\\\".[]";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~".contains(c)
}

fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|atom| !atom.is_empty() && atom.chars().all(is_atext))
}

fn is_quoted_string(s: &str) -> bool {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return false;
    };
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' || c == '\r' || c == '\n' {
            return false;
        }
    }
    !escaped
}

fn is_domain_literal(s: &str) -> bool {
    s.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .is_some_and(|inner| {
            !inner.is_empty()
                && inner
                    .chars()
                    .all(|c| c.is_ascii_graphic() && !"[]\\".contains(c))
        })
}

/// Validates an RFC 822 addr-spec (`local-part@domain`).
fn is_addr_spec(s: &str) -> bool {
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    (is_dot_atom(local) || is_quoted_string(local))
        && (is_dot_atom(domain) || is_domain_literal(domain))
}

/// Unquotes and validates a display name; `None` for an empty phrase.
fn parse_display_name(raw: &str) -> Option<Option<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    if raw.starts_with('"') {
        if !is_quoted_string(raw) {
            return None;
        }
        let inner = &raw[1..raw.len() - 1];
        let mut name = String::with_capacity(inner.len());
        let mut escaped = false;
        for c in inner.chars() {
            if escaped || c != '\\' {
                name.push(c);
                escaped = false;
            } else {
                escaped = true;
            }
        }
        return Some(Some(name));
    }
    // Unquoted phrase: atoms, dots and spaces; encoded words are decoded.
    if raw
        .chars()
        .any(|c| c.is_control() || (c.is_ascii() && SPECIALS.contains(c) && c != '.'))
    {
        return None;
    }
    Some(Some(decode_rfc2047(raw).ok()?))
}

fn needs_quoting(name: &str) -> bool {
    name.chars()
        .any(|c| c.is_ascii() && !is_atext(c) && c != ' ')
        || name.contains("  ")
        || name.contains("=?")
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Address {
    /// Parses an address literal.
    ///
    /// Accepts `user@domain`, `<user@domain>`, `Name <user@domain>`,
    /// `Name<user@domain>` and `"Quoted, Name" <user@domain>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] carrying the literal when it does not
    /// match the grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid = || Error::invalid_address(raw);

        if let Some(without_close) = trimmed.strip_suffix('>') {
            let open = without_close.rfind('<').ok_or_else(invalid)?;
            let email = without_close[open + 1..].trim();
            if !is_addr_spec(email) {
                return Err(invalid());
            }
            let name = parse_display_name(&without_close[..open]).ok_or_else(invalid)?;
            return Ok(Self {
                email: email.to_string(),
                name,
            });
        }

        if is_addr_spec(trimmed) {
            Ok(Self {
                email: trimmed.to_string(),
                name: None,
            })
        } else {
            Err(invalid())
        }
    }

    /// Parses every literal, failing on the first invalid one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] naming the failing literal and its
    /// position.
    pub fn parse_many<I, S>(raws: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raws.into_iter()
            .enumerate()
            .map(|(i, raw)| Self::parse(raw.as_ref()).map_err(|e| e.at_index(i)))
            .collect()
    }

    /// Converts a contact.
    ///
    /// A blank name is the same as [`Address::parse`] on the address;
    /// otherwise the name is attached to the bare addr-spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] for a malformed address or a name
    /// containing control characters.
    pub fn from_contact(contact: &impl EmailContact) -> Result<Self> {
        let name = contact.name().map(str::trim).filter(|n| !n.is_empty());
        let Some(name) = name else {
            return Self::parse(contact.address());
        };

        if name.chars().any(char::is_control) {
            return Err(Error::invalid_address(name));
        }
        let email = contact.address().trim();
        if !is_addr_spec(email) {
            return Err(Error::invalid_address(contact.address()));
        }
        Ok(Self {
            email: email.to_string(),
            name: Some(name.to_string()),
        })
    }

    /// Converts contacts, dropping repeated addresses but keeping the order
    /// in which they were first seen.
    ///
    /// # Errors
    ///
    /// Returns the first conversion failure.
    pub fn from_contacts<I>(contacts: I) -> Result<Vec<Self>>
    where
        I: IntoIterator,
        I::Item: EmailContact,
    {
        let mut out: Vec<Self> = Vec::new();
        for contact in contacts {
            let address = Self::from_contact(&contact)?;
            if !out.contains(&address) {
                out.push(address);
            }
        }
        Ok(out)
    }

    /// The addr-spec.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Renders the address for a header, RFC 2047 encoding a non-ASCII name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name cannot be represented in the charset.
    pub fn to_header_value(&self, charset: &str) -> Result<String> {
        match &self.name {
            Some(name) if needs_encoding(name) => Ok(format!(
                "{} <{}>",
                encode_rfc2047(name, charset)?,
                self.email
            )),
            _ => Ok(self.to_string()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if needs_quoting(name) => write!(f, "{} <{}>", quote(name), self.email),
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => f.write_str(&self.email),
        }
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
