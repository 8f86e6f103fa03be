//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header encoding, header
//! folding and the small set of charsets the toolkit can transcode.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for encoded bodies and folded headers.
const MAX_LINE_LENGTH: usize = 76;

/// Longest encoded-word allowed by RFC 2047.
const MAX_ENCODED_WORD: usize = 75;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped into CRLF-terminated 76 character lines.
#[must_use]
pub fn encode_base64_lines(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        // base64 output is pure ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

/// Decodes Base64 data, ignoring embedded whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks (`\n` or `\r\n`) in the input are kept as hard CRLF breaks;
/// long lines receive soft breaks so no output line exceeds 76 characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() + data.len() / 8);
    let mut line_length = 0;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];

        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        if byte == b'\n' {
            result.push_str("\r\n");
            line_length = 0;
            i += 1;
            continue;
        }

        let at_line_end = matches!(data.get(i + 1), None | Some(b'\n' | b'\r'));
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        if line_length + width > MAX_LINE_LENGTH - 1 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(char::from(byte));
        } else {
            let _ = write!(result, "={byte:02X}");
        }
        line_length += width;
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            result.push(bytes[i]);
            i += 1;
            continue;
        }

        // Soft line break
        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => {
                i += 3;
                continue;
            }
            (Some(b'\n'), _) => {
                i += 2;
                continue;
            }
            (Some(&hi), Some(&lo)) => {
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex)
                    .map_err(|_| Error::InvalidEncoding("Invalid hex escape".to_string()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// Returns true when a header value must be RFC 2047 encoded.
#[must_use]
pub fn needs_encoding(text: &str) -> bool {
    text.chars()
        .any(|c| !c.is_ascii() || (c.is_ascii_control() && c != '\t'))
        || text.contains("=?")
}

/// Canonical spelling of the charsets the toolkit transcodes.
fn normalize_charset(charset: &str) -> Option<&'static str> {
    match charset.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Some("UTF-8"),
        "us-ascii" | "ascii" => Some("US-ASCII"),
        "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" => Some("ISO-8859-1"),
        _ => None,
    }
}

/// Encodes text into the bytes of the given charset.
///
/// # Errors
///
/// Returns an error if the charset is unknown or cannot represent the text.
pub fn encode_charset(text: &str, charset: &str) -> Result<Vec<u8>> {
    match normalize_charset(charset) {
        Some("UTF-8") => Ok(text.as_bytes().to_vec()),
        Some("US-ASCII") => {
            if text.is_ascii() {
                Ok(text.as_bytes().to_vec())
            } else {
                Err(Error::Unrepresentable {
                    charset: charset.to_string(),
                })
            }
        }
        Some(_) => text
            .chars()
            .map(|c| {
                u8::try_from(u32::from(c)).map_err(|_| Error::Unrepresentable {
                    charset: charset.to_string(),
                })
            })
            .collect(),
        None => Err(Error::UnsupportedCharset(charset.to_string())),
    }
}

/// Decodes bytes in the given charset into text.
///
/// Unknown charsets are decoded leniently as UTF-8.
///
/// # Errors
///
/// Returns an error if UTF-8 input is malformed.
pub fn decode_charset(bytes: &[u8], charset: &str) -> Result<String> {
    match normalize_charset(charset) {
        Some("ISO-8859-1") => Ok(bytes.iter().copied().map(char::from).collect()),
        Some(_) => String::from_utf8(bytes.to_vec()).map_err(Into::into),
        None => Ok(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Format: `=?charset?B?encoded-text?=`. Values that are plain ASCII are
/// returned unchanged; long values are split into several encoded words
/// separated by a space, never splitting a character.
///
/// # Errors
///
/// Returns an error if the text cannot be represented in the charset.
pub fn encode_rfc2047(text: &str, charset: &str) -> Result<String> {
    if !needs_encoding(text) {
        return Ok(text.to_string());
    }

    let overhead = charset.len() + "=??B??=".len();
    let max_raw = (MAX_ENCODED_WORD.saturating_sub(overhead) / 4 * 3).max(3);

    let mut words = Vec::new();
    let mut chunk: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let bytes = encode_charset(ch.encode_utf8(&mut buf), charset)?;
        if !chunk.is_empty() && chunk.len() + bytes.len() > max_raw {
            words.push(format!("=?{charset}?B?{}?=", encode_base64(&chunk)));
            chunk.clear();
        }
        chunk.extend_from_slice(&bytes);
    }
    if !chunk.is_empty() {
        words.push(format!("=?{charset}?B?{}?=", encode_base64(&chunk)));
    }

    Ok(words.join(" "))
}

/// Decodes a single `=?charset?enc?text?=` word.
fn decode_word(word: &str) -> Result<String> {
    let inner = &word[2..word.len() - 2];
    let parts: Vec<&str> = inner.splitn(3, '?').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    }

    let charset = parts[0].split('*').next().unwrap_or(parts[0]);
    let bytes = match parts[1].to_ascii_uppercase().as_str() {
        "B" => decode_base64(parts[2])?,
        "Q" => decode_quoted_printable(&parts[2].replace('_', " "))?,
        other => {
            return Err(Error::InvalidEncoding(format!("Unknown encoding: {other}")));
        }
    };
    decode_charset(&bytes, charset)
}

/// Decodes all RFC 2047 encoded words in a header value.
///
/// Whitespace between adjacent encoded words is dropped, as the RFC requires.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut pending_space = String::new();
    let mut last_was_word = false;

    while !rest.is_empty() {
        let Some(start) = rest.find("=?") else {
            out.push_str(&pending_space);
            out.push_str(rest);
            return Ok(out);
        };
        let end = rest[start + 2..]
            .match_indices("?=")
            .map(|(i, _)| start + 2 + i)
            .find(|&i| rest[start + 2..i].matches('?').count() >= 2);
        let Some(end) = end else {
            out.push_str(&pending_space);
            out.push_str(rest);
            return Ok(out);
        };

        let before = &rest[..start];
        if !(last_was_word && before.trim().is_empty()) {
            out.push_str(&pending_space);
            out.push_str(before);
        }
        pending_space.clear();

        out.push_str(&decode_word(&rest[start..end + 2])?);
        last_was_word = true;
        rest = &rest[end + 2..];

        let trimmed = rest.trim_start();
        pending_space.push_str(&rest[..rest.len() - trimmed.len()]);
        rest = trimmed;
    }

    Ok(out)
}

/// Folds a header value so that no line exceeds 76 characters.
///
/// `used` is the number of characters already on the first line (usually the
/// header name plus `": "`). Lines are only broken at whitespace; a word
/// longer than the limit stays on its own line.
#[must_use]
pub fn fold(used: usize, text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut line_length = used;

    for (index, word) in text.split(' ').enumerate() {
        if index == 0 {
            out.push_str(word);
            line_length += word.chars().count();
            continue;
        }
        let width = word.chars().count() + 1;
        if line_length + width > MAX_LINE_LENGTH && line_length > 1 {
            out.push_str("\r\n ");
            out.push_str(word);
            line_length = width;
        } else {
            out.push(' ');
            out.push_str(word);
            line_length += width;
        }
    }

    out
}

/// Removes folding whitespace introduced by [`fold`].
#[must_use]
pub fn unfold(text: &str) -> String {
    text.replace("\r\n ", " ")
        .replace("\r\n\t", " ")
        .replace("\n ", " ")
        .replace("\n\t", " ")
}
