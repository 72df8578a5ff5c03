//! Transfer and header encodings used by the renderer.
//!
//! Supports Base64 and Quoted-Printable body encodings (RFC 2045) and
//! RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum encoded line length for Base64 bodies (RFC 2045 section 6.8).
pub const BASE64_LINE_LENGTH: usize = 76;

/// Maximum encoded line length for Quoted-Printable bodies, soft line
/// break included (RFC 2045 section 6.7).
pub const QUOTED_PRINTABLE_LINE_LENGTH: usize = 76;

/// Target length of one RFC 2047 encoded word. RFC 2047 allows 75; staying
/// shorter lets a header name and one word share a folded line.
const ENCODED_WORD_LENGTH: usize = 66;

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-separated lines of at most
/// [`BASE64_LINE_LENGTH`] characters. No trailing CRLF is added.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2);

    // Base64 output is pure ASCII, so byte chunks are valid str boundaries.
    for (i, chunk) in encoded.as_bytes().chunks(BASE64_LINE_LENGTH).enumerate() {
        if i > 0 {
            wrapped.push_str("\r\n");
        }
        wrapped.push_str(&String::from_utf8_lossy(chunk));
    }

    wrapped
}

/// Decodes Base64 data, ignoring any whitespace (line breaks included).
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes text as Quoted-Printable.
///
/// LF and CRLF line breaks become CRLF hard breaks. Longer lines get soft
/// breaks so no encoded line exceeds [`QUOTED_PRINTABLE_LINE_LENGTH`], and
/// whitespace at the end of a line is escaped. The output is 7-bit.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_quoted_printable_line(line.as_bytes(), &mut out);
    }

    out
}

fn encode_quoted_printable_line(line: &[u8], out: &mut String) {
    let mut column = 0;

    for (i, &byte) in line.iter().enumerate() {
        let last = i + 1 == line.len();
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Anything but the final token must leave room for the `=` of a soft break.
        let limit = if last {
            QUOTED_PRINTABLE_LINE_LENGTH
        } else {
            QUOTED_PRINTABLE_LINE_LENGTH - 1
        };
        if column + width > limit {
            out.push_str("=\r\n");
            column = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        column += width;
    }
}

/// Decodes Quoted-Printable text, removing soft line breaks.
///
/// # Errors
///
/// Returns an error for a malformed escape or if the decoded bytes are not
/// UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match &bytes[i + 1..] {
            [b'\r', b'\n', ..] => i += 3,
            [b'\n', ..] => i += 2,
            [hi, lo, ..] => {
                let byte = std::str::from_utf8(&[*hi, *lo])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| {
                        Error::InvalidEncoding(format!("Invalid escape at offset {i}"))
                    })?;
                out.push(byte);
                i += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    String::from_utf8(out).map_err(Into::into)
}

/// Encodes a header value as RFC 2047 encoded words when it is not plain
/// ASCII, or when it holds a word too long to fold.
///
/// Long text is split on character boundaries into several words,
/// separated by spaces so the header can be folded
/// between them.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    let plain = text.chars().all(|c| c.is_ascii() && c != '=' && c != '?')
        && text.split(' ').all(|word| word.len() <= ENCODED_WORD_LENGTH);
    if plain {
        return text.to_string();
    }

    // `=?` charset `?B?` payload `?=`
    let payload_length = ENCODED_WORD_LENGTH.saturating_sub(charset.len() + 7);
    let chunk_limit = (payload_length / 4 * 3).max(4);

    let mut words = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if i > start && i - start + c.len_utf8() > chunk_limit {
            words.push(encoded_word(&text[start..i], charset));
            start = i;
        }
    }
    words.push(encoded_word(&text[start..], charset));

    words.join(" ")
}

fn encoded_word(chunk: &str, charset: &str) -> String {
    format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes()))
}

/// Decodes an RFC 2047 encoded header value. Plain text passes through,
/// and whitespace between adjacent encoded words is dropped.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut decoded = String::with_capacity(text.len());
    let mut after_encoded = false;

    for (i, token) in text.split(' ').enumerate() {
        match decode_encoded_word(token)? {
            Some(word) => {
                if i > 0 && !after_encoded {
                    decoded.push(' ');
                }
                decoded.push_str(&word);
                after_encoded = true;
            }
            None => {
                if i > 0 {
                    decoded.push(' ');
                }
                decoded.push_str(token);
                after_encoded = false;
            }
        }
    }

    Ok(decoded)
}

fn decode_encoded_word(token: &str) -> Result<Option<String>> {
    let Some(inner) = token
        .strip_prefix("=?")
        .and_then(|rest| rest.strip_suffix("?="))
    else {
        return Ok(None);
    };

    let parts: Vec<&str> = inner.split('?').collect();
    let [_charset, encoding, payload] = parts.as_slice() else {
        return Err(Error::InvalidEncoding(format!(
            "Malformed encoded word: {token}"
        )));
    };

    match encoding.to_ascii_uppercase().as_str() {
        "B" => {
            let bytes = decode_base64(payload)?;
            String::from_utf8(bytes).map(Some).map_err(Into::into)
        }
        other => Err(Error::InvalidEncoding(format!(
            "Unsupported encoded-word encoding: {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_wrapped_line_lengths() {
        let data = vec![0xA5u8; 300];
        let wrapped = encode_base64_wrapped(&data);

        let lines: Vec<&str> = wrapped.split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= BASE64_LINE_LENGTH));
        assert!(!wrapped.ends_with("\r\n"));
        assert_eq!(decode_base64(&wrapped).unwrap(), data);
    }

    #[test]
    fn test_base64_wrapped_empty() {
        assert_eq!(encode_base64_wrapped(b""), "");
    }

    #[test]
    fn test_decode_base64_invalid() {
        assert!(decode_base64("not base64!").is_err());
    }

    #[test]
    fn test_rfc2047_encode() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");

        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_rfc2047_round_trip() {
        let subject = "Grüße aus Köln";
        let encoded = encode_rfc2047(subject, "utf-8");
        assert_eq!(decode_rfc2047(&encoded).unwrap(), subject);
    }

    #[test]
    fn test_rfc2047_malformed() {
        assert!(decode_rfc2047("=?utf-8?B?=").is_err());
        assert!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?=").is_err());
    }

    #[test]
    fn test_rfc2047_long_text_split_into_words() {
        let subject = "é".repeat(600);
        let encoded = encode_rfc2047(&subject, "utf-8");

        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75 && w.starts_with("=?utf-8?B?")));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), subject);
    }

    #[test]
    fn test_rfc2047_long_ascii_word_is_encoded() {
        let word = "x".repeat(200);
        let encoded = encode_rfc2047(&word, "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert_eq!(decode_rfc2047(&encoded).unwrap(), word);
    }

    #[test]
    fn test_rfc2047_mixed_plain_and_encoded() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= =?utf-8?B?IHdvcmxk?= again").unwrap(),
            "Re: Héllo world again"
        );
    }

    #[test]
    fn test_quoted_printable_plain_ascii_unchanged() {
        assert_eq!(encode_quoted_printable("Hello Ben"), "Hello Ben");
        assert_eq!(encode_quoted_printable("a\nb\r\nc"), "a\r\nb\r\nc");
    }

    #[test]
    fn test_quoted_printable_escapes() {
        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
        assert_eq!(encode_quoted_printable("Grüße"), "Gr=C3=BC=C3=9Fe");
        assert_eq!(encode_quoted_printable("trailing \nnext"), "trailing=20\r\nnext");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let text = format!("{}ü", "x".repeat(2000));
        let encoded = encode_quoted_printable(&text);

        assert!(encoded.is_ascii());
        assert!(
            encoded
                .split("\r\n")
                .all(|line| line.len() <= QUOTED_PRINTABLE_LINE_LENGTH)
        );
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        assert!(decode_quoted_printable("bad=ZZ").is_err());
        assert!(decode_quoted_printable("cut=4").is_err());
    }
}
