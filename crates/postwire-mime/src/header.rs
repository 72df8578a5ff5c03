//! Ordered header block.

use crate::encoding::{decode_rfc2047, encode_rfc2047};
use crate::error::Result;
use std::fmt;

/// Header lines longer than this are folded at spaces (RFC 5322 section 2.1.1).
const FOLD_WIDTH: usize = 78;

/// Ordered collection of message headers.
///
/// Insertion order is kept because RFC 5322 readers (and the tests that pin
/// the rendered layout) care about it. Lookups are case-insensitive.
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

    /// Appends a header. CR and LF are stripped from the value so a field
    /// can never be split into two.
    pub fn add(&mut self, name: impl Into<String>, value: impl AsRef<str>) {
        let value: String = value
            .as_ref()
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        self.entries.push((name.into(), value));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns an iterator over all headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no header fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a header block, stopping at the first empty line.
    ///
    /// Folded continuation lines (leading space or tab) are unfolded into
    /// the previous field.
    ///
    /// # Errors
    ///
    /// Returns an error if header format is invalid.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
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
                headers.add(name, value.trim());
            }

            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim());
        }

        Ok(headers)
    }

    /// Encodes a header value using RFC 2047 if needed.
    #[must_use]
    pub fn encode_value(value: &str) -> String {
        encode_rfc2047(value, "utf-8")
    }

    /// Decodes a header value from RFC 2047 if encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_value(value: &str) -> Result<String> {
        decode_rfc2047(value)
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write_folded(f, name, value)?;
        }
        Ok(())
    }
}

/// Writes one field, breaking before a space whenever the line would pass
/// [`FOLD_WIDTH`]. A single word longer than that stays whole.
fn write_folded(f: &mut fmt::Formatter<'_>, name: &str, value: &str) -> fmt::Result {
    write!(f, "{name}:")?;
    let mut column = name.len() + 1;
    let mut first = true;

    for word in value.split(' ') {
        if !first && !word.is_empty() && column + 1 + word.len() > FOLD_WIDTH {
            f.write_str("\r\n")?;
            column = 0;
        }
        write!(f, " {word}")?;
        column += 1 + word.len();
        first = false;
    }

    f.write_str("\r\n")
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
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_get_all() {
        let mut headers = Headers::new();
        headers.add("Received", "from a");
        headers.add("Received", "from b");
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
    }

    #[test]
    fn test_headers_strip_line_breaks() {
        let mut headers = Headers::new();
        headers.add("Subject", "Hello\r\nBcc: victim@example.com");
        assert_eq!(headers.get("Subject"), Some("HelloBcc: victim@example.com"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Ignored: body line\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
        assert!(headers.get("Ignored").is_none());
    }

    #[test]
    fn test_headers_display_keeps_order() {
        let mut headers = Headers::new();
        headers.add("To", "recipient@example.com");
        headers.add("From", "sender@example.com");

        assert_eq!(
            headers.to_string(),
            "To: recipient@example.com\r\nFrom: sender@example.com\r\n"
        );
    }

    #[test]
    fn test_headers_iter() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["From", "To"]);
    }

    #[test]
    fn test_encode_decode_value() {
        let encoded = Headers::encode_value("Café");
        assert_ne!(encoded, "Café");
        assert_eq!(Headers::decode_value(&encoded).unwrap(), "Café");
    }

    #[test]
    fn test_long_values_are_folded() {
        let recipients: Vec<String> = (0..20).map(|i| format!("user{i}@example.com")).collect();
        let value = recipients.join(", ");
        let mut headers = Headers::new();
        headers.add("To", &value);

        let text = headers.to_string();
        let lines: Vec<&str> = text.trim_end_matches("\r\n").split("\r\n").collect();
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= FOLD_WIDTH));
        assert!(lines[1..].iter().all(|line| line.starts_with(' ')));

        let parsed = Headers::parse(&text).unwrap();
        assert_eq!(parsed.get("To"), Some(value.as_str()));
    }

    #[test]
    fn test_folded_encoded_subject_round_trip() {
        let subject = "Ünïcödé ".repeat(40);
        let mut headers = Headers::new();
        headers.add("Subject", Headers::encode_value(&subject));

        let text = headers.to_string();
        assert!(text.split("\r\n").all(|line| line.len() <= FOLD_WIDTH));

        let parsed = Headers::parse(&text).unwrap();
        assert_eq!(Headers::decode_value(parsed.get("Subject").unwrap()).unwrap(), subject);
    }
}
