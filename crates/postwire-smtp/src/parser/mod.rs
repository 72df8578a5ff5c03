//! SMTP response framing and parsing.
//!
//! Replies can be single-line or multi-line:
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`

mod framer;

pub use framer::{LineFramer, MAX_LINE_LENGTH};

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Folds reply lines into complete [`Reply`] values.
#[derive(Debug, Default)]
pub struct ReplyParser {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyParser {
    /// Creates a parser with no pending lines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (terminator already removed).
    ///
    /// Returns the reply once its terminal line (`CCC text` or a bare
    /// `CCC`) has been seen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] with the raw line if the code is
    /// missing or not numeric, the separator is neither `-` nor a space, or
    /// a continuation line carries a different code. The pending reply is
    /// discarded.
    pub fn push_line(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = parse_line(line);
        let (code, text, last) = match parsed {
            Some(parts) if self.code.is_none_or(|pending| pending == parts.0) => parts,
            _ => {
                self.reset();
                return Err(Error::MalformedResponse(line.to_string()));
            }
        };

        self.code = Some(code);
        self.lines.push(text.to_string());

        if !last {
            return Ok(None);
        }

        let lines = std::mem::take(&mut self.lines);
        self.code = None;
        Ok(Some(Reply::new(ReplyCode::new(code), lines)))
    }

    /// Returns true if a multi-line reply is partially read.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.code.is_some()
    }

    fn reset(&mut self) {
        self.code = None;
        self.lines.clear();
    }
}

/// Splits a line into code, text and whether it ends the reply.
fn parse_line(line: &str) -> Option<(u16, &str, bool)> {
    let bytes = line.as_bytes();
    let digits = bytes.get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = line[..3].parse().ok()?;

    match bytes.get(3) {
        None => Some((code, "", true)),
        Some(b' ') => Some((code, &line[4..], true)),
        Some(b'-') => Some((code, &line[4..], false)),
        Some(_) => None,
    }
}

/// Parses a complete reply from its lines.
///
/// # Errors
///
/// Returns an error if a line is malformed or the lines do not end with a
/// terminal line.
pub fn parse_reply<S: AsRef<str>>(lines: &[S]) -> Result<Reply> {
    let mut parser = ReplyParser::new();
    for line in lines {
        if let Some(reply) = parser.push_line(line.as_ref())? {
            return Ok(reply);
        }
    }
    Err(Error::MalformedResponse("incomplete reply".to_string()))
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
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&["250 OK"]).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
        assert_eq!(reply.text(), "OK");
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let mut parser = ReplyParser::new();
        assert!(parser.push_line("250-smtp.example.com").unwrap().is_none());
        assert!(parser.is_pending());
        assert!(parser.push_line("250-SIZE 1000").unwrap().is_none());
        let reply = parser.push_line("250 STARTTLS").unwrap().unwrap();

        assert_eq!(reply.lines, vec!["smtp.example.com", "SIZE 1000", "STARTTLS"]);
        assert_eq!(reply.text(), "STARTTLS");
        assert!(!parser.is_pending());
    }

    #[test]
    fn test_bare_code() {
        let reply = parse_reply(&["250"]).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.text(), "");
    }

    #[test]
    fn test_text_keeps_inner_spaces() {
        let reply = parse_reply(&["220 smtp.example.com  ESMTP ready "]).unwrap();
        assert_eq!(reply.text(), "smtp.example.com  ESMTP ready ");
    }

    #[test]
    fn test_parser_reusable_after_reply() {
        let mut parser = ReplyParser::new();
        assert!(parser.push_line("220 ready").unwrap().is_some());
        let reply = parser.push_line("221 bye").unwrap().unwrap();
        assert_eq!(reply.code, ReplyCode::CLOSING);
        assert_eq!(reply.lines, vec!["bye"]);
    }

    #[test]
    fn test_malformed_lines() {
        for line in ["", "25", "ABC OK", "2x0 OK", "250_OK", "250OK"] {
            let err = ReplyParser::new().push_line(line).unwrap_err();
            assert!(
                matches!(&err, Error::MalformedResponse(raw) if raw == line),
                "{line:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_inconsistent_continuation_code() {
        let mut parser = ReplyParser::new();
        parser.push_line("250-first").unwrap();
        let err = parser.push_line("251 second").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(!parser.is_pending());
    }

    #[test]
    fn test_incomplete_reply() {
        assert!(parse_reply(&["250-first"]).is_err());
        assert!(parse_reply::<&str>(&[]).is_err());
    }
}
