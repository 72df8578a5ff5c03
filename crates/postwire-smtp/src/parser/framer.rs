//! Line framing for inbound bytes.

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Splits an inbound byte stream into lines.
///
/// Lines end at LF; a CR right before the LF is dropped, so both CRLF and
/// bare LF servers are understood. A trailing partial line stays buffered
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: BytesMut,
}

impl LineFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Takes the next complete line off the buffer, if there is one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] when more than
    /// [`MAX_LINE_LENGTH`] bytes are buffered without a line terminator.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(Error::MalformedResponse("line too long".to_string()));
            }
            return Ok(None);
        };

        let raw = self.buffer.split_to(pos);
        self.buffer.advance(1);

        let raw = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        Ok(Some(String::from_utf8_lossy(raw).into_owned()))
    }

    /// Number of bytes received but not yet returned as lines.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) const fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
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
    use proptest::prelude::*;

    fn drain(framer: &mut LineFramer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = framer.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_crlf_lines() {
        let mut framer = LineFramer::new();
        framer.extend(b"220 ready\r\n250 OK\r\n");
        assert_eq!(drain(&mut framer), vec!["220 ready", "250 OK"]);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_bare_lf() {
        let mut framer = LineFramer::new();
        framer.extend(b"250-first\n250 last\n");
        assert_eq!(drain(&mut framer), vec!["250-first", "250 last"]);
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut framer = LineFramer::new();
        framer.extend(b"250 O");
        assert_eq!(framer.next_line().unwrap(), None);
        assert_eq!(framer.buffered(), 5);

        framer.extend(b"K\r");
        assert_eq!(framer.next_line().unwrap(), None);

        framer.extend(b"\n354 go");
        assert_eq!(framer.next_line().unwrap(), Some("250 OK".to_string()));
        assert_eq!(framer.next_line().unwrap(), None);
        assert_eq!(framer.buffered(), 6);
    }

    #[test]
    fn test_empty_line() {
        let mut framer = LineFramer::new();
        framer.extend(b"\r\n");
        assert_eq!(framer.next_line().unwrap(), Some(String::new()));
    }

    #[test]
    fn test_line_length_limit() {
        let mut framer = LineFramer::new();
        framer.extend("A".repeat(MAX_LINE_LENGTH + 1).as_bytes());
        let err = framer.next_line().unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_lines(split in 0usize..64) {
            let input: &[u8] = b"250-smtp.example.com\r\n250-SIZE 1000\n250 STARTTLS\r\n";
            let split = split.min(input.len());

            let mut whole = LineFramer::new();
            whole.extend(input);

            let mut chunked = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in [&input[..split], &input[split..]] {
                chunked.extend(chunk);
                lines.extend(drain(&mut chunked));
            }

            prop_assert_eq!(lines, drain(&mut whole));
        }
    }
}
