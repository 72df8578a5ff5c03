//! Framed I/O for the SMTP dialogue.
//!
//! Inbound bytes go through a [`LineFramer`] and a [`ReplyParser`];
//! outbound commands are encoded and flushed one at a time.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::stream::Upgrade;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{LineFramer, ReplyParser};
use crate::types::Reply;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Receives every raw line: inbound prefixed with `"==> "`, outbound with
/// `"<== "`. Purely observational.
pub type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Framed connection for the SMTP protocol.
pub struct FramedStream<S> {
    stream: S,
    framer: LineFramer,
    parser: ReplyParser,
    log: Option<LogHandler>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self::with_log_handler(stream, None)
    }

    /// Creates a framed stream that reports raw traffic to `log`.
    pub fn with_log_handler(stream: S, log: Option<LogHandler>) -> Self {
        Self {
            stream,
            framer: LineFramer::new(),
            parser: ReplyParser::new(),
            log,
        }
    }

    /// Reads a single line, terminator removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] if the peer closes the connection,
    /// [`Error::MalformedResponse`] for an over-long line and [`Error::Io`]
    /// for other read failures.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(line) = self.framer.next_line()? {
                self.log(&format!("==> {line}"));
                return Ok(line);
            }

            let buffer = self.framer.buffer_mut();
            buffer.reserve(DEFAULT_BUFFER_SIZE);
            match self.stream.read_buf(buffer).await {
                Ok(0) => return Err(Error::TransportClosed),
                Ok(_) => {}
                // rustls reports a peer that hangs up without close_notify this way
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(Error::TransportClosed);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads lines until a complete reply has been parsed.
    ///
    /// # Errors
    ///
    /// Returns the [`read_line`](Self::read_line) errors, or
    /// [`Error::MalformedResponse`] for a line that is not a reply line.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            let line = self.read_line().await?;
            if let Some(reply) = self.parser.push_line(&line)? {
                tracing::trace!(code = reply.code.as_u16(), lines = reply.lines.len(), "reply");
                return Ok(reply);
            }
        }
    }

    /// Encodes and writes one command, then flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write_command(&mut self, command: &Command<'_>) -> Result<()> {
        let bytes = command.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        tracing::debug!(command = command.name(), bytes = bytes.len(), "sent");
        if self.log.is_some() {
            let line = if command.is_sensitive() {
                "<redacted>".into()
            } else {
                let text = bytes.strip_suffix(b"\r\n").unwrap_or(&bytes[..]);
                String::from_utf8_lossy(text)
            };
            self.log(&format!("<== {line}"));
        }

        Ok(())
    }

    /// Shuts down the write side of the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Number of bytes received but not yet consumed as lines.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.framer.buffered()
    }

    fn log(&self, line: &str) {
        if let Some(log) = &self.log {
            log(line);
        }
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Upgrade + Unpin,
{
    /// Upgrades the transport to TLS, keeping the log handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedData`] if the server sent bytes that have
    /// not been consumed yet (they were sent in plaintext and must not be
    /// read as part of the encrypted session), or the [`Upgrade`] error.
    pub async fn upgrade(self, hostname: &str) -> Result<Self> {
        let buffered = self.buffered();
        if buffered > 0 {
            return Err(Error::UnexpectedData(buffered));
        }

        let stream = self.stream.upgrade(hostname).await?;
        Ok(Self::with_log_handler(stream, self.log))
    }
}

impl<S: fmt::Debug> fmt::Debug for FramedStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedStream")
            .field("stream", &self.stream)
            .field("buffered", &self.framer.buffered())
            .field("log", &self.log.is_some())
            .finish_non_exhaustive()
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
    use crate::parser::MAX_LINE_LENGTH;
    use crate::types::ReplyCode;
    use std::sync::Mutex;
    use tokio_test::io::Builder;

    fn capture() -> (LogHandler, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let handler: LogHandler = Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        });
        (handler, lines)
    }

    #[tokio::test]
    async fn test_read_single_reply() {
        let mock = Builder::new().read(b"220 smtp.example.com ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let reply = framed.read_reply().await.unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.text(), "smtp.example.com ready");
    }

    #[tokio::test]
    async fn test_read_multi_line_reply_across_chunks() {
        let mock = Builder::new()
            .read(b"250-smtp.example.com\r\n250-SI")
            .read(b"ZE 1000\n250 STA")
            .read(b"RTTLS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let reply = framed.read_reply().await.unwrap();
        assert_eq!(reply.lines, vec!["smtp.example.com", "SIZE 1000", "STARTTLS"]);
        assert!(reply.advertises_starttls());
    }

    #[tokio::test]
    async fn test_eof_is_transport_closed() {
        let mock = Builder::new().read(b"250-partial\r\n").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_reply().await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed), "{err:?}");
    }

    #[tokio::test]
    async fn test_malformed_reply() {
        let mock = Builder::new().read(b"hello there\r\n").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_reply().await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(line) if line == "hello there"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "2".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_reply().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"EHLO smtp.example.com\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed
            .write_command(&Command::Ehlo {
                hostname: "smtp.example.com",
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_log_handler_sees_both_directions() {
        let (handler, lines) = capture();
        let mock = Builder::new()
            .read(b"220-first\r\n220 second\r\n")
            .write(b"QUIT\r\n")
            .build();
        let mut framed = FramedStream::with_log_handler(mock, Some(handler));

        framed.read_reply().await.unwrap();
        framed.write_command(&Command::Quit).await.unwrap();

        assert_eq!(
            *lines.lock().unwrap(),
            vec!["==> 220-first", "==> 220 second", "<== QUIT"]
        );
    }

    #[tokio::test]
    async fn test_log_handler_redacts_password() {
        let (handler, lines) = capture();
        let mock = Builder::new().write(b"aHVudGVyMg==\r\n").build();
        let mut framed = FramedStream::with_log_handler(mock, Some(handler));

        framed
            .write_command(&Command::AuthPassword("hunter2"))
            .await
            .unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["<== <redacted>"]);
    }
}
