//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
///
/// Every error is terminal for the session that produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message could not be built or encoded.
    #[error("Email error: {0}")]
    Email(#[from] postwire_mime::Error),

    /// TCP connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectFailed(#[source] io::Error),

    /// TCP connection was not established within the configured timeout.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// TLS handshake failed.
    #[error("TLS negotiation failed: {0}")]
    TlsNegotiationFailed(#[source] io::Error),

    /// Configured host is not a valid TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(String),

    /// A reply line could not be parsed.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Server answered with an error reply.
    #[error("SMTP error {code}: {text}")]
    ServerRejected {
        /// Reply code (e.g., 550).
        code: u16,
        /// Text of the terminal reply line.
        text: String,
    },

    /// STARTTLS was required but the server does not offer it.
    #[error("Server does not support STARTTLS")]
    StartTlsUnavailable,

    /// Authentication step reached without credentials.
    #[error("Authentication protocol fault: {0}")]
    AuthProtocolFault(&'static str),

    /// Peer closed the connection before the dialogue finished.
    #[error("Connection closed by server")]
    TransportClosed,

    /// I/O error while reading or writing mid-dialogue.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bytes were buffered when a TLS upgrade was requested.
    #[error("{0} unexpected bytes buffered before TLS upgrade")]
    UnexpectedData(usize),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// The spawned session went away without reporting an outcome.
    #[error("Delivery cancelled")]
    Cancelled,
}

impl Error {
    /// Creates a rejection error from a reply code and text.
    #[must_use]
    pub fn server_rejected(code: u16, text: impl Into<String>) -> Self {
        Self::ServerRejected {
            code,
            text: text.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::ServerRejected { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServerRejected { code, .. } if *code >= 400 && *code < 500)
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
    fn test_classification() {
        assert!(Error::server_rejected(550, "No such user").is_permanent());
        assert!(!Error::server_rejected(550, "No such user").is_transient());
        assert!(Error::server_rejected(451, "Try later").is_transient());
        assert!(!Error::TransportClosed.is_permanent());
        assert!(!Error::TransportClosed.is_transient());
    }

    #[test]
    fn test_display() {
        let err = Error::server_rejected(535, "Authentication failed");
        assert_eq!(err.to_string(), "SMTP error 535: Authentication failed");
    }

    #[test]
    fn test_from_mime_error() {
        let err: Error = postwire_mime::Error::RecipientNotSpecified.into();
        assert!(matches!(err, Error::Email(_)));
    }
}
