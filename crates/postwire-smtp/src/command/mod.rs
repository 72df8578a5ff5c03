//! SMTP command encoder.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use postwire_mime::{Email, EmailAddress};

use crate::config::HelloMethod;

/// An outbound SMTP command, borrowing its arguments from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// HELO - Simple greeting
    Helo {
        /// Hostname sent with the greeting
        hostname: &'a str,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Hostname sent with the greeting
        hostname: &'a str,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH LOGIN - Begin authentication
    AuthLogin,
    /// Username line of the LOGIN exchange
    AuthUsername(&'a str),
    /// Password line of the LOGIN exchange
    AuthPassword(&'a str),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: &'a EmailAddress,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: &'a EmailAddress,
    },
    /// DATA - Begin message data
    Data,
    /// The rendered message, sent after the server accepts DATA
    Message(&'a Email),
    /// QUIT - Close connection
    Quit,
}

impl<'a> Command<'a> {
    /// Builds the greeting for the configured hello method.
    #[must_use]
    pub const fn greeting(method: HelloMethod, hostname: &'a str) -> Self {
        match method {
            HelloMethod::Helo => Self::Helo { hostname },
            HelloMethod::Ehlo => Self::Ehlo { hostname },
        }
    }

    /// Short name for logs. Never includes arguments.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::AuthLogin => "AUTH LOGIN",
            Self::AuthUsername(_) => "AUTH username",
            Self::AuthPassword(_) => "AUTH password",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Message(_) => "message",
            Self::Quit => "QUIT",
        }
    }

    /// Returns true if the encoded command must not be logged.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::AuthPassword(_))
    }

    /// Serializes the command to bytes, CRLF-terminated.
    ///
    /// Credential lines are base64-encoded (RFC 4954). A message is sent as
    /// rendered, which already ends with `CRLF "."`, so the trailing CRLF
    /// completes the end-of-data marker.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => {
                buf.extend_from_slice(b"STARTTLS");
            }
            Self::AuthLogin => {
                buf.extend_from_slice(b"AUTH LOGIN");
            }
            Self::AuthUsername(value) | Self::AuthPassword(value) => {
                buf.extend_from_slice(STANDARD.encode(value).as_bytes());
            }
            Self::MailFrom { from } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.address().as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.address().as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Message(email) => {
                buf = email.render();
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
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

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    #[test]
    fn test_greeting_commands() {
        let helo = Command::greeting(HelloMethod::Helo, "smtp.example.com");
        assert_eq!(helo.serialize(), b"HELO smtp.example.com\r\n");

        let ehlo = Command::greeting(HelloMethod::Ehlo, "smtp.example.com");
        assert_eq!(ehlo.serialize(), b"EHLO smtp.example.com\r\n");
    }

    #[test]
    fn test_fixed_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::AuthLogin.serialize(), b"AUTH LOGIN\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_credentials_are_base64() {
        assert_eq!(Command::AuthUsername("user").serialize(), b"dXNlcg==\r\n");
        assert_eq!(Command::AuthPassword("pass").serialize(), b"cGFzcw==\r\n");
        assert!(Command::AuthPassword("pass").is_sensitive());
        assert!(!Command::AuthUsername("user").is_sensitive());
    }

    #[test]
    fn test_envelope_commands_use_bare_address() {
        let from = EmailAddress::with_name("john@example.com", "John Doe").unwrap();
        let to = addr("ben@example.com");

        assert_eq!(
            Command::MailFrom { from: &from }.serialize(),
            b"MAIL FROM:<john@example.com>\r\n"
        );
        assert_eq!(
            Command::RcptTo { to: &to }.serialize(),
            b"RCPT TO:<ben@example.com>\r\n"
        );
    }

    #[test]
    fn test_message_ends_with_data_terminator() {
        let email = Email::builder(addr("john@example.com"))
            .to(addr("ben@example.com"))
            .text_body("Hi")
            .build()
            .unwrap();

        let bytes = Command::Message(&email).serialize();
        assert!(bytes.ends_with(b"\r\nHi\r\n.\r\n"));
        assert_eq!(bytes.windows(5).filter(|w| w == b"\r\n.\r\n").count(), 1);
    }

    #[test]
    fn test_names_hide_arguments() {
        assert_eq!(Command::AuthPassword("secret").name(), "AUTH password");
        assert_eq!(
            Command::greeting(HelloMethod::Ehlo, "smtp.example.com").name(),
            "EHLO"
        );
    }
}
