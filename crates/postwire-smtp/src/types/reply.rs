//! SMTP reply types.

use super::extension::Extension;

/// A complete (possibly multi-line) reply from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Text of every line, code and separator removed.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Text of the terminal line; empty for a bare code.
    #[must_use]
    pub fn text(&self) -> &str {
        self.lines.last().map_or("", String::as_str)
    }

    /// Returns true for 2xx and 3xx replies.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.code.is_positive()
    }

    /// Classifies the reply.
    #[must_use]
    pub fn response(&self) -> Response {
        let code = self.code.as_u16();
        let text = self.text().to_string();
        if self.is_positive() {
            Response::Ok { code, text }
        } else {
            Response::Error { code, text }
        }
    }

    /// Extensions listed in an EHLO reply. The first line is the server's
    /// greeting and is skipped.
    pub fn extensions(&self) -> impl Iterator<Item = Extension> + '_ {
        self.lines.iter().skip(1).map(|line| Extension::parse(line))
    }

    /// Returns true if this EHLO reply advertises STARTTLS.
    #[must_use]
    pub fn advertises_starttls(&self) -> bool {
        self.extensions().any(|ext| ext == Extension::StartTls)
    }
}

/// Positive or negative reading of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// 2xx or 3xx.
    Ok {
        /// Reply code.
        code: u16,
        /// Terminal line text.
        text: String,
    },
    /// Anything else.
    Error {
        /// Reply code.
        code: u16,
        /// Terminal line text.
        text: String,
    },
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns true if this is a success code (2xx).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true if this is an intermediate reply (3xx).
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }

    /// Returns true if the dialogue may proceed (2xx or 3xx).
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.is_success() || self.is_intermediate()
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Codes the dialogue and its tests refer to
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 454 TLS not available due to temporary reason
    pub const TLS_UNAVAILABLE: Self = Self(454);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
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

    fn reply(code: u16, lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::new(code),
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn positive_codes() {
        assert!(ReplyCode::SERVICE_READY.is_positive());
        assert!(ReplyCode::OK.is_positive());
        assert!(ReplyCode::AUTH_CONTINUE.is_positive());
        assert!(ReplyCode::START_DATA.is_positive());
        assert!(!ReplyCode::TLS_UNAVAILABLE.is_positive());
        assert!(!ReplyCode::MAILBOX_UNAVAILABLE.is_positive());
        assert!(!ReplyCode::new(199).is_positive());
        assert!(!ReplyCode::new(600).is_positive());
    }

    #[test]
    fn display() {
        assert_eq!(ReplyCode::OK.to_string(), "250");
    }

    #[test]
    fn text_is_terminal_line() {
        let r = reply(250, &["smtp.example.com", "PIPELINING", "STARTTLS"]);
        assert_eq!(r.text(), "STARTTLS");
        assert_eq!(reply(250, &[""]).text(), "");
        assert_eq!(reply(250, &[]).text(), "");
    }

    #[test]
    fn response_classification() {
        assert_eq!(
            reply(354, &["Start mail input"]).response(),
            Response::Ok {
                code: 354,
                text: "Start mail input".to_string()
            }
        );
        assert_eq!(
            reply(550, &["No such user"]).response(),
            Response::Error {
                code: 550,
                text: "No such user".to_string()
            }
        );
    }

    #[test]
    fn starttls_advertisement() {
        let ehlo = reply(250, &["smtp.example.com Hello", "SIZE 1000", "STARTTLS"]);
        assert!(ehlo.advertises_starttls());

        let ehlo = reply(250, &["smtp.example.com Hello", "AUTH LOGIN PLAIN"]);
        assert!(!ehlo.advertises_starttls());

        // The greeting line is never read as an extension.
        let helo = reply(250, &["STARTTLS"]);
        assert!(!helo.advertises_starttls());
    }
}
