//! Connection and session configuration.

use std::fmt;
use std::time::Duration;

/// Default time allowed for the TCP connection to be established.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecureMode {
    /// Plaintext for the whole session. **Not recommended for production.**
    #[default]
    None,
    /// TLS from the first byte (port 465).
    Tls,
    /// Plaintext, upgraded with STARTTLS. Fails if the server will not upgrade.
    StartTls,
    /// Plaintext, upgraded with STARTTLS when the server allows it.
    StartTlsWhenAvailable,
}

impl SecureMode {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::Tls => 465,
            Self::StartTls | Self::StartTlsWhenAvailable => 587,
        }
    }

    /// Returns true if the dialogue negotiates TLS with STARTTLS.
    #[must_use]
    pub const fn uses_starttls(self) -> bool {
        matches!(self, Self::StartTls | Self::StartTlsWhenAvailable)
    }
}

/// Greeting command sent after the server banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HelloMethod {
    /// `HELO`
    #[default]
    Helo,
    /// `EHLO`, which also makes the server list its extensions.
    Ehlo,
}

/// How the client signs in before the mail transaction.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum SignInMethod {
    /// No authentication.
    #[default]
    Anonymous,
    /// `AUTH LOGIN` with a username and password.
    Credentials {
        /// Login name.
        username: String,
        /// Password. Never printed by `Debug`.
        password: String,
    },
}

impl SignInMethod {
    /// Returns true if credentials are configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        matches!(self, Self::Credentials { .. })
    }
}

impl fmt::Debug for SignInMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Credentials { username, .. } => f
                .debug_struct("Credentials")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// SMTP server configuration, borrowed read-only for the length of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfiguration {
    /// Server hostname. Also used for the greeting and TLS server name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub secure: SecureMode,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Greeting command.
    pub hello_method: HelloMethod,
    /// Authentication.
    pub sign_in_method: SignInMethod,
}

impl SmtpConfiguration {
    /// Creates a plaintext, anonymous configuration on port 25.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        SmtpConfigurationBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SmtpConfigurationBuilder {
        SmtpConfigurationBuilder::new(host)
    }
}

/// Builder for [`SmtpConfiguration`].
#[derive(Debug, Clone)]
pub struct SmtpConfigurationBuilder {
    host: String,
    port: Option<u16>,
    secure: SecureMode,
    connect_timeout: Duration,
    hello_method: HelloMethod,
    sign_in_method: SignInMethod,
}

impl SmtpConfigurationBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: SecureMode::None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            hello_method: HelloMethod::Helo,
            sign_in_method: SignInMethod::Anonymous,
        }
    }

    /// Sets the port. Defaults to [`SecureMode::default_port`].
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn secure(mut self, secure: SecureMode) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the greeting command.
    #[must_use]
    pub const fn hello_method(mut self, method: HelloMethod) -> Self {
        self.hello_method = method;
        self
    }

    /// Sets the sign-in method.
    #[must_use]
    pub fn sign_in_method(mut self, method: SignInMethod) -> Self {
        self.sign_in_method = method;
        self
    }

    /// Signs in with `AUTH LOGIN`.
    #[must_use]
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.sign_in_method(SignInMethod::Credentials {
            username: username.into(),
            password: password.into(),
        })
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SmtpConfiguration {
        SmtpConfiguration {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.secure.default_port()),
            secure: self.secure,
            connect_timeout: self.connect_timeout,
            hello_method: self.hello_method,
            sign_in_method: self.sign_in_method,
        }
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
    fn test_defaults() {
        let config = SmtpConfiguration::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 25);
        assert_eq!(config.secure, SecureMode::None);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.hello_method, HelloMethod::Helo);
        assert_eq!(config.sign_in_method, SignInMethod::Anonymous);
    }

    #[test]
    fn test_default_port_follows_security() {
        assert_eq!(SecureMode::Tls.default_port(), 465);
        assert_eq!(SecureMode::StartTls.default_port(), 587);
        assert_eq!(SecureMode::StartTlsWhenAvailable.default_port(), 587);

        let config = SmtpConfiguration::builder("smtp.example.com")
            .secure(SecureMode::Tls)
            .build();
        assert_eq!(config.port, 465);
    }

    #[test]
    fn test_explicit_port_wins() {
        let config = SmtpConfiguration::builder("smtp.example.com")
            .secure(SecureMode::Tls)
            .port(2465)
            .build();
        assert_eq!(config.port, 2465);
    }

    #[test]
    fn test_builder() {
        let config = SmtpConfiguration::builder("smtp.example.com")
            .secure(SecureMode::StartTls)
            .hello_method(HelloMethod::Ehlo)
            .connect_timeout(Duration::from_secs(3))
            .credentials("user", "secret")
            .build();

        assert_eq!(config.hello_method, HelloMethod::Ehlo);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(config.secure.uses_starttls());
        assert!(config.sign_in_method.has_credentials());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SmtpConfiguration::builder("smtp.example.com")
            .credentials("user", "hunter2")
            .build();
        let debug = format!("{config:?}");
        assert!(debug.contains("user"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }
}
