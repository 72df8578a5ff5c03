//! Transports and the in-place TLS upgrade.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::config::{SecureMode, SmtpConfiguration};
use crate::error::{Error, Result};

/// A transport that can switch to TLS in place.
///
/// The session calls this exactly once: right after connecting for
/// [`SecureMode::Tls`], or after the server accepts `STARTTLS`.
pub trait Upgrade: Sized {
    /// Performs the TLS handshake over this transport, verifying the
    /// certificate against `hostname`.
    fn upgrade(self, hostname: &str) -> impl Future<Output = Result<Self>> + Send;
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Upgrade for SmtpStream {
    async fn upgrade(self, hostname: &str) -> Result<Self> {
        let tcp = match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(_) => return Err(Error::InvalidState("Stream is already TLS".to_string())),
        };

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| Error::InvalidDnsName(hostname.to_string()))?;

        let tls = create_tls_connector()
            .connect(server_name, tcp)
            .await
            .map_err(Error::TlsNegotiationFailed)?;

        tracing::debug!(hostname, "TLS established");
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Opens the transport described by `config`.
///
/// For [`SecureMode::Tls`] the handshake happens here, before any SMTP
/// byte is exchanged.
///
/// # Errors
///
/// Returns [`Error::ConnectTimeout`] if the TCP connection is not up within
/// `config.connect_timeout`, [`Error::ConnectFailed`] if it is refused, and
/// the [`Upgrade`] errors for implicit TLS.
pub async fn connect(config: &SmtpConfiguration) -> Result<SmtpStream> {
    tracing::debug!(host = %config.host, port = config.port, secure = ?config.secure, "connecting");

    let tcp = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| Error::ConnectTimeout(config.connect_timeout))?
    .map_err(Error::ConnectFailed)?;

    let stream = SmtpStream::Plain(tcp);
    if config.secure == SecureMode::Tls {
        stream.upgrade(&config.host).await
    } else {
        Ok(stream)
    }
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
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
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (SmtpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (SmtpStream::Plain(client.unwrap()), server.unwrap().0)
    }

    #[tokio::test]
    async fn test_connect_plain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = SmtpConfiguration::builder("127.0.0.1").port(port).build();

        let stream = connect(&config).await.unwrap();
        assert!(!stream.is_tls());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let config = SmtpConfiguration::builder("127.0.0.1").port(port).build();

        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        // Non-routable address: the SYN is never answered.
        let config = SmtpConfiguration::builder("10.255.255.1")
            .port(25)
            .connect_timeout(Duration::from_millis(50))
            .build();

        match connect(&config).await {
            Err(Error::ConnectTimeout(timeout)) => assert_eq!(timeout, Duration::from_millis(50)),
            // Sandboxed hosts without a route fail fast instead.
            Err(Error::ConnectFailed(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upgrade_rejects_invalid_hostname() {
        let (stream, _server) = loopback_pair().await;
        let err = stream.upgrade("not a hostname").await.unwrap_err();
        assert!(matches!(err, Error::InvalidDnsName(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_upgrade_handshake_failure() {
        let (stream, server) = loopback_pair().await;
        // Peer hangs up instead of answering the ClientHello.
        drop(server);
        let err = stream.upgrade("localhost").await.unwrap_err();
        assert!(matches!(err, Error::TlsNegotiationFailed(_)), "{err:?}");
    }
}
