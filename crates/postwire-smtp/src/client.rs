//! Session driver and the public send API.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use postwire_mime::Email;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::SmtpConfiguration;
use crate::connection::{FramedStream, LogHandler, Upgrade, connect};
use crate::dialogue::{Dialogue, Step};
use crate::error::{Error, Result};

/// Sends one message over a fresh connection.
///
/// # Errors
///
/// Returns the first failure: connecting, TLS, a server rejection, a
/// malformed reply or the connection dropping mid-dialogue.
pub async fn send(
    email: &Email,
    config: &SmtpConfiguration,
    log: Option<LogHandler>,
) -> Result<()> {
    let stream = connect(config).await?;
    let framed = FramedStream::with_log_handler(stream, log);
    Session::new(framed, config, email).run().await
}

/// One message delivered over one already-open transport.
///
/// Generic over the transport so any `AsyncRead + AsyncWrite + Upgrade`
/// stream can be driven, not just [`SmtpStream`](crate::SmtpStream).
#[derive(Debug)]
pub struct Session<'a, S> {
    framed: FramedStream<S>,
    config: &'a SmtpConfiguration,
    email: &'a Email,
}

impl<'a, S> Session<'a, S>
where
    S: AsyncRead + AsyncWrite + Upgrade + Unpin + Send,
{
    /// Creates a session; nothing is read until [`run`](Self::run).
    pub const fn new(
        framed: FramedStream<S>,
        config: &'a SmtpConfiguration,
        email: &'a Email,
    ) -> Self {
        Self {
            framed,
            config,
            email,
        }
    }

    /// Runs the dialogue to completion, then shuts the transport down
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the dialogue.
    pub async fn run(self) -> Result<()> {
        let Self {
            framed,
            config,
            email,
        } = self;

        tracing::info!(
            host = %config.host,
            port = config.port,
            message_id = email.message_id(),
            "sending message"
        );

        let mut dialogue = Dialogue::new(config, email);
        let (framed, outcome) = drive(framed, &mut dialogue, &config.host).await;

        if let Some(mut framed) = framed {
            if let Err(e) = framed.shutdown().await {
                tracing::debug!(?e, "transport shutdown failed");
            }
        }

        match &outcome {
            Ok(()) => tracing::info!(message_id = email.message_id(), "message delivered"),
            Err(e) => tracing::warn!(message_id = email.message_id(), error = %e, "delivery failed"),
        }
        outcome
    }
}

/// Reads replies and performs the dialogue's steps until it finishes.
///
/// Hands the transport back for shutdown unless a failed upgrade consumed it.
async fn drive<S>(
    mut framed: FramedStream<S>,
    dialogue: &mut Dialogue<'_>,
    hostname: &str,
) -> (Option<FramedStream<S>>, Result<()>)
where
    S: AsyncRead + AsyncWrite + Upgrade + Unpin + Send,
{
    loop {
        let reply = match framed.read_reply().await {
            Ok(reply) => reply,
            Err(e) => return (Some(framed), dialogue.abort(e).map_or(Ok(()), Err)),
        };

        let command = match dialogue.on_reply(&reply) {
            Step::Send(command) => command,
            Step::UpgradeThenSend(command) => {
                tracing::info!(hostname, "upgrading connection to TLS");
                framed = match framed.upgrade(hostname).await {
                    Ok(upgraded) => upgraded,
                    Err(e) => return (None, dialogue.abort(e).map_or(Ok(()), Err)),
                };
                command
            }
            Step::Complete => return (Some(framed), Ok(())),
            Step::Fail(e) => return (Some(framed), Err(e)),
            Step::Ignore => continue,
        };

        if let Err(e) = framed.write_command(&command).await {
            return (Some(framed), dialogue.abort(e).map_or(Ok(()), Err));
        }
    }
}

/// Reusable sender bound to one server configuration.
///
/// Cheap to clone; every send opens its own connection.
#[derive(Debug, Clone)]
pub struct SmtpClient {
    config: Arc<SmtpConfiguration>,
}

impl SmtpClient {
    /// Creates a client for the given server.
    #[must_use]
    pub fn new(config: SmtpConfiguration) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &SmtpConfiguration {
        &self.config
    }

    /// Sends one message and waits for the outcome.
    ///
    /// # Errors
    ///
    /// See [`send`].
    pub async fn send(&self, email: &Email, log: Option<LogHandler>) -> Result<()> {
        send(email, &self.config, log).await
    }

    /// Starts sending on the current tokio runtime and returns a handle to
    /// the outcome.
    ///
    /// Called outside a runtime, the returned [`Delivery`] resolves to
    /// [`Error::InvalidState`].
    pub fn dispatch(&self, email: Email, log: Option<LogHandler>) -> Delivery {
        let (tx, rx) = oneshot::channel();

        match Handle::try_current() {
            Ok(handle) => {
                let config = Arc::clone(&self.config);
                handle.spawn(async move {
                    let outcome = send(&email, &config, log).await;
                    if tx.send(outcome).is_err() {
                        tracing::debug!("delivery handle dropped before the outcome");
                    }
                });
            }
            Err(e) => {
                // The receiver is still held here, so this cannot fail.
                let _ = tx.send(Err(Error::InvalidState(e.to_string())));
            }
        }

        Delivery { rx }
    }
}

/// Pending outcome of [`SmtpClient::dispatch`].
///
/// Await it from async code or call [`wait`](Self::wait) from a plain thread.
/// It resolves exactly once.
#[derive(Debug)]
#[must_use = "a Delivery does nothing unless awaited or waited on"]
pub struct Delivery {
    rx: oneshot::Receiver<Result<()>>,
}

impl Delivery {
    /// Blocks the current thread until the outcome is known.
    ///
    /// # Errors
    ///
    /// Returns the send error, or [`Error::Cancelled`] if the session task
    /// was dropped first.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async execution context.
    pub fn wait(self) -> Result<()> {
        self.rx.blocking_recv().unwrap_or(Err(Error::Cancelled))
    }
}

impl Future for Delivery {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Cancelled)))
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
    use postwire_mime::EmailAddress;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn email() -> Email {
        Email::builder(EmailAddress::new("john@example.com").unwrap())
            .to(EmailAddress::new("ben@example.com").unwrap())
            .subject("Hi")
            .text_body("Hello")
            .build()
            .unwrap()
    }

    /// Plays a fixed reply script over loopback TCP, answering each
    /// client write with the next reply.
    async fn scripted_server(replies: &'static [&'static str]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64 * 1024];
            for (i, reply) in replies.iter().enumerate() {
                if i > 0 && socket.read(&mut buf).await.unwrap_or(0) == 0 {
                    return;
                }
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            let _ = socket.read(&mut buf).await;
        });

        port
    }

    #[tokio::test]
    async fn test_send_over_tcp() {
        let port = scripted_server(&[
            "220 ready\r\n",
            "250 hello\r\n",
            "250 sender ok\r\n",
            "250 recipient ok\r\n",
            "354 go ahead\r\n",
            "250 queued\r\n",
            "221 bye\r\n",
        ])
        .await;
        let config = SmtpConfiguration::builder("127.0.0.1").port(port).build();

        send(&email(), &config, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_resolves_once() {
        let port = scripted_server(&["554 no service\r\n"]).await;
        let client = SmtpClient::new(SmtpConfiguration::builder("127.0.0.1").port(port).build());

        let err = client.dispatch(email(), None).await.unwrap_err();
        assert!(matches!(err, Error::ServerRejected { code: 554, .. }), "{err:?}");
    }

    #[test]
    fn test_dispatch_outside_runtime() {
        let client = SmtpClient::new(SmtpConfiguration::new("127.0.0.1"));
        let err = client.dispatch(email(), None).wait().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)), "{err:?}");
    }

    #[test]
    fn test_wait_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let delivery = runtime.block_on(async {
            let port = scripted_server(&["421 busy\r\n"]).await;
            let client = SmtpClient::new(
                SmtpConfiguration::builder("127.0.0.1")
                    .port(port)
                    .connect_timeout(Duration::from_secs(5))
                    .build(),
            );
            client.dispatch(email(), None)
        });

        let err = delivery.wait().unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancelled_when_sender_dropped() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        drop(tx);
        let err = Delivery { rx }.await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
