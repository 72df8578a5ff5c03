//! Integration tests for the SMTP session.
//!
//! These tests drive full sessions against an in-memory server that answers
//! every client write with the next scripted reply.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use postwire_mime::{Email, EmailAddress};
use postwire_smtp::{
    Error, FramedStream, HelloMethod, LogHandler, SecureMode, Session, SmtpConfiguration, Upgrade,
};

/// What the client did to the server.
#[derive(Debug, Default)]
struct Transcript {
    /// Every write, one entry per command.
    commands: Vec<String>,
    /// Hostnames passed to `upgrade`.
    upgrades: Vec<String>,
    /// Number of commands written before the upgrade.
    upgraded_after: Option<usize>,
    shut_down: bool,
}

/// In-memory SMTP server.
struct MockServer {
    /// Bytes the client has yet to read.
    outbound: Cursor<Vec<u8>>,
    /// Replies released one per client write.
    script: VecDeque<&'static str>,
    fail_upgrade: bool,
    transcript: Arc<Mutex<Transcript>>,
}

impl MockServer {
    /// The first entry is the greeting; each later entry answers one write.
    fn new(script: &[&'static str]) -> (Self, Arc<Mutex<Transcript>>) {
        let mut script: VecDeque<&'static str> = script.iter().copied().collect();
        let greeting = script.pop_front().unwrap_or_default();
        let transcript = Arc::new(Mutex::new(Transcript::default()));
        let server = Self {
            outbound: Cursor::new(greeting.as_bytes().to_vec()),
            script,
            fail_upgrade: false,
            transcript: Arc::clone(&transcript),
        };
        (server, transcript)
    }

    fn failing_upgrade(mut self) -> Self {
        self.fail_upgrade = true;
        self
    }
}

impl AsyncRead for MockServer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.outbound.get_ref();
        let pos = usize::try_from(self.outbound.position()).unwrap();

        if pos >= data.len() {
            // Nothing more to say: reads as EOF.
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.outbound.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockServer {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.transcript
            .lock()
            .unwrap()
            .commands
            .push(String::from_utf8_lossy(buf).into_owned());

        if let Some(reply) = self.script.pop_front() {
            let pos = usize::try_from(self.outbound.position()).unwrap();
            let mut pending = self.outbound.get_ref()[pos..].to_vec();
            pending.extend_from_slice(reply.as_bytes());
            self.outbound = Cursor::new(pending);
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.transcript.lock().unwrap().shut_down = true;
        Poll::Ready(Ok(()))
    }
}

impl Upgrade for MockServer {
    async fn upgrade(self, hostname: &str) -> postwire_smtp::Result<Self> {
        if self.fail_upgrade {
            return Err(Error::TlsNegotiationFailed(io::Error::other(
                "handshake failure",
            )));
        }

        {
            let mut transcript = self.transcript.lock().unwrap();
            transcript.upgrades.push(hostname.to_string());
            transcript.upgraded_after = Some(transcript.commands.len());
        }
        Ok(self)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("postwire_smtp=debug")
        .with_test_writer()
        .try_init();
}

fn addr(s: &str) -> EmailAddress {
    EmailAddress::new(s).unwrap()
}

fn email() -> Email {
    Email::builder(addr("john@example.com"))
        .to(addr("ben@example.com"))
        .subject("Greetings")
        .text_body("Hello Ben")
        .build()
        .unwrap()
}

fn config(secure: SecureMode, hello: HelloMethod) -> SmtpConfiguration {
    SmtpConfiguration::builder("smtp.example.com")
        .secure(secure)
        .hello_method(hello)
        .build()
}

async fn run(
    server: MockServer,
    config: &SmtpConfiguration,
    email: &Email,
    log: Option<LogHandler>,
) -> postwire_smtp::Result<()> {
    init_tracing();
    let framed = FramedStream::with_log_handler(server, log);
    Session::new(framed, config, email).run().await
}

/// Replies for an anonymous plaintext session with one recipient.
const PLAIN_SCRIPT: &[&str] = &[
    "220 smtp.example.com ESMTP ready\r\n",
    "250 smtp.example.com\r\n",
    "250 2.1.0 Sender OK\r\n",
    "250 2.1.5 Recipient OK\r\n",
    "354 Start mail input\r\n",
    "250 2.0.0 Queued\r\n",
    "221 2.0.0 Bye\r\n",
];

#[tokio::test]
async fn test_plain_session_end_to_end() {
    let (server, transcript) = MockServer::new(PLAIN_SCRIPT);
    let config = config(SecureMode::None, HelloMethod::Helo);
    let email = email();

    run(server, &config, &email, None).await.unwrap();

    let transcript = transcript.lock().unwrap();
    assert_eq!(transcript.commands.len(), 6);
    assert_eq!(transcript.commands[0], "HELO smtp.example.com\r\n");
    assert_eq!(transcript.commands[1], "MAIL FROM:<john@example.com>\r\n");
    assert_eq!(transcript.commands[2], "RCPT TO:<ben@example.com>\r\n");
    assert_eq!(transcript.commands[3], "DATA\r\n");
    assert!(transcript.commands[4].contains("Subject: Greetings\r\n"));
    assert!(transcript.commands[4].ends_with("\r\n\r\nHello Ben\r\n.\r\n"));
    assert_eq!(transcript.commands[5], "QUIT\r\n");
    assert!(transcript.upgrades.is_empty());
    assert!(transcript.shut_down);
}

#[tokio::test]
async fn test_recipients_sent_in_list_order() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "250 sender\r\n",
        "250 r1\r\n",
        "250 r2\r\n",
        "250 r3\r\n",
        "250 r4\r\n",
        "354 go\r\n",
        "250 queued\r\n",
        "221 bye\r\n",
    ]);
    let config = config(SecureMode::None, HelloMethod::Helo);
    let email = Email::builder(addr("john@example.com"))
        .bcc(addr("d@example.com"))
        .to(addr("a@example.com"))
        .cc(addr("c@example.com"))
        .to(addr("b@example.com"))
        .build()
        .unwrap();

    run(server, &config, &email, None).await.unwrap();

    let transcript = transcript.lock().unwrap();
    let rcpts: Vec<&str> = transcript
        .commands
        .iter()
        .filter(|c| c.starts_with("RCPT TO:"))
        .map(String::as_str)
        .collect();
    assert_eq!(
        rcpts,
        vec![
            "RCPT TO:<a@example.com>\r\n",
            "RCPT TO:<b@example.com>\r\n",
            "RCPT TO:<c@example.com>\r\n",
            "RCPT TO:<d@example.com>\r\n",
        ]
    );
    // Bcc never reaches the headers.
    assert!(!transcript.commands.iter().any(|c| c.contains("Bcc:")));
}

#[tokio::test]
async fn test_starttls_upgrades_once_and_greets_again() {
    let (server, transcript) = MockServer::new(&[
        "220 smtp.example.com ESMTP\r\n",
        "250-smtp.example.com\r\n250-SIZE 35882577\r\n250 STARTTLS\r\n",
        "220 2.0.0 Ready to start TLS\r\n",
        "250-smtp.example.com\r\n250 AUTH LOGIN PLAIN\r\n",
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "235 2.7.0 Accepted\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 go\r\n",
        "250 queued\r\n",
        "221 bye\r\n",
    ]);
    let config = SmtpConfiguration::builder("smtp.example.com")
        .secure(SecureMode::StartTls)
        .hello_method(HelloMethod::Ehlo)
        .credentials("user", "pass")
        .build();
    let email = email();

    run(server, &config, &email, None).await.unwrap();

    let transcript = transcript.lock().unwrap();
    assert_eq!(transcript.upgrades, vec!["smtp.example.com"]);
    assert_eq!(transcript.upgraded_after, Some(2));
    assert_eq!(
        &transcript.commands[..7],
        &[
            "EHLO smtp.example.com\r\n",
            "STARTTLS\r\n",
            "EHLO smtp.example.com\r\n",
            "AUTH LOGIN\r\n",
            "dXNlcg==\r\n",
            "cGFzcw==\r\n",
            "MAIL FROM:<john@example.com>\r\n",
        ]
    );
    assert!(transcript.shut_down);
}

#[tokio::test]
async fn test_required_starttls_rejected() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "454 4.7.0 TLS not available\r\n",
    ]);
    let config = config(SecureMode::StartTls, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(
        matches!(&err, Error::ServerRejected { code: 454, text } if text == "4.7.0 TLS not available"),
        "{err:?}"
    );
    assert!(err.is_transient());
    let transcript = transcript.lock().unwrap();
    assert!(transcript.upgrades.is_empty());
    assert_eq!(transcript.commands.len(), 2);
    assert!(transcript.shut_down);
}

#[tokio::test]
async fn test_optional_starttls_rejected_continues_in_plaintext() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "454 TLS not available\r\n",
        "250 sender\r\n",
        "250 rcpt\r\n",
        "354 go\r\n",
        "250 queued\r\n",
        "221 bye\r\n",
    ]);
    let config = config(SecureMode::StartTlsWhenAvailable, HelloMethod::Helo);
    let email = email();

    run(server, &config, &email, None).await.unwrap();

    let transcript = transcript.lock().unwrap();
    assert!(transcript.upgrades.is_empty());
    assert_eq!(transcript.commands[1], "STARTTLS\r\n");
    assert_eq!(transcript.commands[2], "MAIL FROM:<john@example.com>\r\n");
}

#[tokio::test]
async fn test_required_starttls_not_advertised() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250-smtp.example.com\r\n250 8BITMIME\r\n",
    ]);
    let config = config(SecureMode::StartTls, HelloMethod::Ehlo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(matches!(err, Error::StartTlsUnavailable), "{err:?}");
    assert_eq!(
        transcript.lock().unwrap().commands,
        vec!["EHLO smtp.example.com\r\n"]
    );
}

#[tokio::test]
async fn test_optional_starttls_not_advertised_skips_upgrade() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250-smtp.example.com\r\n250 8BITMIME\r\n",
        "250 sender\r\n",
        "250 rcpt\r\n",
        "354 go\r\n",
        "250 queued\r\n",
        "221 bye\r\n",
    ]);
    let config = config(SecureMode::StartTlsWhenAvailable, HelloMethod::Ehlo);
    let email = email();

    run(server, &config, &email, None).await.unwrap();

    let transcript = transcript.lock().unwrap();
    assert!(!transcript.commands.iter().any(|c| c == "STARTTLS\r\n"));
    assert!(transcript.upgrades.is_empty());
}

#[tokio::test]
async fn test_bytes_before_upgrade_are_refused() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "220 go ahead\r\n250 injected in plaintext\r\n",
    ]);
    let config = config(SecureMode::StartTls, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(matches!(err, Error::UnexpectedData(n) if n > 0), "{err:?}");
    assert!(transcript.lock().unwrap().upgrades.is_empty());
}

#[tokio::test]
async fn test_upgrade_failure() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "220 go ahead\r\n",
    ]);
    let server = server.failing_upgrade();
    let config = config(SecureMode::StartTls, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(matches!(err, Error::TlsNegotiationFailed(_)), "{err:?}");
    assert_eq!(transcript.lock().unwrap().commands.len(), 2);
}

#[tokio::test]
async fn test_log_handler_sees_both_directions() {
    let (server, _transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "535 5.7.8 Authentication failed\r\n",
    ]);
    let config = SmtpConfiguration::builder("smtp.example.com")
        .credentials("user", "hunter2")
        .build();
    let email = email();

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let log: LogHandler = Arc::new(move |line: &str| sink.lock().unwrap().push(line.to_string()));

    let err = run(server, &config, &email, Some(log)).await.unwrap_err();
    assert!(err.is_permanent());

    let lines = lines.lock().unwrap();
    assert_eq!(
        *lines,
        vec![
            "==> 220 ready",
            "<== HELO smtp.example.com",
            "==> 250 hello",
            "<== AUTH LOGIN",
            "==> 334 VXNlcm5hbWU6",
            "<== dXNlcg==",
            "==> 334 UGFzc3dvcmQ6",
            "<== <redacted>",
            "==> 535 5.7.8 Authentication failed",
        ]
    );
}

#[tokio::test]
async fn test_connection_closed_mid_dialogue() {
    let (server, transcript) = MockServer::new(&["220 ready\r\n", "250 hello\r\n"]);
    let config = config(SecureMode::None, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(matches!(err, Error::TransportClosed), "{err:?}");
    assert!(transcript.lock().unwrap().shut_down);
}

#[tokio::test]
async fn test_recipient_rejected() {
    let (server, transcript) = MockServer::new(&[
        "220 ready\r\n",
        "250 hello\r\n",
        "250 sender\r\n",
        "550 5.1.1 No such user\r\n",
    ]);
    let config = config(SecureMode::None, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(
        matches!(&err, Error::ServerRejected { code: 550, text } if text == "5.1.1 No such user"),
        "{err:?}"
    );
    let transcript = transcript.lock().unwrap();
    assert!(!transcript.commands.iter().any(|c| c == "DATA\r\n"));
    assert!(!transcript.commands.iter().any(|c| c == "QUIT\r\n"));
    assert!(transcript.shut_down);
}

#[tokio::test]
async fn test_malformed_greeting() {
    let (server, _transcript) = MockServer::new(&["SSH-2.0-OpenSSH_9.6\r\n"]);
    let config = config(SecureMode::None, HelloMethod::Helo);
    let email = email();

    let err = run(server, &config, &email, None).await.unwrap_err();

    assert!(
        matches!(&err, Error::MalformedResponse(line) if line == "SSH-2.0-OpenSSH_9.6"),
        "{err:?}"
    );
}
