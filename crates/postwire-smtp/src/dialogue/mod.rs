//! Sans-I/O SMTP dialogue.
//!
//! [`Dialogue`] consumes server replies and says what to do next. It never
//! touches the transport, so the session loop owns all I/O.
//!
//! ```text
//! greeting ─→ HELO/EHLO ─┬─→ STARTTLS ─→ (upgrade) HELO/EHLO ─┐
//!                        │                                    │
//!                        ├─→ AUTH LOGIN ─→ user ─→ pass ─┐ ←──┤
//!                        │                               │    │
//!                        └─→ MAIL FROM ←─────────────────┴────┘
//!                              │
//!                              └─→ RCPT TO (×N) ─→ DATA ─→ message ─→ QUIT
//! ```

mod state;

pub use state::DialogueState;

use std::collections::VecDeque;

use postwire_mime::{Email, EmailAddress};

use crate::command::Command;
use crate::config::{HelloMethod, SecureMode, SignInMethod, SmtpConfiguration};
use crate::error::Error;
use crate::types::{AuthMechanism, Extension, Reply, Response};

/// What the session should do after a reply.
#[derive(Debug)]
pub enum Step<'a> {
    /// Write this command.
    Send(Command<'a>),
    /// Upgrade the transport to TLS, then write this command.
    UpgradeThenSend(Command<'a>),
    /// The message was delivered.
    Complete,
    /// The dialogue failed.
    Fail(Error),
    /// The outcome is already decided; nothing to do.
    Ignore,
}

/// State machine for one message over one connection.
#[derive(Debug)]
pub struct Dialogue<'a> {
    config: &'a SmtpConfiguration,
    email: &'a Email,
    state: DialogueState,
    recipients: VecDeque<&'a EmailAddress>,
}

impl<'a> Dialogue<'a> {
    /// Starts a dialogue waiting for the server banner.
    ///
    /// Recipients are queued `to`, then `cc`, then `bcc`.
    #[must_use]
    pub fn new(config: &'a SmtpConfiguration, email: &'a Email) -> Self {
        Self {
            config,
            email,
            state: DialogueState::AwaitingGreeting,
            recipients: email.recipients().collect(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DialogueState {
        self.state
    }

    /// Recipients not yet sent with `RCPT TO`.
    #[must_use]
    pub fn pending_recipients(&self) -> usize {
        self.recipients.len()
    }

    /// Advances on a server reply.
    pub fn on_reply(&mut self, reply: &Reply) -> Step<'a> {
        if self.state.is_terminal() {
            return Step::Ignore;
        }

        let from = self.state;
        let step = self.transition(reply);
        if matches!(step, Step::Fail(_)) {
            self.state = DialogueState::Failed;
        }

        tracing::debug!(
            from = ?from,
            to = ?self.state,
            code = reply.code.as_u16(),
            "dialogue transition"
        );
        step
    }

    /// Ends the dialogue because of a transport failure.
    ///
    /// Returns the error if this decided the outcome, or `None` if the
    /// dialogue had already finished.
    pub fn abort(&mut self, error: Error) -> Option<Error> {
        if self.state.is_terminal() {
            return None;
        }
        tracing::debug!(from = ?self.state, error = %error, "dialogue aborted");
        self.state = DialogueState::Failed;
        Some(error)
    }

    fn transition(&mut self, reply: &Reply) -> Step<'a> {
        let config = self.config;

        if let Response::Error { code, text } = reply.response() {
            if self.state == DialogueState::AwaitingStartTlsAck
                && config.secure == SecureMode::StartTlsWhenAvailable
            {
                tracing::warn!(code, text = %text, "STARTTLS refused, continuing without TLS");
                return self.begin_session();
            }
            return Step::Fail(Error::server_rejected(code, text));
        }

        match self.state {
            DialogueState::AwaitingGreeting => self.send(
                Command::greeting(config.hello_method, &config.host),
                DialogueState::AwaitingHelloAck,
            ),
            DialogueState::AwaitingHelloAck => {
                if config.secure.uses_starttls() {
                    self.request_starttls(reply)
                } else {
                    self.check_auth_mechanisms(reply);
                    self.begin_session()
                }
            }
            DialogueState::AwaitingStartTlsAck => {
                self.state = DialogueState::AwaitingPostTlsHelloAck;
                Step::UpgradeThenSend(Command::greeting(config.hello_method, &config.host))
            }
            DialogueState::AwaitingPostTlsHelloAck => {
                self.check_auth_mechanisms(reply);
                self.begin_session()
            }
            DialogueState::AwaitingAuthBeginAck => match &config.sign_in_method {
                SignInMethod::Credentials { username, .. } => self.send(
                    Command::AuthUsername(username),
                    DialogueState::AwaitingUsernameAck,
                ),
                SignInMethod::Anonymous => {
                    Step::Fail(Error::AuthProtocolFault("username requested without credentials"))
                }
            },
            DialogueState::AwaitingUsernameAck => match &config.sign_in_method {
                SignInMethod::Credentials { password, .. } => self.send(
                    Command::AuthPassword(password),
                    DialogueState::AwaitingPasswordAck,
                ),
                SignInMethod::Anonymous => {
                    Step::Fail(Error::AuthProtocolFault("password requested without credentials"))
                }
            },
            DialogueState::AwaitingPasswordAck => self.mail_from(),
            DialogueState::AwaitingMailFromAck | DialogueState::AwaitingRecipientAck => {
                self.next_recipient()
            }
            DialogueState::AwaitingDataAck => self.send(
                Command::Message(self.email),
                DialogueState::AwaitingTransferAck,
            ),
            DialogueState::AwaitingTransferAck => {
                self.send(Command::Quit, DialogueState::AwaitingQuitAck)
            }
            DialogueState::AwaitingQuitAck => {
                self.state = DialogueState::Done;
                Step::Complete
            }
            DialogueState::Done | DialogueState::Failed => Step::Ignore,
        }
    }

    fn request_starttls(&mut self, hello: &Reply) -> Step<'a> {
        let config = self.config;
        if config.hello_method == HelloMethod::Ehlo && !hello.advertises_starttls() {
            if config.secure == SecureMode::StartTls {
                return Step::Fail(Error::StartTlsUnavailable);
            }
            tracing::warn!(host = %config.host, "STARTTLS not advertised, continuing without TLS");
            self.check_auth_mechanisms(hello);
            return self.begin_session();
        }
        self.send(Command::StartTls, DialogueState::AwaitingStartTlsAck)
    }

    /// Authenticates when credentials are configured, otherwise goes
    /// straight to the mail transaction.
    fn begin_session(&mut self) -> Step<'a> {
        if self.config.sign_in_method.has_credentials() {
            self.send(Command::AuthLogin, DialogueState::AwaitingAuthBeginAck)
        } else {
            self.mail_from()
        }
    }

    fn mail_from(&mut self) -> Step<'a> {
        let email = self.email;
        self.send(
            Command::MailFrom { from: email.from() },
            DialogueState::AwaitingMailFromAck,
        )
    }

    fn next_recipient(&mut self) -> Step<'a> {
        match self.recipients.pop_front() {
            Some(to) => self.send(Command::RcptTo { to }, DialogueState::AwaitingRecipientAck),
            None => self.send(Command::Data, DialogueState::AwaitingDataAck),
        }
    }

    // Only an EHLO reply lists mechanisms; a server that lists some but not
    // LOGIN will most likely refuse AUTH LOGIN.
    fn check_auth_mechanisms(&self, hello: &Reply) {
        if !self.config.sign_in_method.has_credentials() {
            return;
        }
        let login_missing = hello.extensions().any(|extension| {
            matches!(extension, Extension::Auth(ref mechanisms) if !mechanisms.contains(&AuthMechanism::Login))
        });
        if login_missing {
            tracing::warn!(host = %self.config.host, "server does not advertise AUTH LOGIN");
        }
    }

    fn send(&mut self, command: Command<'a>, next: DialogueState) -> Step<'a> {
        self.state = next;
        Step::Send(command)
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
    use crate::parser::parse_reply;
    use proptest::prelude::*;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    fn reply(lines: &[&str]) -> Reply {
        parse_reply(lines).unwrap()
    }

    fn ok() -> Reply {
        reply(&["250 OK"])
    }

    fn email() -> Email {
        Email::builder(addr("john@example.com"))
            .to(addr("to@example.com"))
            .cc(addr("cc@example.com"))
            .bcc(addr("bcc@example.com"))
            .subject("Hi")
            .text_body("Hello")
            .build()
            .unwrap()
    }

    fn config(secure: SecureMode, hello: HelloMethod, credentials: bool) -> SmtpConfiguration {
        let builder = SmtpConfiguration::builder("smtp.example.com")
            .secure(secure)
            .hello_method(hello);
        if credentials {
            builder.credentials("user", "pass").build()
        } else {
            builder.build()
        }
    }

    /// Serialized command of a `Send` or `UpgradeThenSend` step.
    fn wire(step: &Step<'_>) -> String {
        match step {
            Step::Send(cmd) | Step::UpgradeThenSend(cmd) => {
                String::from_utf8(cmd.serialize()).unwrap()
            }
            other => panic!("expected a command, got {other:?}"),
        }
    }

    fn expect_send(dialogue: &mut Dialogue<'_>, reply: &Reply, expected: &str) {
        let step = dialogue.on_reply(reply);
        assert!(matches!(step, Step::Send(_)), "{step:?}");
        assert_eq!(wire(&step), expected);
    }

    #[test]
    fn test_anonymous_plain_dialogue() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        expect_send(&mut dialogue, &reply(&["220 ready"]), "HELO smtp.example.com\r\n");
        assert_eq!(dialogue.state(), DialogueState::AwaitingHelloAck);
        expect_send(&mut dialogue, &ok(), "MAIL FROM:<john@example.com>\r\n");
        expect_send(&mut dialogue, &ok(), "RCPT TO:<to@example.com>\r\n");
        expect_send(&mut dialogue, &ok(), "RCPT TO:<cc@example.com>\r\n");
        expect_send(&mut dialogue, &ok(), "RCPT TO:<bcc@example.com>\r\n");
        assert_eq!(dialogue.state(), DialogueState::AwaitingRecipientAck);
        expect_send(&mut dialogue, &ok(), "DATA\r\n");

        let step = dialogue.on_reply(&reply(&["354 go ahead"]));
        assert!(wire(&step).ends_with("\r\n.\r\n"));
        assert_eq!(dialogue.state(), DialogueState::AwaitingTransferAck);

        expect_send(&mut dialogue, &ok(), "QUIT\r\n");
        assert!(matches!(dialogue.on_reply(&reply(&["221 bye"])), Step::Complete));
        assert_eq!(dialogue.state(), DialogueState::Done);
    }

    #[test]
    fn test_auth_login_sequence() {
        let config = config(SecureMode::None, HelloMethod::Ehlo, true);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        expect_send(&mut dialogue, &reply(&["220 ready"]), "EHLO smtp.example.com\r\n");
        expect_send(
            &mut dialogue,
            &reply(&["250-smtp.example.com", "250 AUTH LOGIN PLAIN"]),
            "AUTH LOGIN\r\n",
        );
        expect_send(&mut dialogue, &reply(&["334 VXNlcm5hbWU6"]), "dXNlcg==\r\n");
        expect_send(&mut dialogue, &reply(&["334 UGFzc3dvcmQ6"]), "cGFzcw==\r\n");
        expect_send(
            &mut dialogue,
            &reply(&["235 Authentication succeeded"]),
            "MAIL FROM:<john@example.com>\r\n",
        );
        assert_eq!(dialogue.state(), DialogueState::AwaitingMailFromAck);
    }

    #[test]
    fn test_starttls_upgrade_then_greet_again() {
        let config = config(SecureMode::StartTls, HelloMethod::Ehlo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        expect_send(
            &mut dialogue,
            &reply(&["250-smtp.example.com", "250 STARTTLS"]),
            "STARTTLS\r\n",
        );

        let step = dialogue.on_reply(&reply(&["220 Ready to start TLS"]));
        assert!(matches!(step, Step::UpgradeThenSend(_)), "{step:?}");
        assert_eq!(wire(&step), "EHLO smtp.example.com\r\n");
        assert_eq!(dialogue.state(), DialogueState::AwaitingPostTlsHelloAck);

        // Anonymous sessions go straight to the envelope after the TLS greeting.
        expect_send(
            &mut dialogue,
            &reply(&["250 smtp.example.com"]),
            "MAIL FROM:<john@example.com>\r\n",
        );
    }

    #[test]
    fn test_starttls_with_credentials_authenticates_after_upgrade() {
        let config = config(SecureMode::StartTls, HelloMethod::Helo, true);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        expect_send(&mut dialogue, &ok(), "STARTTLS\r\n");
        dialogue.on_reply(&reply(&["220 go"]));
        expect_send(&mut dialogue, &ok(), "AUTH LOGIN\r\n");
    }

    #[test]
    fn test_empty_recipient_queue_goes_straight_to_data() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);
        dialogue.recipients.clear();

        dialogue.on_reply(&reply(&["220 ready"]));
        expect_send(&mut dialogue, &ok(), "MAIL FROM:<john@example.com>\r\n");
        assert_eq!(dialogue.state(), DialogueState::AwaitingMailFromAck);
        expect_send(&mut dialogue, &ok(), "DATA\r\n");
        assert_eq!(dialogue.state(), DialogueState::AwaitingDataAck);
    }

    #[test]
    fn test_codes_outside_2xx_3xx_are_rejections() {
        for code in ["199", "421", "600"] {
            let config = config(SecureMode::None, HelloMethod::Helo, false);
            let email = email();
            let mut dialogue = Dialogue::new(&config, &email);

            let line = format!("{code} odd");
            let step = dialogue.on_reply(&reply(&[line.as_str()]));
            assert!(
                matches!(&step, Step::Fail(Error::ServerRejected { code: c, text }) if c.to_string() == code && text == "odd"),
                "{step:?}"
            );
        }
    }

    #[test]
    fn test_required_starttls_rejected() {
        let config = config(SecureMode::StartTls, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        dialogue.on_reply(&ok());
        let step = dialogue.on_reply(&reply(&["454 TLS not available"]));
        assert!(
            matches!(step, Step::Fail(Error::ServerRejected { code: 454, ref text }) if text == "TLS not available")
        );
        assert_eq!(dialogue.state(), DialogueState::Failed);
    }

    #[test]
    fn test_optional_starttls_rejected_falls_back() {
        let config = config(SecureMode::StartTlsWhenAvailable, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        dialogue.on_reply(&ok());
        expect_send(
            &mut dialogue,
            &reply(&["454 TLS not available"]),
            "MAIL FROM:<john@example.com>\r\n",
        );
    }

    #[test]
    fn test_required_starttls_not_advertised() {
        let config = config(SecureMode::StartTls, HelloMethod::Ehlo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        let step = dialogue.on_reply(&reply(&["250-smtp.example.com", "250 SIZE 1000"]));
        assert!(matches!(step, Step::Fail(Error::StartTlsUnavailable)), "{step:?}");
    }

    #[test]
    fn test_optional_starttls_not_advertised_falls_back() {
        let config = config(SecureMode::StartTlsWhenAvailable, HelloMethod::Ehlo, true);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        expect_send(
            &mut dialogue,
            &reply(&["250-smtp.example.com", "250 AUTH LOGIN"]),
            "AUTH LOGIN\r\n",
        );
    }

    #[test]
    fn test_error_reply_fails_from_any_state() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        dialogue.on_reply(&ok());
        dialogue.on_reply(&ok());
        let step = dialogue.on_reply(&reply(&["550-Mailbox", "550 unavailable"]));

        match step {
            Step::Fail(err) => {
                assert!(err.is_permanent());
                assert_eq!(err.to_string(), "SMTP error 550: unavailable");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_replies_after_outcome_are_ignored() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        assert!(matches!(
            dialogue.on_reply(&reply(&["554 go away"])),
            Step::Fail(_)
        ));
        assert!(matches!(dialogue.on_reply(&reply(&["220 ready"])), Step::Ignore));
        assert!(dialogue.abort(Error::TransportClosed).is_none());
        assert_eq!(dialogue.state(), DialogueState::Failed);
    }

    #[test]
    fn test_abort_decides_outcome_once() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();
        let mut dialogue = Dialogue::new(&config, &email);

        dialogue.on_reply(&reply(&["220 ready"]));
        assert!(matches!(
            dialogue.abort(Error::TransportClosed),
            Some(Error::TransportClosed)
        ));
        assert!(dialogue.abort(Error::TransportClosed).is_none());
        assert!(matches!(dialogue.on_reply(&ok()), Step::Ignore));
    }

    #[test]
    fn test_auth_steps_without_credentials_fault() {
        let config = config(SecureMode::None, HelloMethod::Helo, false);
        let email = email();

        for state in [
            DialogueState::AwaitingAuthBeginAck,
            DialogueState::AwaitingUsernameAck,
        ] {
            let mut dialogue = Dialogue::new(&config, &email);
            dialogue.state = state;
            let step = dialogue.on_reply(&reply(&["334 go"]));
            assert!(matches!(step, Step::Fail(Error::AuthProtocolFault(_))), "{step:?}");
            assert_eq!(dialogue.state(), DialogueState::Failed);
        }
    }

    proptest! {
        #[test]
        fn one_rcpt_per_recipient_in_order(to in 0usize..4, cc in 0usize..4, bcc in 0usize..4) {
            prop_assume!(to + cc + bcc > 0);

            let mut builder = Email::builder(addr("john@example.com"));
            let mut expected = Vec::new();
            for i in 0..to {
                let a = format!("to{i}@example.com");
                builder = builder.to(addr(&a));
                expected.push(a);
            }
            for i in 0..cc {
                let a = format!("cc{i}@example.com");
                builder = builder.cc(addr(&a));
                expected.push(a);
            }
            for i in 0..bcc {
                let a = format!("bcc{i}@example.com");
                builder = builder.bcc(addr(&a));
                expected.push(a);
            }
            let email = builder.build().unwrap();
            let config = config(SecureMode::None, HelloMethod::Helo, false);
            let mut dialogue = Dialogue::new(&config, &email);

            dialogue.on_reply(&reply(&["220 ready"]));
            dialogue.on_reply(&ok());

            let mut sent = Vec::new();
            loop {
                let line = wire(&dialogue.on_reply(&ok()));
                if line == "DATA\r\n" {
                    break;
                }
                let address = line
                    .strip_prefix("RCPT TO:<")
                    .and_then(|rest| rest.strip_suffix(">\r\n"))
                    .unwrap()
                    .to_string();
                sent.push(address);
            }

            prop_assert_eq!(sent, expected);
            prop_assert_eq!(dialogue.pending_recipients(), 0);
        }
    }
}
