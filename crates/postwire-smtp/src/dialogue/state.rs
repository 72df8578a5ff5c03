//! Dialogue states.

/// Where the dialogue stands: which reply it is waiting for, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// Waiting for the server banner.
    AwaitingGreeting,
    /// `HELO`/`EHLO` sent.
    AwaitingHelloAck,
    /// `STARTTLS` sent.
    AwaitingStartTlsAck,
    /// Greeting re-sent over TLS.
    AwaitingPostTlsHelloAck,
    /// `AUTH LOGIN` sent.
    AwaitingAuthBeginAck,
    /// Username sent.
    AwaitingUsernameAck,
    /// Password sent.
    AwaitingPasswordAck,
    /// `MAIL FROM` sent.
    AwaitingMailFromAck,
    /// `RCPT TO` sent.
    AwaitingRecipientAck,
    /// `DATA` sent.
    AwaitingDataAck,
    /// Message sent.
    AwaitingTransferAck,
    /// `QUIT` sent.
    AwaitingQuitAck,
    /// Delivered.
    Done,
    /// Ended with an error.
    Failed,
}

impl DialogueState {
    /// Returns true once the outcome is decided.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}
