//! Error types for building and encoding messages.

use std::string::FromUtf8Error;

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// None of To, Cc or Bcc has an address.
    #[error("No recipient specified")]
    RecipientNotSpecified,

    /// Invalid mailbox address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 decode error.
    #[error("UTF-8 decode error: {0}")]
    Utf8Decode(#[from] FromUtf8Error),
}
