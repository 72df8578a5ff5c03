//! # postwire-smtp
//!
//! An SMTP client engine implementing the sending side of RFC 5321.
//!
//! ## Features
//!
//! - **Sans-I/O dialogue**: a state machine turns each server reply into
//!   the next command, independent of the transport
//! - **TLS support**: implicit TLS (port 465), required STARTTLS, or
//!   opportunistic STARTTLS with plaintext fallback
//! - **Authentication**: AUTH LOGIN
//! - **Tolerant framing**: CRLF or bare LF, replies split across reads
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_mime::{Email, EmailAddress};
//! use postwire_smtp::{HelloMethod, SecureMode, SmtpClient, SmtpConfiguration};
//!
//! #[tokio::main]
//! async fn main() -> postwire_smtp::Result<()> {
//!     let config = SmtpConfiguration::builder("smtp.example.com")
//!         .secure(SecureMode::StartTls)
//!         .hello_method(HelloMethod::Ehlo)
//!         .credentials("user@example.com", "password")
//!         .build();
//!
//!     let email = Email::builder(EmailAddress::new("user@example.com")?)
//!         .to(EmailAddress::new("friend@example.com")?)
//!         .subject("Test")
//!         .text_body("Hello, World!")
//!         .build()?;
//!
//!     let client = SmtpClient::new(config);
//!     client.send(&email, None).await?;
//!
//!     // Or fire and collect later, from async code or a plain thread.
//!     let delivery = client.dispatch(email, None);
//!     delivery.await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: Command encoder
//! - [`connection`]: Transports, STARTTLS upgrade and framed I/O
//! - [`dialogue`]: Protocol state machine
//! - [`parser`]: Line framer and reply parser
//! - [`types`]: Replies and EHLO extensions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
pub mod command;
mod config;
pub mod connection;
pub mod dialogue;
mod error;
pub mod parser;
pub mod types;

pub use client::{Delivery, Session, SmtpClient, send};
pub use command::Command;
pub use config::{
    DEFAULT_CONNECT_TIMEOUT, HelloMethod, SecureMode, SignInMethod, SmtpConfiguration,
    SmtpConfigurationBuilder,
};
pub use connection::{FramedStream, LogHandler, SmtpStream, Upgrade};
pub use dialogue::{Dialogue, DialogueState, Step};
pub use error::{Error, Result};
pub use types::{AuthMechanism, Extension, Reply, ReplyCode, Response};
