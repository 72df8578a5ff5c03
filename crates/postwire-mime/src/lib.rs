//! # postwire-mime
//!
//! Outbound email model and RFC 5322 / MIME renderer.
//!
//! ## Features
//!
//! - **Message model**: Validated mailboxes, recipients split into To, Cc and Bcc
//! - **Rendering**: Single-part text/HTML bodies or `multipart/mixed` with attachments
//! - **Encoding**: Base64 attachments, Quoted-Printable text bodies, RFC 2047 header words
//! - **DATA-ready output**: 7-bit, folded headers, CRLF line endings, dot-stuffed
//!   bodies, trailing terminator
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_mime::{Attachment, Email, EmailAddress};
//!
//! let email = Email::builder(EmailAddress::with_name("john@example.com", "John Doe")?)
//!     .to(EmailAddress::new("ben@example.com")?)
//!     .bcc(EmailAddress::new("audit@example.com")?)
//!     .subject("Quarterly report")
//!     .text_body("See attached.")
//!     .attach(Attachment::new("report.pdf", "application/pdf", pdf_bytes))
//!     .build()?;
//!
//! // Bytes for the SMTP DATA phase, ending with "\r\n."
//! let wire = email.render();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod attachment;
mod email;
mod error;
mod header;
mod render;

pub mod encoding;

pub use address::EmailAddress;
pub use attachment::Attachment;
pub use email::{Email, EmailBuilder};
pub use error::{Error, Result};
pub use header::Headers;
pub use render::{DATA_TERMINATOR, generate_boundary};
