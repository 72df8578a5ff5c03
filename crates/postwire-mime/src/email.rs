//! The outbound message model.

use crate::address::EmailAddress;
use crate::attachment::Attachment;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local};

/// RFC 5322 date layout, e.g. `Tue, 02 Jan 2024 15:04:05 +0100`.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// One outbound message.
///
/// Built with [`Email::builder`]. The date and message id are fixed when the
/// message is built and there are no setters, so every render of the same
/// `Email` carries the same `Date` and `Message-ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Email {
    from: EmailAddress,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    subject: String,
    body: String,
    is_html: bool,
    reply_to: Option<EmailAddress>,
    reference: Option<String>,
    date: String,
    message_id: String,
    attachments: Vec<Attachment>,
}

impl Email {
    /// Starts building a message from the given sender.
    #[must_use]
    pub fn builder(from: EmailAddress) -> EmailBuilder {
        EmailBuilder::new(from)
    }

    /// Sender mailbox.
    #[must_use]
    pub const fn from(&self) -> &EmailAddress {
        &self.from
    }

    /// `To` recipients.
    #[must_use]
    pub fn to(&self) -> &[EmailAddress] {
        &self.to
    }

    /// `Cc` recipients.
    #[must_use]
    pub fn cc(&self) -> &[EmailAddress] {
        &self.cc
    }

    /// `Bcc` recipients. These are used for the envelope only and never
    /// appear in the rendered headers.
    #[must_use]
    pub fn bcc(&self) -> &[EmailAddress] {
        &self.bcc
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Body text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Whether the body is HTML rather than plain text.
    #[must_use]
    pub const fn is_html(&self) -> bool {
        self.is_html
    }

    /// `Reply-To` mailbox.
    #[must_use]
    pub const fn reply_to(&self) -> Option<&EmailAddress> {
        self.reply_to.as_ref()
    }

    /// Message id this message replies to (`In-Reply-To` / `References`).
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Formatted `Date` header value.
    #[must_use]
    pub fn date(&self) -> &str {
        &self.date
    }

    /// `Message-ID` header value, including angle brackets.
    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Attachments in the order they were added.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Envelope recipients: `to`, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}

/// Builder for [`Email`].
#[derive(Debug, Clone)]
#[must_use]
pub struct EmailBuilder {
    from: EmailAddress,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    subject: String,
    body: String,
    is_html: bool,
    reply_to: Option<EmailAddress>,
    reference: Option<String>,
    attachments: Vec<Attachment>,
    date: Option<DateTime<FixedOffset>>,
    message_id: Option<String>,
}

impl EmailBuilder {
    /// Creates a builder with an empty plain-text body.
    pub const fn new(from: EmailAddress) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            is_html: false,
            reply_to: None,
            reference: None,
            attachments: Vec::new(),
            date: None,
            message_id: None,
        }
    }

    /// Adds a `To` recipient.
    pub fn to(mut self, recipient: EmailAddress) -> Self {
        self.to.push(recipient);
        self
    }

    /// Adds a `Cc` recipient.
    pub fn cc(mut self, recipient: EmailAddress) -> Self {
        self.cc.push(recipient);
        self
    }

    /// Adds a `Bcc` recipient.
    pub fn bcc(mut self, recipient: EmailAddress) -> Self {
        self.bcc.push(recipient);
        self
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets a plain-text body.
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = false;
        self
    }

    /// Sets an HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = true;
        self
    }

    /// Sets the `Reply-To` mailbox.
    pub fn reply_to(mut self, reply_to: EmailAddress) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Marks the message as a reply to the given message id.
    pub fn reference(mut self, message_id: impl Into<String>) -> Self {
        self.reference = Some(message_id.into());
        self
    }

    /// Appends an attachment.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Uses a fixed date instead of the current local time.
    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Uses a fixed message id instead of a generated one. The stored id is
    /// always wrapped in exactly one pair of angle brackets.
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Builds the message, fixing its date and message id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecipientNotSpecified`] when `to`, `cc` and `bcc`
    /// are all empty.
    pub fn build(self) -> Result<Email> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(Error::RecipientNotSpecified);
        }

        let date = self.date.unwrap_or_else(|| Local::now().fixed_offset());
        let message_id = match self.message_id {
            Some(id) => format!("<{}>", id.trim_start_matches('<').trim_end_matches('>')),
            None => generate_message_id(&date, &self.from),
        };

        Ok(Email {
            from: self.from,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body: self.body,
            is_html: self.is_html,
            reply_to: self.reply_to,
            reference: self.reference,
            date: date.format(DATE_FORMAT).to_string(),
            message_id,
            attachments: self.attachments,
        })
    }
}

fn generate_message_id(date: &DateTime<FixedOffset>, from: &EmailAddress) -> String {
    let domain = from.domain().unwrap_or("localhost");
    format!(
        "<{}.{:016x}@{domain}>",
        date.timestamp_millis(),
        rand::random::<u64>()
    )
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
    use chrono::TimeZone;

    fn addr(s: &str) -> EmailAddress {
        EmailAddress::new(s).unwrap()
    }

    #[test]
    fn test_build_requires_recipient() {
        let result = Email::builder(addr("from@example.com"))
            .subject("Hi")
            .text_body("Body")
            .build();
        assert!(matches!(result, Err(Error::RecipientNotSpecified)));
    }

    #[test]
    fn test_build_with_any_single_list() {
        for builder in [
            Email::builder(addr("from@example.com")).to(addr("a@example.com")),
            Email::builder(addr("from@example.com")).cc(addr("a@example.com")),
            Email::builder(addr("from@example.com")).bcc(addr("a@example.com")),
        ] {
            assert!(builder.build().is_ok());
        }
    }

    #[test]
    fn test_recipients_order() {
        let email = Email::builder(addr("from@example.com"))
            .bcc(addr("bcc@example.com"))
            .cc(addr("cc@example.com"))
            .to(addr("to1@example.com"))
            .to(addr("to2@example.com"))
            .build()
            .unwrap();

        let recipients: Vec<&str> = email.recipients().map(EmailAddress::address).collect();
        assert_eq!(
            recipients,
            vec![
                "to1@example.com",
                "to2@example.com",
                "cc@example.com",
                "bcc@example.com"
            ]
        );
    }

    #[test]
    fn test_fixed_date_format() {
        let date = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 15, 4, 5)
            .unwrap();
        let email = Email::builder(addr("from@example.com"))
            .to(addr("to@example.com"))
            .date(date)
            .build()
            .unwrap();

        assert_eq!(email.date(), "Tue, 02 Jan 2024 15:04:05 +0100");
    }

    #[test]
    fn test_generated_message_id_uses_sender_domain() {
        let email = Email::builder(addr("from@mail.example.com"))
            .to(addr("to@example.com"))
            .build()
            .unwrap();

        let id = email.message_id();
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@mail.example.com>"));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let build = || {
            Email::builder(addr("from@example.com"))
                .to(addr("to@example.com"))
                .build()
                .unwrap()
        };
        assert_ne!(build().message_id(), build().message_id());
    }

    #[test]
    fn test_message_id_override_gets_brackets() {
        let email = Email::builder(addr("from@example.com"))
            .to(addr("to@example.com"))
            .message_id("fixed@example.com")
            .build()
            .unwrap();
        assert_eq!(email.message_id(), "<fixed@example.com>");
    }

    #[test]
    fn test_message_id_override_with_partial_brackets() {
        let build = |id: &str| {
            Email::builder(addr("from@example.com"))
                .to(addr("to@example.com"))
                .message_id(id)
                .build()
                .unwrap()
        };
        assert_eq!(build("<foo@example.com").message_id(), "<foo@example.com>");
        assert_eq!(build("foo@example.com>").message_id(), "<foo@example.com>");
        assert_eq!(build("<foo@example.com>").message_id(), "<foo@example.com>");
    }

    #[test]
    fn test_body_kind() {
        let email = Email::builder(addr("from@example.com"))
            .to(addr("to@example.com"))
            .html_body("<p>Hi</p>")
            .build()
            .unwrap();
        assert!(email.is_html());

        let email = Email::builder(addr("from@example.com"))
            .to(addr("to@example.com"))
            .text_body("Hi")
            .build()
            .unwrap();
        assert!(!email.is_html());
    }
}
