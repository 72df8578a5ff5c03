//! Mailbox addresses.

use crate::encoding::encode_rfc2047;
use crate::error::{Error, Result};
use std::fmt;

/// A single mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EmailAddress {
    address: String,
    name: Option<String>,
}

impl EmailAddress {
    /// Creates a mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        Self::validate(&address)?;
        Ok(Self {
            address,
            name: None,
        })
    }

    /// Creates a mailbox with a display name and address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn with_name(address: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let mut mailbox = Self::new(address)?;
        mailbox.name = Some(name.into());
        Ok(mailbox)
    }

    /// Returns the bare address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the domain part of the address, if it has one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }

    /// Formats the mailbox for a header: `Name <address>` or the bare
    /// address. Non-ASCII names become RFC 2047 encoded words.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", encode_rfc2047(name, "utf-8"), self.address),
            None => self.address.clone(),
        }
    }

    // Envelope commands embed the address between angle brackets on a
    // single line, so those characters can never be part of it.
    fn validate(address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if let Some(bad) = address
            .chars()
            .find(|c| matches!(c, '\r' | '\n' | '<' | '>'))
        {
            return Err(Error::InvalidAddress(format!(
                "Address contains forbidden character {bad:?}: {address:?}"
            )));
        }

        Ok(())
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Joins mailboxes into a comma-separated header value.
pub(crate) fn join_header_values(addresses: &[EmailAddress]) -> String {
    addresses
        .iter()
        .map(EmailAddress::to_header_value)
        .collect::<Vec<_>>()
        .join(", ")
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
    fn test_valid_address() {
        let addr = EmailAddress::new("user@example.com").unwrap();
        assert_eq!(addr.address(), "user@example.com");
        assert!(addr.name().is_none());
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(matches!(
            EmailAddress::new(""),
            Err(Error::InvalidAddress(_))
        ));
        assert!(EmailAddress::new("   ").is_err());
    }

    #[test]
    fn test_invalid_address_injection() {
        assert!(EmailAddress::new("user@example.com>\r\nRCPT TO:<x@y").is_err());
        assert!(EmailAddress::new("<user@example.com>").is_err());
    }

    #[test]
    fn test_with_name() {
        let mailbox = EmailAddress::with_name("john@example.com", "John Doe").unwrap();
        assert_eq!(mailbox.name(), Some("John Doe"));
        assert_eq!(mailbox.to_header_value(), "John Doe <john@example.com>");
        assert_eq!(mailbox.to_string(), "John Doe <john@example.com>");
    }

    #[test]
    fn test_header_value_bare() {
        let mailbox = EmailAddress::new("john@example.com").unwrap();
        assert_eq!(mailbox.to_header_value(), "john@example.com");
    }

    #[test]
    fn test_header_value_encodes_non_ascii_name() {
        let mailbox = EmailAddress::with_name("jose@example.com", "José").unwrap();
        let value = mailbox.to_header_value();
        assert!(value.starts_with("=?utf-8?B?"));
        assert!(value.ends_with(" <jose@example.com>"));
    }

    #[test]
    fn test_domain() {
        let mailbox = EmailAddress::new("user@mail.example.com").unwrap();
        assert_eq!(mailbox.domain(), Some("mail.example.com"));
        assert_eq!(EmailAddress::new("postmaster").unwrap().domain(), None);
    }

    #[test]
    fn test_join_header_values() {
        let list = vec![
            EmailAddress::new("a@example.com").unwrap(),
            EmailAddress::with_name("b@example.com", "Bee").unwrap(),
        ];
        assert_eq!(join_header_values(&list), "a@example.com, Bee <b@example.com>");
    }
}
