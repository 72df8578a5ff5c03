//! File attachments.

/// A file embedded in a message as a base64 `multipart/mixed` part.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attachment {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from its file name, MIME type and raw bytes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// File name used in `Content-Disposition`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIME content type (e.g. `application/pdf`).
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Raw, unencoded bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
