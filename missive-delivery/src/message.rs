//! Provider-agnostic message content for a broadcast.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Token in a footer that is replaced by the recipient's unsubscribe URL.
pub const UNSUBSCRIBE_URL: &str = "{{UnsubscribeUrl}}";

/// A message as submitted for sending, before any encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub subject: String,
    pub text_body: String,
    #[serde(default)]
    pub text_footer: String,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub html_footer: Option<String>,
}

impl Message {
    /// Check that the message is fit for a list broadcast.
    ///
    /// Every footer must carry [`UNSUBSCRIBE_URL`] so each recipient gets a
    /// working opt-out link. Transactional mail (verification requests) is
    /// rendered without calling this.
    ///
    /// # Errors
    ///
    /// Returns the first [`MessageError`] found.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.from.trim().is_empty() {
            return Err(MessageError::Missing("From address"));
        }
        if self.subject.trim().is_empty() {
            return Err(MessageError::Missing("subject"));
        }
        if has_line_break(&self.from) {
            return Err(MessageError::LineBreak("From address"));
        }
        if has_line_break(&self.subject) {
            return Err(MessageError::LineBreak("subject"));
        }
        if self.text_body.trim().is_empty() {
            return Err(MessageError::Missing("text body"));
        }
        if !self.text_footer.contains(UNSUBSCRIBE_URL) {
            return Err(MessageError::MissingPlaceholder("Text footer"));
        }

        match (&self.html_body, &self.html_footer) {
            (None, None) => Ok(()),
            (Some(_), Some(footer)) if footer.contains(UNSUBSCRIBE_URL) => Ok(()),
            (Some(_), Some(_)) => Err(MessageError::MissingPlaceholder("HTML footer")),
            _ => Err(MessageError::UnpairedHtml),
        }
    }
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}
