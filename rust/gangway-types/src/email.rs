//! Structured email messages injected into the sandbox.

use serde::{Deserialize, Serialize};

/// A single address, optionally with a display name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailAddress {
    pub name: String,
    pub address: String,
}

impl EmailAddress {
    /// Render as a mail header token: `Name <addr>` or bare `addr`.
    pub fn format(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.name, self.address)
        }
    }
}

/// An attachment carried alongside the message body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailAttachment {
    pub content_type: String,
    pub content_disposition: String,
    pub content_id: String,
    pub content: Vec<u8>,
}

/// An incoming email as delivered by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailMessage {
    /// Nanoseconds since the epoch.
    pub date: i64,
    pub to: Vec<EmailAddress>,
    pub from: EmailAddress,
    pub reply_to: EmailAddress,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub message_id: String,
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}
