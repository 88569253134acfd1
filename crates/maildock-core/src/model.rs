//! Message data models, as served by the mail API.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message. Stable for the life of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Unique identifier for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub i64);

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file attached to a message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment identifier.
    pub id: AttachmentId,
    /// Message owning this attachment.
    pub mail_id: MessageId,
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// `Content-Disposition` header, when the sender set one.
    #[serde(default)]
    pub content_disposition: Option<String>,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Server-relative locator of the file bytes.
    pub file_url: String,
}

/// A received message.
///
/// The list endpoint serves the same shape as the detail endpoint; body
/// fields and attachments may be empty in list summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier, unique within a list snapshot.
    pub id: MessageId,
    /// Sender, either `addr@host` or `Name <addr@host>`.
    pub from_address: String,
    /// Sender display name (may be empty).
    #[serde(default)]
    pub from_name: String,
    /// Recipient, either `addr@host` or `Name <addr@host>`.
    pub to_address: String,
    /// Recipient display name (may be empty).
    #[serde(default)]
    pub to_name: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Rendered markup body.
    #[serde(default)]
    pub html: String,
    /// Plain-text body.
    #[serde(default)]
    pub text: String,
    /// Reception timestamp as sent by the server.
    #[serde(default)]
    pub date: String,
    /// Whether the message has been read. Only ever goes from false to true.
    pub is_read: bool,
    /// Attachments, in server order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Name shown in the list for the sender.
    #[must_use]
    pub fn sender_display(&self) -> &str {
        if self.from_name.trim().is_empty() {
            &self.from_address
        } else {
            &self.from_name
        }
    }

    /// Parsed sender mailbox.
    #[must_use]
    pub fn sender(&self) -> Mailbox {
        Mailbox::parse(&self.from_address)
    }

    /// Parsed recipient mailbox.
    #[must_use]
    pub fn recipient(&self) -> Mailbox {
        Mailbox::parse(&self.to_address)
    }

    /// First word of the sender's name, used as the signature line.
    #[must_use]
    pub fn signature_name(&self) -> String {
        let sender = self.sender();
        sender
            .name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Parses the reception date (RFC 3339, then RFC 2822).
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.date)
            .or_else(|_| DateTime::parse_from_rfc2822(&self.date))
            .ok()
    }

    /// Marks the message read. Returns `true` when the flag changed.
    pub fn mark_read(&mut self) -> bool {
        let changed = !self.is_read;
        self.is_read = true;
        changed
    }
}

/// Counts the unread messages of a snapshot.
#[must_use]
pub fn unread_count(messages: &[Message]) -> usize {
    messages.iter().filter(|m| !m.is_read).count()
}

/// A display name and address pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, or the address when there is none.
    pub name: String,
    /// Bare address.
    pub email: String,
}

impl Mailbox {
    /// Parses `Name <email>`; anything else is used as both name and address.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.ends_with('>')
            && let Some(start) = raw.rfind('<')
        {
            let email = raw[start + 1..raw.len() - 1].trim().to_string();
            let name = raw[..start].trim().trim_matches('"').trim().to_string();
            if name.is_empty() {
                return Self {
                    name: email.clone(),
                    email,
                };
            }
            return Self { name, email };
        }
        Self {
            name: raw.to_string(),
            email: raw.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "id": 7,
            "from_address": "Alice Martin <alice@example.com>",
            "from_name": "Alice Martin",
            "to_address": "dev@example.com",
            "to_name": "",
            "subject": "Build report",
            "html": "<p>green</p>",
            "text": "green",
            "date": "2024-05-01T10:00:00Z",
            "is_read": false,
            "attachments": [{
                "id": 3,
                "mail_id": 7,
                "filename": "report.pdf",
                "content_type": "application/pdf",
                "content_disposition": null,
                "size_bytes": 2048,
                "file_url": "/attachments/report.pdf"
            }]
        }"#
    }

    #[test]
    fn test_message_from_server_json() {
        let message: Message = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(message.id, MessageId(7));
        assert!(!message.is_read);
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].mail_id, MessageId(7));
        assert!(message.received_at().is_some());
    }

    #[test]
    fn test_summary_without_body_fields() {
        let message: Message = serde_json::from_str(
            r#"{"id":1,"from_address":"a@b.c","to_address":"d@e.f","is_read":true}"#,
        )
        .unwrap();
        assert!(message.html.is_empty());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_missing_read_flag_is_not_a_message() {
        let parsed = serde_json::from_str::<Message>(
            r#"{"id":1,"from_address":"a@b.c","to_address":"d@e.f"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_mailbox_parse() {
        let mb = Mailbox::parse("Alice Martin <alice@example.com>");
        assert_eq!(mb.name, "Alice Martin");
        assert_eq!(mb.email, "alice@example.com");

        let mb = Mailbox::parse("bob@example.com");
        assert_eq!(mb.name, "bob@example.com");
        assert_eq!(mb.email, "bob@example.com");

        let mb = Mailbox::parse("<carol@example.com>");
        assert_eq!(mb.name, "carol@example.com");
    }

    #[test]
    fn test_sender_display_and_signature() {
        let mut message: Message = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(message.sender_display(), "Alice Martin");
        assert_eq!(message.signature_name(), "Alice");

        message.from_name.clear();
        assert_eq!(message.sender_display(), "Alice Martin <alice@example.com>");
    }

    #[test]
    fn test_mark_read_is_one_way() {
        let mut message: Message = serde_json::from_str(sample_json()).unwrap();
        assert!(message.mark_read());
        assert!(!message.mark_read());
        assert!(message.is_read);
    }

    #[test]
    fn test_unread_count() {
        let mut a: Message = serde_json::from_str(sample_json()).unwrap();
        let mut b = a.clone();
        b.id = MessageId(8);
        assert_eq!(unread_count(&[a.clone(), b.clone()]), 2);
        a.mark_read();
        assert_eq!(unread_count(&[a, b]), 1);
    }

    #[test]
    fn test_message_id_from_str() {
        assert_eq!(" 42 ".parse::<MessageId>().unwrap(), MessageId(42));
        assert!("abc".parse::<MessageId>().is_err());
    }
}
