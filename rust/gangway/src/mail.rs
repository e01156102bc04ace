//! Maildir delivery of injected email.
//!
//! Each message becomes one file: written under `tmp/`, then renamed into
//! `new/` so readers only ever see complete messages. The file is a
//! multipart/alternative MIME message with a random boundary.

use std::path::PathBuf;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::DateTime;
use rand::Rng;
use tracing::info;

use gangway_types::{
    BoxFuture, BridgeError, EmailAddress, EmailAttachment, EmailMessage, EmailSession,
};

/// Line width for base64-encoded attachment bodies.
const BASE64_LINE: usize = 76;

/// Writes incoming email into a maildir-style directory tree.
pub struct MailSink {
    root: PathBuf,
}

impl MailSink {
    pub fn new(root: impl Into<PathBuf>) -> MailSink {
        MailSink { root: root.into() }
    }

    async fn deliver(&self, email: EmailMessage) -> Result<(), BridgeError> {
        let id = random_id();
        let text = format_message(&email, &id);

        let tmp_dir = self.root.join("tmp");
        let new_dir = self.root.join("new");
        tokio::fs::create_dir_all(&tmp_dir).await.map_err(BridgeError::Mail)?;
        tokio::fs::create_dir_all(&new_dir).await.map_err(BridgeError::Mail)?;

        // Prefix with '_' in case the id starts with '.'.
        let tmp_path = tmp_dir.join(format!("_{id}"));
        let new_path = new_dir.join(format!("_{id}"));
        tokio::fs::write(&tmp_path, text).await.map_err(BridgeError::Mail)?;
        tokio::fs::rename(&tmp_path, &new_path).await.map_err(BridgeError::Mail)?;

        info!(message = %new_path.display(), "delivered email");
        Ok(())
    }
}

impl EmailSession for MailSink {
    fn send(&self, email: EmailMessage) -> BoxFuture<'_, Result<(), BridgeError>> {
        Box::pin(self.deliver(email))
    }
}

/// 128 random bits in a filename- and boundary-safe base64 alphabet.
fn random_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn format_message(email: &EmailMessage, boundary: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    add_date_header(&mut lines, email.date);
    add_address_list_header(&mut lines, "To", &email.to);
    add_address_header(&mut lines, "From", &email.from);
    add_address_header(&mut lines, "Reply-To", &email.reply_to);
    add_address_list_header(&mut lines, "CC", &email.cc);
    add_address_list_header(&mut lines, "BCC", &email.bcc);
    add_header(&mut lines, "Subject", &email.subject);

    add_header(&mut lines, "Message-Id", &email.message_id);
    add_id_list_header(&mut lines, "References", &email.references);
    add_id_list_header(&mut lines, "In-Reply-To", &email.in_reply_to);

    add_header(
        &mut lines,
        "Content-Type",
        &format!("multipart/alternative; boundary={boundary}"),
    );

    lines.push(String::new()); // blank line starts the body

    if let Some(text) = &email.text {
        lines.push(format!("--{boundary}"));
        add_header(&mut lines, "Content-Type", "text/plain; charset=UTF-8");
        lines.push(String::new());
        lines.push(text.clone());
    }
    if let Some(html) = &email.html {
        lines.push(format!("--{boundary}"));
        add_header(&mut lines, "Content-Type", "text/html; charset=UTF-8");
        lines.push(String::new());
        lines.push(html.clone());
    }
    for attachment in &email.attachments {
        add_attachment(&mut lines, boundary, attachment);
    }
    lines.push(format!("--{boundary}--"));

    lines.push(String::new());
    lines.join("\n")
}

/// Headers with empty values are omitted entirely.
fn add_header(lines: &mut Vec<String>, name: &str, value: &str) {
    if !value.is_empty() {
        lines.push(format!("{name}: {value}"));
    }
}

fn add_address_header(lines: &mut Vec<String>, name: &str, address: &EmailAddress) {
    add_header(lines, name, &address.format());
}

fn add_address_list_header(lines: &mut Vec<String>, name: &str, addresses: &[EmailAddress]) {
    let rendered: Vec<String> = addresses.iter().map(EmailAddress::format).collect();
    add_header(lines, name, &rendered.join(", "));
}

/// Message-id lists (References, In-Reply-To) render each id in angle
/// brackets, space-joined.
fn add_id_list_header(lines: &mut Vec<String>, name: &str, ids: &[String]) {
    let rendered: Vec<String> = ids.iter().map(|id| format!("<{id}>")).collect();
    add_header(lines, name, &rendered.join(" "));
}

fn add_date_header(lines: &mut Vec<String>, nanoseconds: i64) {
    let seconds = nanoseconds / 1_000_000_000;
    if let Some(date) = DateTime::from_timestamp(seconds, 0) {
        add_header(
            lines,
            "Date",
            &date.format("%a, %d %b %Y %H:%M:%S %z").to_string(),
        );
    }
}

fn add_attachment(lines: &mut Vec<String>, boundary: &str, attachment: &EmailAttachment) {
    lines.push(format!("--{boundary}"));
    add_header(lines, "Content-Type", &attachment.content_type);
    add_header(lines, "Content-Disposition", &attachment.content_disposition);
    add_header(lines, "Content-Transfer-Encoding", "base64");
    add_header(lines, "Content-Id", &attachment.content_id);
    lines.push(String::new());

    let encoded = STANDARD.encode(&attachment.content);
    let mut rest = encoded.as_str();
    while rest.len() > BASE64_LINE {
        let (line, tail) = rest.split_at(BASE64_LINE);
        lines.push(line.to_owned());
        rest = tail;
    }
    lines.push(rest.to_owned());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_filename_safe() {
        for _ in 0..32 {
            let id = random_id();
            assert_eq!(id.len(), 22); // 128 bits, no padding
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn message_headers_and_parts() {
        let email = EmailMessage {
            date: 816416724 * 1_000_000_000,
            to: vec![EmailAddress { name: "Bob".into(), address: "bob@example.org".into() }],
            from: EmailAddress { name: String::new(), address: "alice@example.org".into() },
            subject: "Hi".into(),
            message_id: "m1@example.org".into(),
            references: vec!["m0@example.org".into()],
            text: Some("plain body".into()),
            html: Some("<p>html body</p>".into()),
            ..EmailMessage::default()
        };
        let text = format_message(&email, "BOUNDARY");

        assert!(text.contains("Date: Wed, 15 Nov 1995 06:25:24 +0000"));
        assert!(text.contains("To: Bob <bob@example.org>"));
        assert!(text.contains("From: alice@example.org"));
        assert!(text.contains("Subject: Hi"));
        assert!(text.contains("References: <m0@example.org>"));
        assert!(text.contains("Content-Type: multipart/alternative; boundary=BOUNDARY"));
        assert!(text.contains("--BOUNDARY\nContent-Type: text/plain; charset=UTF-8\n\nplain body"));
        assert!(text.contains("--BOUNDARY\nContent-Type: text/html; charset=UTF-8\n\n<p>html body</p>"));
        assert!(text.ends_with("--BOUNDARY--\n"));
        // Empty optional headers are omitted.
        assert!(!text.contains("CC:"));
        assert!(!text.contains("In-Reply-To:"));
    }

    #[test]
    fn attachments_are_base64_with_wrapped_lines() {
        let email = EmailMessage {
            attachments: vec![EmailAttachment {
                content_type: "application/octet-stream".into(),
                content_disposition: "attachment; filename=blob".into(),
                content_id: "blob-1".into(),
                content: vec![0xAB; 100],
            }],
            ..EmailMessage::default()
        };
        let text = format_message(&email, "B");
        assert!(text.contains("Content-Transfer-Encoding: base64"));
        assert!(text.contains("Content-Id: blob-1"));

        let encoded = STANDARD.encode(vec![0xAB; 100]);
        let wrapped: Vec<&str> = text
            .lines()
            .skip_while(|line| *line != "Content-Id: blob-1")
            .skip(2)
            .take_while(|line| !line.starts_with("--"))
            .collect();
        assert_eq!(wrapped.concat(), encoded);
        assert!(wrapped.iter().all(|line| line.len() <= BASE64_LINE));
    }
}
