//! Terminal rendering of the inbox and message views.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use maildock_core::format::{self, AttachmentKind};
use maildock_core::{DeletionPhase, Message, MessageId, PreferenceState, QueryState};

/// Renders the message list.
///
/// `phase` reports the deletion phase of each row; animating rows are dimmed.
/// `new_mail` flags the heading when a push event announced an unread message.
pub fn inbox(
    title: &str,
    new_mail: bool,
    state: &QueryState<Vec<Message>>,
    rendered: &[Message],
    active: Option<MessageId>,
    phase: impl Fn(MessageId) -> DeletionPhase,
    now: DateTime<Utc>,
) -> String {
    let mut out = format!("== {title} ==");
    if new_mail {
        out.push_str(" new mail!");
    }
    out.push('\n');
    if state.is_loading() {
        out.push_str("  Loading...\n");
        return out;
    }
    if let Some(err) = &state.error {
        let _ = writeln!(out, "  Error loading mails: {err}");
    }
    if rendered.is_empty() && state.data.is_some() {
        out.push_str("  No mails yet\n");
    }
    for message in rendered {
        let marker = if active == Some(message.id) {
            '>'
        } else if message.is_read {
            ' '
        } else {
            '*'
        };
        let when = message
            .received_at()
            .map(|date| format::relative_time(&date, &now))
            .unwrap_or_default();
        let line = format!(
            "{marker} [{}] {:<24} {:<40} {when}",
            message.id,
            truncate(message.sender_display(), 24),
            truncate(&message.subject, 40),
        );
        if phase(message.id) == DeletionPhase::Animating {
            let _ = writeln!(out, "\x1b[2m{line}\x1b[0m");
        } else {
            let _ = writeln!(out, "{line}");
        }
    }
    out
}

/// Renders a message detail view.
pub fn detail(state: &QueryState<Message>) -> String {
    let Some(message) = &state.data else {
        if state.is_error() {
            return "Mail not found\n".to_string();
        }
        return "Loading...\n".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "Subject: {}", message.subject);
    let sender = message.sender();
    let _ = writeln!(out, "From:    {} <{}>", sender.name, sender.email);
    let _ = writeln!(out, "To:      {}", message.recipient().email);
    if let Some(date) = message.received_at() {
        let _ = writeln!(out, "Date:    {}", format::detail_timestamp(&date));
    }
    out.push('\n');
    out.push_str(&body_text(message));
    out.push('\n');

    let signature = message.signature_name();
    if !signature.is_empty() {
        let _ = writeln!(out, "\n-- {signature}");
    }

    if !message.attachments.is_empty() {
        let _ = writeln!(out, "\nAttachments ({})", message.attachments.len());
        for attachment in &message.attachments {
            let kind = AttachmentKind::from_content_type(&attachment.content_type);
            let _ = writeln!(
                out,
                "  {} [{}] {} ({} - {})",
                kind.icon(),
                attachment.id,
                attachment.filename,
                format::file_size(attachment.size_bytes),
                attachment.content_type,
            );
        }
    }
    out
}

/// Plain-text body, converting the markup body when there is no text part.
fn body_text(message: &Message) -> String {
    if !message.text.trim().is_empty() {
        return message.text.clone();
    }
    if message.html.trim().is_empty() {
        return String::new();
    }
    htmd::convert(&message.html).unwrap_or_else(|_| message.html.clone())
}

/// Status line for the theme.
pub fn theme(state: &PreferenceState) -> String {
    format!("Theme: {} (showing {:?})", state.selection, state.resolved)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
