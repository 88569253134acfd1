//! Display helpers for the list and detail views.

use chrono::{DateTime, FixedOffset, TimeZone};

/// Human-friendly distance between `then` and `now`, e.g. `5 minutes ago`.
#[must_use]
pub fn relative_time<A: TimeZone, B: TimeZone>(then: &DateTime<A>, now: &DateTime<B>) -> String {
    let seconds = now.timestamp() - then.timestamp();
    let phrase = distance(seconds.unsigned_abs());
    if seconds < 0 {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn distance(seconds: u64) -> String {
    let round = |value: f64| value.round() as u64;
    let secs = seconds as f64;
    let minutes = secs / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if secs < 45.0 {
        "a few seconds".to_string()
    } else if secs < 90.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", round(minutes))
    } else if minutes < 90.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", round(hours))
    } else if hours < 36.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", round(days))
    } else if days < 45.0 {
        "a month".to_string()
    } else if days < 320.0 {
        format!("{} months", round(days / 30.4).max(2))
    } else if days < 548.0 {
        "a year".to_string()
    } else {
        format!("{} years", round(days / 365.0).max(2))
    }
}

/// Byte size with a binary unit, e.g. `1.5 KB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.1}");
    let trimmed = rounded.strip_suffix(".0").unwrap_or(&rounded);
    format!("{trimmed} {}", UNITS[unit])
}

/// Broad family of an attachment, from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    /// `image/*`
    Image,
    /// `text/*`
    Text,
    /// PDF documents.
    Pdf,
    /// Zip and rar archives.
    Archive,
    /// `audio/*`
    Audio,
    /// `video/*`
    Video,
    /// Anything else.
    Other,
}

impl AttachmentKind {
    /// Classifies a MIME type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.trim().to_ascii_lowercase();
        if ct.starts_with("image/") {
            Self::Image
        } else if ct.starts_with("text/") {
            Self::Text
        } else if ct.contains("pdf") {
            Self::Pdf
        } else if ct.contains("zip") || ct.contains("rar") {
            Self::Archive
        } else if ct.contains("audio/") {
            Self::Audio
        } else if ct.contains("video/") {
            Self::Video
        } else {
            Self::Other
        }
    }

    /// Icon glyph.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Image => "🖼️",
            Self::Text => "📄",
            Self::Pdf => "📕",
            Self::Archive => "📦",
            Self::Audio => "🎵",
            Self::Video => "🎬",
            Self::Other => "📎",
        }
    }
}

/// Window title: `(3) Maildock`, or just the name when nothing is unread.
#[must_use]
pub fn inbox_title(app_name: &str, unread: usize) -> String {
    if unread == 0 {
        app_name.to_string()
    } else {
        format!("({unread}) {app_name}")
    }
}

/// Timestamp of the detail view, `DD/MM/YYYY HH:mm`.
#[must_use]
pub fn detail_timestamp(date: &DateTime<FixedOffset>) -> String {
    date.format("%d/%m/%Y %H:%M").to_string()
}
