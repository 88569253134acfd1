//! Text event-stream (`text/event-stream`) decoding.
//!
//! Lines end with LF, CRLF or CR. A blank line dispatches the event built so
//! far; lines starting with `:` are comments (keep-alives).

use bytes::{Buf, BytesMut};
use tracing::warn;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 4 * 1024 * 1024; // 4 MB

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field, when set.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field, when set.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this is a default `message` event.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event.as_deref().is_none_or(|name| name == "message")
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Skip {
    #[default]
    None,
    Line,
    Event,
}

/// Incremental event-stream decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// The last chunk ended with CR; a leading LF in the next one belongs to it.
    pending_cr: bool,
    /// Skipping an oversized line: first its tail, then the rest of its event.
    skip: Skip,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every event they complete.
    ///
    /// A line that grows past the size limit is dropped together with the
    /// event it belongs to. Events completed before it are still returned.
    #[must_use]
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut chunk = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let terminator = self.buffer[end];
            let line = self.buffer.split_to(end);
            self.buffer.advance(1);
            if terminator == b'\r' {
                if self.buffer.is_empty() {
                    self.pending_cr = true;
                } else if self.buffer[0] == b'\n' {
                    self.buffer.advance(1);
                }
            }

            match self.skip {
                Skip::Line => {
                    self.skip = Skip::Event;
                    continue;
                }
                Skip::Event => {
                    if line.is_empty() {
                        self.skip = Skip::None;
                    }
                    continue;
                }
                Skip::None => {}
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            warn!(len = self.buffer.len(), "dropping oversized event-stream line");
            self.buffer.clear();
            self.event = None;
            self.data.clear();
            self.skip = Skip::Line;
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event,
            data,
            id: self.id.clone(),
        })
    }
}
