//! The server push channel.

use std::collections::VecDeque;
use std::future::Future;

use bytes::{Bytes, BytesMut};
use maildock_core::PushChannel;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::error::Result;
use crate::sse::SseDecoder;

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// A source of raw event-stream bytes.
pub trait ChunkSource: Send + 'static {
    /// Next chunk, or `None` at end of stream.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;
}

impl ChunkSource for reqwest::Response {
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        async move { Ok(self.chunk().await?) }
    }
}

/// Adapts any async reader into a [`ChunkSource`].
#[derive(Debug)]
pub struct ReaderSource<R>(pub R);

impl<R> ChunkSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send {
        async move {
            let mut buf = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);
            let n = self.0.read_buf(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            Ok(Some(buf.freeze()))
        }
    }
}

/// `/api/events` as a [`PushChannel`] yielding the data of each message event.
///
/// A transport error ends the stream; reconnecting is left to the caller.
#[derive(Debug)]
pub struct EventStream<S> {
    source: Option<S>,
    decoder: SseDecoder,
    ready: VecDeque<String>,
}

impl<S: ChunkSource> EventStream<S> {
    /// Wraps a byte source.
    pub fn new(source: S) -> Self {
        Self {
            source: Some(source),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Whether the stream can still produce events.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.source.is_some() || !self.ready.is_empty()
    }

    async fn next_payload(&mut self) -> Option<String> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Some(payload);
            }
            let next = self.source.as_mut()?.next_chunk().await;
            match next {
                Ok(Some(chunk)) => self.ready.extend(
                    self.decoder
                        .feed(&chunk)
                        .into_iter()
                        .filter(crate::sse::SseEvent::is_message)
                        .map(|event| event.data),
                ),
                Ok(None) => {
                    debug!("event stream ended");
                    self.source = None;
                }
                Err(err) => {
                    warn!(error = %err, "event stream failed");
                    self.source = None;
                }
            }
        }
    }
}

impl<S: ChunkSource> PushChannel for EventStream<S> {
    fn recv(&mut self) -> impl Future<Output = Option<String>> + Send {
        self.next_payload()
    }

    fn close(&mut self) {
        self.source = None;
        self.ready.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_yields_message_payloads_in_order() {
        let mock = Builder::new()
            .read(b": keep-alive\n\ndata: {\"id\":1}\n\nda")
            .read(b"ta: {\"id\":2}\n\nevent: ping\ndata: x\n\n")
            .build();
        let mut stream = EventStream::new(ReaderSource(mock));

        assert_eq!(stream.recv().await.as_deref(), Some(r#"{"id":1}"#));
        assert_eq!(stream.recv().await.as_deref(), Some(r#"{"id":2}"#));
        assert_eq!(stream.recv().await, None);
        assert!(!stream.is_open());
    }

    #[tokio::test]
    async fn test_incomplete_event_at_end_is_dropped() {
        let mock = Builder::new().read(b"data: partial\n").build();
        let mut stream = EventStream::new(ReaderSource(mock));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let mock = Builder::new()
            .read(b"data: a\n\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut stream = EventStream::new(ReaderSource(mock));
        assert_eq!(stream.recv().await.as_deref(), Some("a"));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let mock = Builder::new().read(b"data: a\n\ndata: b\n\n").build();
        let mut stream = EventStream::new(ReaderSource(mock));
        assert_eq!(stream.recv().await.as_deref(), Some("a"));
        stream.close();
        assert_eq!(stream.recv().await, None);
    }
}
