//! # Response Sink Contract
//!
//! The routing engine delivers its response through a push-based protocol:
//!
//! 1. `write_status_and_headers` announces the status line and headers (once)
//! 2. `on_subscribe` hands the sink the producer's flow-control [`Subscription`]
//! 3. `on_next` pushes body chunks, no more than the sink has requested
//! 4. exactly one of `on_complete` / `on_error` ends the stream
//!
//! Callbacks may arrive from any thread or coroutine. Implementations must tolerate
//! misbehaving producers: duplicate headers, chunks after the terminal signal and
//! multiple terminal signals are ignored rather than raised.

use bytes::Bytes;
use http::StatusCode;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::headers::Headers;

/// Flow-control handle owned by the producer of body chunks.
pub trait Subscription: Send + Sync {
    /// Ask for `n` more chunks. `u64::MAX` means unbounded demand.
    fn request(&self, n: u64);
    /// Stop producing. Must be idempotent.
    fn cancel(&self);
}

/// Hint from the engine on how it would like writes flushed.
///
/// The in-process collector buffers everything, so it accepts and ignores the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    #[default]
    Linear,
    AutoFlush,
    Prefetch,
    Unbounded,
}

/// One unit of body data; may span several buffers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataChunk {
    buffers: SmallVec<[Bytes; 2]>,
}

impl DataChunk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buffers<I>(buffers: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        Self {
            buffers: buffers.into_iter().collect(),
        }
    }

    pub fn push(&mut self, buffer: impl Into<Bytes>) {
        self.buffers.push(buffer.into());
    }

    #[must_use]
    pub fn buffers(&self) -> &[Bytes] {
        &self.buffers
    }

    /// Total number of bytes across all buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.iter().map(Bytes::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for DataChunk {
    fn from(buffer: Bytes) -> Self {
        Self::from_buffers([buffer])
    }
}

impl From<Vec<u8>> for DataChunk {
    fn from(buffer: Vec<u8>) -> Self {
        Bytes::from(buffer).into()
    }
}

impl From<String> for DataChunk {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&str> for DataChunk {
    fn from(text: &str) -> Self {
        Bytes::copy_from_slice(text.as_bytes()).into()
    }
}

impl From<&[u8]> for DataChunk {
    fn from(buffer: &[u8]) -> Self {
        Bytes::copy_from_slice(buffer).into()
    }
}

/// Push-based response consumer driven by the routing engine.
pub trait ResponseSink: Send + Sync {
    /// Announce status and headers. Only the first call takes effect.
    fn write_status_and_headers(&self, status: StatusCode, headers: Headers);

    /// Flush strategy negotiation; no-op unless the sink cares.
    fn backpressure_strategy(&self, _strategy: BackpressureStrategy) {}

    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, chunk: DataChunk);

    fn on_error(&self, error: anyhow::Error);

    fn on_complete(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_length_spans_buffers() {
        let mut chunk = DataChunk::from("hel");
        chunk.push(Bytes::from_static(b"lo"));
        assert_eq!(chunk.len(), 5);
        assert_eq!(chunk.buffers().len(), 2);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_empty_buffers_make_empty_chunk() {
        let chunk = DataChunk::from_buffers([Bytes::new(), Bytes::new()]);
        assert!(chunk.is_empty());
        assert!(DataChunk::new().is_empty());
    }
}
