//! Handler-side response writing.
//!
//! [`ResponseWriter`] is what a route handler gets instead of the raw sink. Sending a
//! response announces status and headers, then subscribes the sink to a
//! [`ChunkPublisher`] that emits body chunks only as fast as the sink requests them.
//!
//! A handler that returns without sending anything would leave the caller waiting for
//! headers until its timeout; dropping an unused writer therefore fails the call with a
//! 500 [`RoutingFailure`].

use anyhow::anyhow;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::warn;

use crate::error::RoutingFailure;
use crate::headers::Headers;
use crate::sink::{DataChunk, ResponseSink, Subscription};

/// Publisher of a fixed list of body chunks, honoring subscriber demand.
///
/// Emission is serialized: a `request` issued from inside `on_next` only adds demand
/// and the outer drain loop picks it up, so the sink is never re-entered recursively.
pub struct ChunkPublisher {
    chunks: VecDeque<DataChunk>,
}

impl ChunkPublisher {
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<DataChunk>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach `sink`; nothing is emitted until it requests.
    pub fn subscribe(self, sink: &Arc<dyn ResponseSink>) {
        let subscription = Arc::new(ChunkSubscription {
            chunks: Mutex::new(self.chunks),
            demand: AtomicU64::new(0),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            sink: Arc::downgrade(sink),
        });
        sink.on_subscribe(subscription);
    }
}

struct ChunkSubscription {
    chunks: Mutex<VecDeque<DataChunk>>,
    demand: AtomicU64,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    done: AtomicBool,
    // Weak: the sink holds this subscription until it terminates
    sink: Weak<dyn ResponseSink>,
}

enum Next {
    Emit(DataChunk),
    Exhausted,
    NoDemand,
}

impl ChunkSubscription {
    fn stopped(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.done.load(Ordering::Acquire)
    }

    fn next(&self) -> Next {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        if chunks.is_empty() {
            return Next::Exhausted;
        }
        if self.demand.load(Ordering::Acquire) == 0 {
            return Next::NoDemand;
        }
        match chunks.pop_front() {
            Some(chunk) => Next::Emit(chunk),
            None => Next::Exhausted,
        }
    }

    /// Saturating add; `u64::MAX` stays unbounded.
    fn add_demand(&self, n: u64) {
        let mut current = self.demand.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(n);
            match self
                .demand
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            while !self.stopped() {
                let Some(sink) = self.sink.upgrade() else {
                    self.cancelled.store(true, Ordering::Release);
                    break;
                };
                match self.next() {
                    Next::Emit(chunk) => {
                        if self.demand.load(Ordering::Acquire) != u64::MAX {
                            self.demand.fetch_sub(1, Ordering::AcqRel);
                        }
                        sink.on_next(chunk);
                    }
                    Next::Exhausted => {
                        self.done.store(true, Ordering::Release);
                        sink.on_complete();
                    }
                    Next::NoDemand => break,
                }
            }
            let previous = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = previous - missed;
            if missed == 0 {
                break;
            }
        }
    }
}

impl Subscription for ChunkSubscription {
    fn request(&self, n: u64) {
        if self.stopped() {
            return;
        }
        if n == 0 {
            self.cancelled.store(true, Ordering::Release);
            if let Some(sink) = self.sink.upgrade() {
                sink.on_error(anyhow!("Subscription request must be positive"));
            }
            return;
        }
        self.add_demand(n);
        self.drain();
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Response handle given to route handlers.
pub struct ResponseWriter {
    sink: Arc<dyn ResponseSink>,
    responded: bool,
}

impl ResponseWriter {
    #[must_use]
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            sink,
            responded: false,
        }
    }

    /// Announce `status` and `headers`, then stream `chunks` and complete.
    pub fn send<I>(mut self, status: StatusCode, headers: Headers, chunks: I)
    where
        I: IntoIterator,
        I::Item: Into<DataChunk>,
    {
        self.responded = true;
        self.sink.write_status_and_headers(status, headers);
        ChunkPublisher::new(chunks).subscribe(&self.sink);
    }

    /// Status with no body.
    pub fn status(self, status: StatusCode) {
        self.send(status, Headers::new(), std::iter::empty::<DataChunk>());
    }

    /// Plain text body.
    pub fn text(self, status: StatusCode, body: impl Into<String>) {
        let headers = single_header(HeaderValue::from_static("text/plain; charset=utf-8"));
        self.send(status, headers, [body.into()]);
    }

    /// JSON body. A serialization failure fails the call instead.
    pub fn json<T: Serialize + ?Sized>(self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let headers = single_header(HeaderValue::from_static("application/json"));
                self.send(status, headers, [body]);
            }
            Err(e) => self.fail(RoutingFailure::internal(format!(
                "Failed to serialize response body: {}",
                e
            ))),
        }
    }

    /// Fail the call; the caller sees `err` as the routing failure cause.
    pub fn fail(mut self, err: impl Into<anyhow::Error>) {
        self.responded = true;
        self.sink.on_error(err.into());
    }

    /// Take over the raw sink protocol.
    #[must_use]
    pub fn into_sink(mut self) -> Arc<dyn ResponseSink> {
        self.responded = true;
        Arc::clone(&self.sink)
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        // A panicking handler is reported by the dispatcher with the panic message
        if self.responded || std::thread::panicking() {
            return;
        }
        warn!("Handler returned without writing a response");
        self.sink.on_error(anyhow::Error::new(RoutingFailure::internal(
            "Handler returned without writing a response",
        )));
    }
}

fn single_header(content_type: HeaderValue) -> Headers {
    let mut map = HeaderMap::new();
    map.insert(CONTENT_TYPE, content_type);
    Headers::from(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        subscription: Mutex<Option<Arc<dyn Subscription>>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
        fn request(&self, n: u64) {
            let sub = self.subscription.lock().unwrap().clone().unwrap();
            sub.request(n);
        }
    }

    impl ResponseSink for Recorder {
        fn write_status_and_headers(&self, status: StatusCode, _headers: Headers) {
            self.push(format!("head {}", status.as_u16()));
        }
        fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
            self.push("subscribe".to_string());
            *self.subscription.lock().unwrap() = Some(subscription);
        }
        fn on_next(&self, chunk: DataChunk) {
            let text: Vec<u8> = chunk.buffers().iter().flat_map(|b| b.to_vec()).collect();
            self.push(format!("next {}", String::from_utf8(text).unwrap()));
        }
        fn on_error(&self, error: anyhow::Error) {
            self.push(format!("error {}", error));
        }
        fn on_complete(&self) {
            self.push("complete".to_string());
        }
    }

    fn recorder() -> (Arc<Recorder>, Arc<dyn ResponseSink>) {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn ResponseSink> = Arc::clone(&recorder) as Arc<dyn ResponseSink>;
        (recorder, sink)
    }

    #[test]
    fn test_publisher_emits_only_on_demand() {
        let (recorder, sink) = recorder();
        ChunkPublisher::new(["a", "b", "c"]).subscribe(&sink);
        assert_eq!(recorder.events(), vec!["subscribe"]);

        recorder.request(1);
        assert_eq!(recorder.events(), vec!["subscribe", "next a"]);

        recorder.request(5);
        assert_eq!(
            recorder.events(),
            vec!["subscribe", "next a", "next b", "next c", "complete"]
        );
    }

    #[test]
    fn test_demand_saturates_at_unbounded() {
        let (recorder, sink) = recorder();
        ChunkPublisher::new(["a", "b", "c"]).subscribe(&sink);
        recorder.request(u64::MAX - 1);
        recorder.request(u64::MAX);
        assert_eq!(
            recorder.events(),
            vec!["subscribe", "next a", "next b", "next c", "complete"]
        );
    }

    #[test]
    fn test_cancel_stops_emission() {
        let (recorder, sink) = recorder();
        ChunkPublisher::new(["a", "b"]).subscribe(&sink);
        recorder.request(1);
        recorder.subscription.lock().unwrap().clone().unwrap().cancel();
        recorder.request(10);
        assert_eq!(recorder.events(), vec!["subscribe", "next a"]);
    }

    #[test]
    fn test_zero_request_is_an_error() {
        let (recorder, sink) = recorder();
        ChunkPublisher::new(["a"]).subscribe(&sink);
        recorder.request(0);
        assert_eq!(
            recorder.events(),
            vec!["subscribe", "error Subscription request must be positive"]
        );
    }

    #[test]
    fn test_empty_publisher_completes_on_first_request() {
        let (recorder, sink) = recorder();
        ChunkPublisher::new(Vec::<DataChunk>::new()).subscribe(&sink);
        recorder.request(1);
        assert_eq!(recorder.events(), vec!["subscribe", "complete"]);
    }

    #[test]
    fn test_writer_text_sends_head_then_body() {
        let (recorder, sink) = recorder();
        ResponseWriter::new(sink).text(StatusCode::OK, "hi");
        recorder.request(u64::MAX);
        assert_eq!(
            recorder.events(),
            vec!["head 200", "subscribe", "next hi", "complete"]
        );
    }

    #[test]
    fn test_dropped_writer_fails_call() {
        let (recorder, sink) = recorder();
        drop(ResponseWriter::new(sink));
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("error 500"));
    }
}
