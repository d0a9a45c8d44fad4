use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{ResponseCollector, ResponseHead};
use crate::error::CallError;
use crate::headers::Headers;
use crate::ids::RequestId;

/// Response returned by a test call as soon as its headers are composed.
///
/// The body may still be streaming in when this is handed out. [`body_bytes`] reads
/// whatever has arrived; [`wait_for_body`] (and the `text`/`json` helpers built on it)
/// block until the engine signalled the end of the stream.
///
/// [`body_bytes`]: TestResponse::body_bytes
/// [`wait_for_body`]: TestResponse::wait_for_body
pub struct TestResponse {
    head: ResponseHead,
    collector: Arc<ResponseCollector>,
    timeout: Duration,
}

impl TestResponse {
    pub(crate) fn new(head: ResponseHead, collector: Arc<ResponseCollector>, timeout: Duration) -> Self {
        Self {
            head,
            collector,
            timeout,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// First value of a response header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.first(name)
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.collector.request_id()
    }

    /// Snapshot of the body bytes received so far
    #[must_use]
    pub fn body_bytes(&self) -> Bytes {
        self.collector.as_bytes()
    }

    /// Whether the engine has sent its terminal signal
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.collector.when_completed().is_resolved()
    }

    /// Block until the body stream ends, then return the full body.
    ///
    /// # Errors
    ///
    /// - [`CallError::Routing`] / [`CallError::UnexpectedRouting`] if the stream failed
    ///   after the headers were sent
    /// - [`CallError::Timeout`] if the stream did not end within `timeout`
    pub fn wait_for_body(&self, timeout: Duration) -> Result<Bytes, CallError> {
        match self.collector.when_completed().wait_timeout(timeout) {
            Some(Ok(())) => Ok(self.collector.as_bytes()),
            Some(Err(cause)) => Err(CallError::from_routing_cause(cause)),
            None => Err(CallError::Timeout(timeout)),
        }
    }

    /// Full body decoded as UTF-8, waiting up to the client's timeout.
    pub fn text(&self) -> anyhow::Result<String> {
        let body = self.wait_for_body(self.timeout)?;
        Ok(String::from_utf8(body.to_vec())?)
    }

    /// Full body deserialized from JSON, waiting up to the client's timeout.
    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let body = self.wait_for_body(self.timeout)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl std::fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestResponse")
            .field("request_id", &self.request_id())
            .field("status", &self.head.status)
            .field("headers", &self.head.headers)
            .field("complete", &self.is_complete())
            .finish()
    }
}
