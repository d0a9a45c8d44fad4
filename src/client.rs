//! # Test Client
//!
//! [`TestClient`] issues requests directly against a [`Routing`] engine, with no
//! network layer in between, and turns the engine's streamed response into a blocking
//! call.
//!
//! ## Call Flow
//!
//! ```text
//! TestClient::call
//!   ├─ RequestDescriptor::new      (validation errors returned here)
//!   ├─ ResponseCollector::new
//!   ├─ CallContext::new            (fresh per call, passed explicitly)
//!   ├─ Routing::route(ctx, req, collector)
//!   │     Err / panic  ──▶ collector.on_error(cause)
//!   └─ wait on headers-ready (bounded, interruptible)
//!         Ok(head)       ──▶ TestResponse
//!         Err(cause)     ──▶ CallError::Routing | CallError::UnexpectedRouting
//!         deadline       ──▶ CallError::Timeout
//!         interrupted    ──▶ CallError::Interrupted
//! ```
//!
//! A timed-out call is not torn down: the engine may still finish and resolve the
//! collector later, nobody is waiting on it anymore.

use http::{Extensions, Method, Uri, Version};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

use crate::builder::TestRequest;
use crate::collector::ResponseCollector;
use crate::config::ClientConfig;
use crate::engine::{CallContext, Routing};
use crate::error::CallError;
use crate::headers::Headers;
use crate::request::{BodySource, RequestDescriptor};
use crate::response::TestResponse;
use crate::signal::{Interrupter, WaitOutcome};
use crate::sink::ResponseSink;

/// In-process client for a routing engine.
#[derive(Clone)]
pub struct TestClient {
    routing: Arc<dyn Routing>,
    config: ClientConfig,
    shared: Extensions,
    interrupter: Interrupter,
}

impl TestClient {
    /// Client with the default configuration (10 minute header timeout).
    pub fn new(routing: impl Routing + 'static) -> Self {
        Self::with_config(routing, ClientConfig::default())
    }

    pub fn with_config(routing: impl Routing + 'static, config: ClientConfig) -> Self {
        Self {
            routing: Arc::new(routing),
            config,
            shared: Extensions::new(),
            interrupter: Interrupter::new(),
        }
    }

    /// Build the engine first, then wrap it.
    pub fn from_builder<R, F>(build: F) -> Self
    where
        R: Routing + 'static,
        F: FnOnce() -> R,
    {
        Self::new(build())
    }

    /// Add a value every call context starts with.
    #[must_use]
    pub fn with_context_value<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.shared.insert(value);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handle that interrupts the calls currently blocked in this client or its clones.
    ///
    /// Calls started after `interrupt()` are not affected.
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Start building a request for `path`.
    pub fn path(&self, path: impl Into<String>) -> TestRequest<'_> {
        TestRequest::new(self, path.into())
    }

    /// Run one request through the engine and return once headers are composed.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method (`Method::GET`, `"PATCH"`)
    /// * `version` - HTTP version reported to the engine
    /// * `uri` - request target, path plus optional query
    /// * `headers` - request headers
    /// * `body` - request body; `None` for an empty body
    ///
    /// # Errors
    ///
    /// See [`CallError`]: validation, routing failure, timeout or interruption.
    pub fn call<M, U>(
        &self,
        method: M,
        version: Version,
        uri: U,
        headers: Headers,
        body: Option<BodySource>,
    ) -> Result<TestResponse, CallError>
    where
        M: TryInto<Method>,
        M::Error: fmt::Display,
        U: TryInto<Uri>,
        U::Error: fmt::Display,
    {
        let req = RequestDescriptor::new(method, version, uri, headers, body)?;
        let request_id = req.request_id();
        let collector = Arc::new(ResponseCollector::new(request_id));
        let span = info_span!(
            "test_call",
            request_id = %request_id,
            method = %req.method(),
            uri = %req.uri(),
        );
        let ctx = CallContext::new(request_id, span.clone(), &self.shared);

        {
            let _entered = span.enter();
            debug!("Dispatching request to routing engine");
            let sink: Arc<dyn ResponseSink> = Arc::clone(&collector) as Arc<dyn ResponseSink>;
            match catch_unwind(AssertUnwindSafe(|| self.routing.route(&ctx, req, sink))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "Routing engine failed synchronously");
                    collector.on_error(err);
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(panic = %message, "Routing engine panicked");
                    collector.on_error(anyhow::anyhow!("Routing engine panicked: {}", message));
                }
            }
        }

        let timeout = self.config.timeout();
        let _entered = span.enter();
        match collector
            .when_headers_completed()
            .wait_interruptible(timeout, &self.interrupter)
        {
            WaitOutcome::Resolved(Ok(head)) => {
                info!(
                    status = head.status.as_u16(),
                    elapsed_us = ctx.elapsed().as_micros(),
                    "Response headers received"
                );
                Ok(TestResponse::new(head, collector, timeout))
            }
            WaitOutcome::Resolved(Err(cause)) => Err(CallError::from_routing_cause(cause)),
            WaitOutcome::TimedOut => {
                warn!(
                    timeout_ms = timeout.as_millis(),
                    "Timed out waiting for response headers"
                );
                Err(CallError::Timeout(timeout))
            }
            WaitOutcome::Interrupted => {
                warn!("Interrupted while waiting for response headers");
                Err(CallError::Interrupted)
            }
        }
    }
}

impl fmt::Debug for TestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
