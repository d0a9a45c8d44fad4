//! # Routing Engine Contract
//!
//! The test client drives anything that implements [`Routing`]. An engine receives:
//!
//! - a [`CallContext`] scoped to this one call (request id, tracing span and a typed
//!   extension map for per-call state)
//! - the [`RequestDescriptor`]
//! - the [`ResponseSink`] to deliver the response through
//!
//! `route` may produce the whole response before returning, or hand the sink to another
//! thread or coroutine and return immediately. Failures are expected to travel through
//! [`ResponseSink::on_error`]; an `Err` returned from `route` itself is treated the
//! same way.
//!
//! Per-call state is passed explicitly through the context argument. Nothing is stored
//! in thread-locals, so concurrent calls never see each other's state.

use http::Extensions;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::Span;

use crate::ids::RequestId;
use crate::request::RequestDescriptor;
use crate::sink::ResponseSink;

/// Routing/dispatch engine driven by [`TestClient`](crate::TestClient).
pub trait Routing: Send + Sync {
    /// Dispatch `req`, delivering the response through `res`.
    ///
    /// # Errors
    ///
    /// A synchronous failure; the client forwards it to `res.on_error`.
    fn route(
        &self,
        ctx: &CallContext,
        req: RequestDescriptor,
        res: Arc<dyn ResponseSink>,
    ) -> anyhow::Result<()>;
}

impl<F> Routing for F
where
    F: Fn(&CallContext, RequestDescriptor, Arc<dyn ResponseSink>) -> anyhow::Result<()>
        + Send
        + Sync,
{
    fn route(
        &self,
        ctx: &CallContext,
        req: RequestDescriptor,
        res: Arc<dyn ResponseSink>,
    ) -> anyhow::Result<()> {
        self(ctx, req, res)
    }
}

struct ContextInner {
    request_id: RequestId,
    span: Span,
    started: Instant,
    extensions: Mutex<Extensions>,
}

/// Execution context of a single test call.
///
/// Cheap to clone; clones share the same extension map, so an engine can move the
/// context into the coroutine that finishes the response.
#[derive(Clone)]
pub struct CallContext {
    inner: Arc<ContextInner>,
}

impl CallContext {
    /// Fresh context seeded with a copy of `parent` extensions.
    #[must_use]
    pub fn new(request_id: RequestId, span: Span, parent: &Extensions) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                request_id,
                span,
                started: Instant::now(),
                extensions: Mutex::new(parent.clone()),
            }),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    /// Span of the test call.
    ///
    /// Code running on a `may` coroutine can resume on a different worker thread after a
    /// yield, so use `in_scope` around non-yielding sections or `parent: ctx.span()` on
    /// events rather than holding `enter()` across the whole handler.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// Store a per-call value, returning the previous one of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.extensions().insert(value)
    }

    /// Clone out a per-call value.
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions().get::<T>().cloned()
    }

    fn extensions(&self) -> MutexGuard<'_, Extensions> {
        self.inner
            .extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("request_id", &self.inner.request_id)
            .field("elapsed", &self.elapsed())
            .finish_non_exhaustive()
    }
}
