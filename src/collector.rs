//! # Response Collector
//!
//! [`ResponseCollector`] is the [`ResponseSink`] handed to the routing engine for one
//! test call. It buffers the streamed body for a synchronous reader and turns the
//! engine's callbacks into two independent single-resolution signals:
//!
//! - **headers-ready**: resolved by the first `write_status_and_headers`, or by a
//!   terminal signal if the engine never announced headers
//! - **completion**: resolved by the first of `on_complete` / `on_error`
//!
//! ## State Machine
//!
//! ```text
//!            write_status_and_headers
//!   Open ─────────────────────────────▶ HeadersReady
//!    │                                      │
//!    │ on_complete / on_error               │ on_complete / on_error
//!    ▼                                      ▼
//!   Terminal(Completed | Failed) ◀──────────┘
//! ```
//!
//! Every transition not drawn above is a protocol violation by the engine. Those calls
//! are dropped with a `warn!` event and never corrupt state already resolved:
//!
//! | Call | In phase | Effect |
//! |------|----------|--------|
//! | `write_status_and_headers` | `HeadersReady`, `Terminal` | ignored |
//! | `on_next` | `Terminal` | ignored |
//! | `on_complete` / `on_error` | `Terminal` | ignored |
//! | `on_subscribe` | holding a subscription, or `Terminal` | new subscription cancelled |
//!
//! ## Locking
//!
//! Phase, body buffer and subscription live under one mutex. Calls back into the
//! producer (`request`, `cancel`) are made with the lock released, because a
//! synchronous producer re-enters `on_next` from inside `request`.

use bytes::Bytes;
use http::StatusCode;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::error::Failure;
use crate::headers::Headers;
use crate::ids::RequestId;
use crate::signal::{Observer, Signal};
use crate::sink::{BackpressureStrategy, DataChunk, ResponseSink, Subscription};

/// Status line and headers announced by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: Headers,
}

impl Default for ResponseHead {
    /// Head used when the engine completes without announcing one.
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: Headers::new(),
        }
    }
}

/// Value of the headers-ready signal.
pub type HeadersOutcome = Result<ResponseHead, Failure>;
/// Value of the completion signal.
pub type CompletionOutcome = Result<(), Failure>;

/// How the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Failed,
}

/// Collector lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    HeadersReady,
    Terminal(Terminal),
}

struct State {
    phase: Phase,
    body: Vec<u8>,
    subscription: Option<Arc<dyn Subscription>>,
}

/// Buffering response sink for one in-process call.
pub struct ResponseCollector {
    request_id: RequestId,
    state: Mutex<State>,
    headers_ready: Signal<HeadersOutcome>,
    completed: Signal<CompletionOutcome>,
}

impl ResponseCollector {
    #[must_use]
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            state: Mutex::new(State {
                phase: Phase::Open,
                body: Vec::new(),
                subscription: None,
            }),
            headers_ready: Signal::new(),
            completed: Signal::new(),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Copy of the body received so far.
    ///
    /// Taken under the buffer lock, so it is always a prefix of the final body, and later
    /// appends never change a snapshot already returned.
    #[must_use]
    pub fn as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    /// Observer of the headers-ready signal.
    #[must_use]
    pub fn when_headers_completed(&self) -> Observer<HeadersOutcome> {
        self.headers_ready.observer()
    }

    /// Observer of the completion signal.
    #[must_use]
    pub fn when_completed(&self) -> Observer<CompletionOutcome> {
        self.completed.observer()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Terminal(outcome)` unless already there, returning the subscription to
    /// cancel. `None` means a terminal signal was already recorded.
    fn enter_terminal(&self, outcome: Terminal) -> Option<Option<Arc<dyn Subscription>>> {
        let mut state = self.lock();
        if let Phase::Terminal(previous) = state.phase {
            warn!(
                request_id = %self.request_id,
                previous = ?previous,
                ignored = ?outcome,
                "Terminal signal after stream already ended - ignoring"
            );
            return None;
        }
        state.phase = Phase::Terminal(outcome);
        Some(state.subscription.take())
    }

    fn cancel_subscription(&self, subscription: Option<Arc<dyn Subscription>>) {
        let Some(subscription) = subscription else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| subscription.cancel())).is_err() {
            error!(
                request_id = %self.request_id,
                "Subscription cancel panicked - resolving response anyway"
            );
        }
    }
}

impl ResponseSink for ResponseCollector {
    fn write_status_and_headers(&self, status: StatusCode, headers: Headers) {
        let mut state = self.lock();
        match state.phase {
            Phase::Open => {
                state.phase = Phase::HeadersReady;
                // Resolved under the lock so a racing on_error cannot slip in between
                // the phase change and the signal.
                self.headers_ready.resolve(Ok(ResponseHead { status, headers }));
                debug!(
                    request_id = %self.request_id,
                    status = status.as_u16(),
                    "Response headers composed"
                );
            }
            phase => {
                warn!(
                    request_id = %self.request_id,
                    phase = ?phase,
                    ignored_status = status.as_u16(),
                    "Duplicate or late status/headers write - keeping first"
                );
            }
        }
    }

    fn backpressure_strategy(&self, _strategy: BackpressureStrategy) {}

    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let accepted = {
            let mut state = self.lock();
            let accept =
                state.subscription.is_none() && !matches!(state.phase, Phase::Terminal(_));
            if accept {
                state.subscription = Some(Arc::clone(&subscription));
            }
            accept
        };

        if accepted {
            subscription.request(u64::MAX);
        } else {
            warn!(
                request_id = %self.request_id,
                "Unexpected subscription - cancelling it"
            );
            subscription.cancel();
        }
    }

    fn on_next(&self, chunk: DataChunk) {
        if chunk.is_empty() {
            return;
        }

        let grow_failure = {
            let mut state = self.lock();
            if let Phase::Terminal(terminal) = state.phase {
                warn!(
                    request_id = %self.request_id,
                    terminal = ?terminal,
                    bytes = chunk.len(),
                    "Body chunk after stream ended - ignoring"
                );
                return;
            }
            match state.body.try_reserve(chunk.len()) {
                Ok(()) => {
                    for buffer in chunk.buffers() {
                        state.body.extend_from_slice(buffer);
                    }
                    None
                }
                Err(e) => Some(e),
            }
        };

        if let Some(e) = grow_failure {
            self.on_error(
                anyhow::Error::new(e).context("Cannot write data chunk into the response buffer"),
            );
        }
    }

    fn on_error(&self, error: anyhow::Error) {
        let Some(subscription) = self.enter_terminal(Terminal::Failed) else {
            return;
        };
        error!(
            request_id = %self.request_id,
            error = %error,
            "Routing failed"
        );
        self.cancel_subscription(subscription);

        let failure: Failure = Arc::new(error);
        self.headers_ready.resolve(Err(Arc::clone(&failure)));
        self.completed.resolve(Err(failure));
    }

    fn on_complete(&self) {
        let Some(subscription) = self.enter_terminal(Terminal::Completed) else {
            return;
        };
        self.cancel_subscription(subscription);

        if self.headers_ready.resolve(Ok(ResponseHead::default())) {
            debug!(
                request_id = %self.request_id,
                "Stream completed without headers - using default head"
            );
        }
        self.completed.resolve(Ok(()));
    }
}
