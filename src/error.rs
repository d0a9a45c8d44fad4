//! # Error Types
//!
//! Every failure a caller of [`TestClient`](crate::TestClient) can observe is a
//! [`CallError`]. The variants are deliberately distinct so tests can assert on
//! *which* kind of failure happened:
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | `Validation` | the request could not be described (bad method, URI, header) |
//! | `Routing` | the engine failed with a caller-meaningful [`RoutingFailure`] |
//! | `UnexpectedRouting` | the engine failed with any other cause |
//! | `Timeout` | headers were not announced within the configured bound |
//! | `Interrupted` | the waiting caller was interrupted via an [`Interrupter`](crate::Interrupter) |
//!
//! Protocol violations by the engine (duplicate header writes, chunks after the
//! terminal signal) never surface here; the collector drops them and logs a warning.

use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Failure cause shared between every waiter of a resolved signal.
pub type Failure = Arc<anyhow::Error>;

/// Error returned from a blocking test call.
#[derive(Debug, Clone)]
pub enum CallError {
    /// A required request field is missing or malformed
    Validation {
        /// Name of the offending field (`method`, `uri`, `header`, `body`)
        field: &'static str,
        /// Human readable reason
        reason: String,
    },
    /// The routing engine signalled a caller-meaningful failure
    Routing(Failure),
    /// The routing engine failed with a cause that carries no routing semantics
    UnexpectedRouting(Failure),
    /// Headers were not announced within the bound
    Timeout(Duration),
    /// The waiting caller was interrupted
    Interrupted,
}

impl CallError {
    pub(crate) fn validation(field: &'static str, reason: impl fmt::Display) -> Self {
        CallError::Validation {
            field,
            reason: reason.to_string(),
        }
    }

    /// Sort an engine-reported cause into `Routing` or `UnexpectedRouting`.
    ///
    /// A cause that already is a `CallError` is re-raised as-is.
    #[must_use]
    pub fn from_routing_cause(cause: Failure) -> Self {
        if let Some(err) = cause.downcast_ref::<CallError>() {
            return err.clone();
        }
        if cause.downcast_ref::<RoutingFailure>().is_some() {
            CallError::Routing(cause)
        } else {
            CallError::UnexpectedRouting(cause)
        }
    }

    /// The engine-reported cause, for both routing variants.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            CallError::Routing(cause) | CallError::UnexpectedRouting(cause) => Some(&**cause),
            _ => None,
        }
    }

    /// The [`RoutingFailure`] carried by a `Routing` error.
    #[must_use]
    pub fn routing_failure(&self) -> Option<&RoutingFailure> {
        match self {
            CallError::Routing(cause) => cause.downcast_ref::<RoutingFailure>(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout(_))
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CallError::Interrupted)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Validation { field, reason } => {
                write!(f, "Invalid request: parameter '{}' {}", field, reason)
            }
            CallError::Routing(cause) => write!(f, "Routing failed: {}", cause),
            CallError::UnexpectedRouting(cause) => {
                write!(f, "Unexpected routing issue: {}", cause)
            }
            CallError::Timeout(bound) => write!(
                f,
                "Response headers were not composed within {} ms",
                bound.as_millis()
            ),
            CallError::Interrupted => write!(f, "Waiting for the response was interrupted"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Routing(cause) | CallError::UnexpectedRouting(cause) => {
                Some(AsRef::<dyn std::error::Error>::as_ref(&**cause))
            }
            _ => None,
        }
    }
}

/// Caller-meaningful routing error: the engine decided the request fails with `status`.
///
/// Engines raise this (wrapped in `anyhow::Error`) through
/// [`ResponseSink::on_error`](crate::ResponseSink::on_error); the client surfaces it as
/// [`CallError::Routing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingFailure {
    status: StatusCode,
    message: String,
}

impl RoutingFailure {
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("No handler found for path: {}", path))
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RoutingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for RoutingFailure {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_routing_failure_is_caller_meaningful() {
        let cause: Failure = Arc::new(anyhow::Error::new(RoutingFailure::internal("boom")));
        let err = CallError::from_routing_cause(cause);
        assert!(matches!(err, CallError::Routing(_)));
        assert_eq!(
            err.routing_failure().map(RoutingFailure::status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_plain_cause_is_unexpected() {
        let cause: Failure = Arc::new(anyhow::anyhow!("disk on fire"));
        let err = CallError::from_routing_cause(cause);
        assert!(matches!(err, CallError::UnexpectedRouting(_)));
        assert!(err.routing_failure().is_none());
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_call_error_cause_is_reraised() {
        let cause: Failure = Arc::new(anyhow::Error::new(CallError::Interrupted));
        assert!(CallError::from_routing_cause(cause).is_interrupted());
    }

    #[test]
    fn test_display_timeout() {
        let err = CallError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Response headers were not composed within 250 ms"
        );
    }
}
