//! # Configuration
//!
//! Configuration is loaded from environment variables, with `Default` impls holding the
//! production values.
//!
//! ## Environment Variables
//!
//! ### `BRRTR_TEST_TIMEOUT_MS`
//!
//! Upper bound a test call waits for response headers. Default: `600000` (10 minutes).
//! Tests that exercise the timeout path should set a short bound explicitly with
//! [`ClientConfig::with_timeout`] instead of relying on the environment.
//!
//! ### `BRRTR_STACK_SIZE`
//!
//! Stack size of the coroutines [`RouteTable`](crate::router::RouteTable) runs handlers
//! on. Accepts decimal (`65536`) or hexadecimal (`0x10000`). Default: `0x10000` (64 KB).

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Default bound on waiting for response headers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default handler coroutine stack size.
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Settings of a [`TestClient`](crate::TestClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Header wait bound in milliseconds
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let timeout_ms = env::var("BRRTR_TEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(|| Self::default().timeout_ms);
        Self { timeout_ms }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Runtime settings of the bundled route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for handler coroutines in bytes
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("BRRTR_STACK_SIZE")
            .ok()
            .and_then(|v| parse_stack_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }
}

/// Parse a stack size given in decimal or `0x`-prefixed hexadecimal.
#[must_use]
pub fn parse_stack_size(value: &str) -> Option<usize> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_ten_minutes() {
        assert_eq!(ClientConfig::default().timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_with_timeout() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(50));
        assert_eq!(config.timeout_ms, 50);
        assert_eq!(config.timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        let config: ClientConfig = serde_json::from_str(r#"{"timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x4000"), Some(0x4000));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size("big"), None);
    }
}
