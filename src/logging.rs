//! Structured logging setup for test binaries.
//!
//! The client and route table only emit `tracing` events; nothing is printed unless a
//! subscriber is installed. [`build_subscriber`] assembles one from a [`LogConfig`]
//! (env filter plus a JSON or pretty `fmt` layer) so it can be installed globally with
//! [`init_logging_with_config`] / [`try_init_logging`], or scoped to one thread with
//! `tracing::dispatcher::set_default`.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BRRTR_LOG_LEVEL` | `info` | trace/debug/info/warn/error |
//! | `BRRTR_LOG_FORMAT` | `pretty` | `json` or `pretty` |
//! | `BRRTR_LOG_ASYNC` | `false` | write through a `tracing-appender` background thread |
//! | `BRRTR_LOG_TARGET_FILTER` | unset | extra comma-separated filter directives |
//! | `BRRTR_LOG_INCLUDE_LOCATION` | `false` | include file and line |
//!
//! `RUST_LOG`, when set, replaces the level.

use anyhow::{Context, Result};
use std::env;
use std::sync::OnceLock;
use tracing::{warn, Dispatch, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output encoding of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Where formatted events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// libtest's capturing writer; output shows only for failing tests
    TestHarness,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
    pub output: LogOutput,
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(false)
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("BRRTR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("BRRTR_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(LogFormat::Pretty),
            async_logging: env_flag("BRRTR_LOG_ASYNC"),
            target_filter: env::var("BRRTR_LOG_TARGET_FILTER").ok(),
            include_location: env_flag("BRRTR_LOG_INCLUDE_LOCATION"),
            output: LogOutput::Stdout,
        }
    }

    /// Environment settings, but written to the test harness and at `debug` unless
    /// `BRRTR_LOG_LEVEL` says otherwise.
    #[must_use]
    pub fn for_tests() -> Self {
        let mut config = Self::from_env();
        if env::var("BRRTR_LOG_LEVEL").is_err() {
            config.log_level = "debug".to_string();
        }
        config.async_logging = false;
        config.output = LogOutput::TestHarness;
        config
    }

    fn level(&self) -> Level {
        self.log_level.trim().parse().unwrap_or(Level::INFO)
    }

    /// Filter plus the directives that failed to parse.
    fn env_filter(&self) -> (EnvFilter, Vec<String>) {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        let mut rejected = Vec::new();
        let directives = self.target_filter.as_deref().unwrap_or_default();
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(_) => rejected.push(directive.to_string()),
            }
        }
        (filter, rejected)
    }
}

/// Subscriber described by `config`, plus the writer guard when logging is async.
///
/// Dropping the guard flushes and stops the background writer.
#[must_use]
pub fn build_subscriber(config: &LogConfig) -> (Dispatch, Option<WorkerGuard>) {
    let (writer, guard) = match (config.output, config.async_logging) {
        (LogOutput::TestHarness, _) => (BoxMakeWriter::new(TestWriter::default()), None),
        (LogOutput::Stdout, true) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        (LogOutput::Stdout, false) => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let fmt = tracing_subscriber::fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer);
    let fmt = match config.format {
        LogFormat::Json => fmt
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => fmt.pretty().boxed(),
    };

    let (filter, rejected) = config.env_filter();
    let dispatch = Dispatch::new(Registry::default().with(filter).with(fmt));
    for directive in &rejected {
        tracing::dispatcher::with_default(&dispatch, || {
            warn!(directive = %directive, "Ignoring invalid log filter directive");
        });
    }
    (dispatch, guard)
}

static WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber at `log_level`, everything else from the environment.
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging(log_level: &str) -> Result<()> {
    let mut config = LogConfig::from_env();
    config.log_level = log_level.to_string();
    init_logging_with_config(&config)
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    let (dispatch, guard) = build_subscriber(config);
    tracing::dispatcher::set_global_default(dispatch)
        .context("Failed to install global tracing subscriber")?;
    if let Some(guard) = guard {
        // The async writer lives as long as the process
        let _kept = WRITER_GUARD.set(guard).is_ok();
    }
    Ok(())
}

/// Like [`init_logging_with_config`], but an already-installed subscriber is left in
/// place. Returns whether this call installed one.
pub fn try_init_logging(config: &LogConfig) -> bool {
    init_logging_with_config(config).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(format: LogFormat) -> LogConfig {
        LogConfig {
            log_level: "debug".to_string(),
            format,
            async_logging: false,
            target_filter: Some("brrtrouter_testkit=trace, not a directive!!".to_string()),
            include_location: true,
            output: LogOutput::TestHarness,
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_level_parse_falls_back_to_info() {
        let mut config = test_config(LogFormat::Pretty);
        assert_eq!(config.level(), Level::DEBUG);
        config.log_level = "loud".to_string();
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_invalid_directive_is_reported_not_fatal() {
        let (_, rejected) = test_config(LogFormat::Json).env_filter();
        assert_eq!(rejected, vec!["not a directive!!".to_string()]);
    }

    #[test]
    fn test_both_formats_build_and_record_events() {
        for format in [LogFormat::Json, LogFormat::Pretty] {
            let (dispatch, guard) = build_subscriber(&test_config(format));
            assert!(guard.is_none());
            tracing::dispatcher::with_default(&dispatch, || {
                let span = tracing::info_span!("test_call", format = ?format);
                span.in_scope(|| tracing::debug!("inside span"));
                assert!(tracing::enabled!(Level::DEBUG));
            });
        }
    }

    #[test]
    fn test_async_stdout_returns_guard() {
        let mut config = test_config(LogFormat::Json);
        config.output = LogOutput::Stdout;
        config.async_logging = true;
        let (_dispatch, guard) = build_subscriber(&config);
        assert!(guard.is_some());
    }

    #[test]
    fn test_global_install_happens_once() {
        // Nothing else in this test binary installs a global subscriber
        init_logging_with_config(&test_config(LogFormat::Json)).unwrap();
        assert!(init_logging_with_config(&test_config(LogFormat::Pretty)).is_err());
        assert!(!try_init_logging(&test_config(LogFormat::Pretty)));
        assert!(tracing::enabled!(Level::DEBUG));
    }
}
