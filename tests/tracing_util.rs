use brrtrouter_testkit::logging::{build_subscriber, try_init_logging, LogConfig};

/// Subscriber for a test, built by the crate's own logging setup and written through
/// the test harness.
///
/// The first call also installs the same configuration globally so events from `may`
/// worker threads are printed; the installing thread additionally gets a scoped
/// default that is removed when the guard drops.
pub struct TestTracing {
    _guard: tracing::dispatcher::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let config = LogConfig::for_tests();
        try_init_logging(&config);
        let (dispatch, _) = build_subscriber(&config);
        let guard = tracing::dispatcher::set_default(&dispatch);
        Self { _guard: guard }
    }
}
