use tracing_subscriber::EnvFilter;

/// Crates of the harness whose logs are captured in full.
const HARNESS_CRATES: &[&str] = &[
    "fake_sentry",
    "loadtest_generators",
    "loadtest_runner",
    "loadtest_types",
];

/// Initialize the logger for testing.
///
/// Logs go to the output captured by the Rust test runner. By default, harness crates log at
/// `TRACE` and dependencies only report errors. Set `RUST_LOG` to override the filter.
///
/// # Example
///
/// ```
/// loadtest_test::tracing::init();
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| harness_filter());

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn harness_filter() -> EnvFilter {
    let directives = HARNESS_CRATES
        .iter()
        .map(|name| format!("{name}=TRACE"))
        .collect::<Vec<_>>()
        .join(",");

    EnvFilter::new(format!("ERROR,{directives}"))
}
