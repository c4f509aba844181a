//! Fake upstream for load testing a relay.
//!
//! Run `fake-sentry run` to start the server. See [`fake_sentry::config`] for configuration.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

fn main() -> anyhow::Result<()> {
    fake_sentry::cli::execute()
}
