//! Runs simulated users against a relay and prints latency metrics.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use argh::FromArgs;
use loadtest_runner::Config;
use tracing_subscriber::EnvFilter;

/// Load generator for relays
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("INFO"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = Config::load(&args.config)?;
    let report = loadtest_runner::run(config).await?;
    report.print()?;

    Ok(())
}
