use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use argh::FromArgs;

use crate::config::Config;
use crate::{healthcheck, observability, web};

/// Fake Sentry upstream for relay load tests.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Healthcheck(HealthcheckCommand),
    Version(VersionCommand),
}

/// serve the fake upstream until interrupted
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {
    /// address to listen on, overriding `http_addr`
    #[argh(option, short = 'a')]
    addr: Option<SocketAddr>,

    /// directory with project configs, overriding `projects_dir`
    #[argh(option, short = 'p')]
    projects_dir: Option<PathBuf>,
}

impl RunCommand {
    fn config(self, path: Option<&Path>) -> Result<Config> {
        let mut config = Config::load(path)?;
        if let Some(addr) = self.addr {
            config.http_addr = addr;
        }
        if let Some(dir) = self.projects_dir {
            config.projects_dir = Some(dir);
        }
        Ok(config)
    }
}

/// check that a fake upstream answers on the configured address
///
/// Exits with a non-zero status if the server is unreachable, for use in container healthchecks.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// print the version and exit
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Parses the command line, sets up the runtime and observability, and runs the command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();
    let config_path = args.config.as_deref();

    let (config, serve) = match args.command {
        Command::Version(VersionCommand {}) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Command::Run(run) => (run.config(config_path)?, true),
        Command::Healthcheck(HealthcheckCommand {}) => (Config::load(config_path)?, false),
    };

    // The Sentry client must exist before any runtime threads are spawned.
    let _sentry = observability::init_sentry(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("fake-sentry-worker")
        .worker_threads(config.runtime.worker_threads)
        .enable_all()
        .build()?;
    let _guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);
    let flusher = observability::init_metrics(&config)?;

    let result = runtime.block_on(async move {
        if serve {
            web::server(config).await
        } else {
            healthcheck::healthcheck(config).await
        }
    });

    // Metrics are flushed even if the command failed.
    if let Some(flusher) = flusher {
        runtime.block_on(flusher.flush(None)).ok();
    }

    result
}
