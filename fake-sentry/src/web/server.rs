use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket};
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::state::State;
use crate::web::app::App;

/// Pending connections queued by the kernel before new ones are refused.
const LISTEN_BACKLOG: u32 = 1024;

/// Runs the fake upstream until a termination signal arrives.
///
/// At shutdown, the number of metric buckets received from relays is logged.
pub async fn server(config: Config) -> Result<()> {
    raise_open_files_limit(config.max_open_files);

    let listener = listen(config.http_addr)
        .with_context(|| format!("failed to listen on {}", config.http_addr))?;
    let state = State::new(config).await?;

    match state.config.dsn() {
        Some(dsn) => tracing::info!(%dsn, "fake-sentry ready"),
        None => tracing::info!("fake-sentry ready"),
    }
    merni::counter!("server.start": 1);

    let shutdown = async {
        elegant_departure::get_shutdown_guard().wait_owned().await;
        tracing::info!("Shutting down ...");
    };
    let app = App::new(state.clone());
    let serve = tokio::spawn(app.serve(listener, shutdown));

    elegant_departure::tokio::depart()
        .on_termination()
        .on_sigint()
        .on_signal(SignalKind::hangup())
        .await;

    let result = serve.await.context("server task failed")?;
    tracing::info!(
        buckets_collected = state.metric_buckets(),
        "Shutdown complete"
    );
    result
}

/// Binds a listener that can be rebound right after a previous run exits.
fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;

    let listener = socket.listen(LISTEN_BACKLOG)?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Raises the soft limit of open files, since every relay connection holds a socket.
fn raise_open_files_limit(wanted: u64) {
    use nix::sys::resource::{Resource, getrlimit, setrlimit};

    let (soft, hard) = match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok(limits) => limits,
        Err(error) => {
            tracing::warn!(%error, "cannot read open files limit");
            return;
        }
    };

    let target = wanted.min(hard);
    if target <= soft {
        return;
    }

    match setrlimit(Resource::RLIMIT_NOFILE, target, hard) {
        Ok(()) => tracing::debug!(from = soft, to = target, "raised open files limit"),
        Err(error) => tracing::warn!(%error, "cannot raise open files limit"),
    }
}
