//! A fake upstream running inside the test process.
//!
//! ```
//! use loadtest_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = TestServer::new().await;
//!     std::fs::write(server.projects_dir().join("default.json"), "{}").unwrap();
//!     let url = server.url("/api/0/relays/projectconfigs/?version=2");
//!     // send requests to the URL...
//! }
//! ```

use std::future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use fake_sentry::config::Config;
use fake_sentry::state::{ServiceState, State};
use fake_sentry::web::App;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A fake upstream serving on a random port of localhost.
///
/// Project configs are read from a temporary directory that lives as long as the server. The
/// server stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    state: ServiceState,
    projects: TempDir,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Starts a server with the given configuration.
    ///
    /// `http_addr` and `projects_dir` are replaced.
    pub async fn with_config(config: Config) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let projects = tempfile::tempdir().unwrap();

        let state = State::new(Config {
            http_addr: addr,
            projects_dir: Some(projects.path().to_owned()),
            ..config
        })
        .await
        .unwrap();

        let app = App::new(state.clone());
        let task = tokio::spawn(async move {
            app.serve(listener, future::pending()).await.unwrap();
        });

        Self {
            addr,
            state,
            projects,
            task,
        }
    }

    /// Returns the URL of a path on this server, using `localhost` as host name.
    pub fn url(&self, path: &str) -> String {
        format!(
            "http://localhost:{}/{}",
            self.addr.port(),
            path.trim_start_matches('/')
        )
    }

    /// The address the server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The shared state of the running server.
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Directory from which project configs are read.
    ///
    /// Write `<public_key>.json` or `default.json` here before relays request configs.
    pub fn projects_dir(&self) -> &Path {
        self.projects.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
