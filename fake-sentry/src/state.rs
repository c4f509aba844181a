use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::projects::ProjectConfigs;

/// Shared reference to the fake upstream [state](State).
pub type ServiceState = Arc<State>;

/// Everything the fake upstream remembers between requests.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// Project configurations handed out to relays.
    pub projects: ProjectConfigs,
    /// Public keys of relays that requested a registration challenge, by relay ID.
    relays: Mutex<HashMap<String, String>>,
    /// Number of metric buckets received in envelopes.
    metric_buckets: AtomicU64,
}

impl State {
    /// Creates the state and spawns background tasks.
    pub async fn new(config: Config) -> anyhow::Result<ServiceState> {
        tokio::spawn(track_runtime_metrics(config.runtime.metrics_interval));

        if let Some(dir) = &config.projects_dir {
            let metadata = tokio::fs::metadata(dir)
                .await
                .with_context(|| format!("cannot access projects directory {}", dir.display()))?;
            anyhow::ensure!(metadata.is_dir(), "{} is not a directory", dir.display());
        }

        let projects = ProjectConfigs::new(config.projects_dir.clone());

        Ok(Arc::new(Self {
            config,
            projects,
            relays: Mutex::default(),
            metric_buckets: AtomicU64::new(0),
        }))
    }

    /// Remembers the public key of a relay.
    pub fn register_relay(&self, relay_id: &str, public_key: &str) {
        let mut relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        relays.insert(relay_id.to_owned(), public_key.to_owned());
    }

    /// Returns the public keys of the given relays.
    ///
    /// Unknown relays are reported as `None`.
    pub fn relay_public_keys<'a>(
        &self,
        relay_ids: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, Option<String>> {
        let relays = self.relays.lock().unwrap_or_else(PoisonError::into_inner);
        relay_ids
            .into_iter()
            .map(|id| (id.to_owned(), relays.get(id).cloned()))
            .collect()
    }

    /// Adds received metric buckets and returns the new total.
    pub fn add_metric_buckets(&self, count: u64) -> u64 {
        self.metric_buckets.fetch_add(count, Ordering::Relaxed) + count
    }

    /// The number of metric buckets received so far.
    pub fn metric_buckets(&self) -> u64 {
        self.metric_buckets.load(Ordering::Relaxed)
    }
}

/// Periodically captures and reports internal Tokio runtime metrics.
async fn track_runtime_metrics(interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    let metrics = Handle::current().metrics();

    loop {
        ticker.tick().await;
        tracing::trace!("Capturing runtime metrics");

        merni::gauge!("runtime.num_workers": metrics.num_workers());
        merni::gauge!("runtime.num_alive_tasks": metrics.num_alive_tasks());
        merni::gauge!("runtime.global_queue_depth": metrics.global_queue_depth());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relays_and_buckets() {
        let state = State::new(Config::default()).await.unwrap();

        state.register_relay("r1", "key1");
        state.register_relay("r1", "key2");

        let keys = state.relay_public_keys(["r1", "r2"]);
        assert_eq!(keys["r1"].as_deref(), Some("key2"));
        assert_eq!(keys["r2"], None);

        assert_eq!(state.add_metric_buckets(3), 3);
        assert_eq!(state.add_metric_buckets(2), 5);
        assert_eq!(state.metric_buckets(), 5);
    }

    #[tokio::test]
    async fn missing_projects_dir() {
        let config = Config {
            projects_dir: Some("/nonexistent/fake-sentry/projects".into()),
            ..Config::default()
        };
        assert!(State::new(config).await.is_err());
    }
}
