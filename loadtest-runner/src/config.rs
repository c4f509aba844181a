//! Configuration of a load test run.
//!
//! The configuration is a YAML file:
//!
//! ```yaml
//! relay:
//!   host: http://127.0.0.1
//!   port: 3000
//! use_fake_projects: true
//! duration: 5m
//! num_users: 100
//! users:
//!   errors:
//!     weight: 3
//!     num_projects: 10
//!     wait_time: between(1, 2)
//!     tasks:
//!       random_event:
//!         weight: 2
//!         max_breadcrumbs: 10
//!       file_event:
//!         filename: events/python.json
//!   sessions:
//!     tasks:
//!       - random_session
//! ```
//!
//! String values of the form `${VAR}` are replaced with the value of the environment variable
//! `VAR`, parsed as YAML. Unset variables yield `null`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use loadtest_types::project::ProjectInfo;
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_yaml::Value as YamlValue;

use crate::wait::WaitTime;

/// Address of the relay under test.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// Host name, optionally with a scheme. Defaults to `http` without one.
    pub host: String,
    /// Port the relay listens on.
    pub port: u16,
    /// Compresses envelope requests with gzip.
    #[serde(default)]
    pub compress: bool,
}

impl RelayConfig {
    /// The base URL of the relay, without a trailing slash.
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            format!("{host}:{}", self.port)
        } else {
            format!("http://{host}:{}", self.port)
        }
    }
}

/// The settings of a single task.
///
/// All keys besides `weight` are passed to the task as parameters.
#[derive(Debug, Default, Deserialize)]
pub struct TaskConfig {
    /// Relative frequency of the task. `0` disables it.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Task parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// The tasks of a user class.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TasksConfig {
    /// Task names, all with weight 1 and default parameters.
    List(Vec<String>),
    /// Tasks with weights and parameters. Tasks without a value use defaults.
    Map(BTreeMap<String, Option<TaskConfig>>),
}

impl TasksConfig {
    /// Returns all tasks with their settings.
    ///
    /// Lists keep their order, maps are sorted by task name.
    pub fn entries(&self) -> Vec<(&str, TaskConfig)> {
        match self {
            TasksConfig::List(names) => names
                .iter()
                .map(|name| (name.as_str(), TaskConfig::default_weighted()))
                .collect(),
            TasksConfig::Map(tasks) => tasks
                .iter()
                .map(|(name, config)| {
                    let config = match config {
                        Some(config) => TaskConfig {
                            weight: config.weight,
                            params: config.params.clone(),
                        },
                        None => TaskConfig::default_weighted(),
                    };
                    (name.as_str(), config)
                })
                .collect(),
        }
    }
}

impl TaskConfig {
    fn default_weighted() -> Self {
        Self {
            weight: default_weight(),
            params: Map::new(),
        }
    }
}

/// A class of simulated users sharing the same behavior.
#[derive(Debug, Deserialize)]
pub struct UserConfig {
    /// Relative share of this class among all users. `0` disables the class.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Number of projects each user sends to.
    #[serde(default = "default_num_projects")]
    pub num_projects: usize,
    /// Pause between two tasks.
    #[serde(default)]
    pub wait_time: WaitTime,
    /// Tasks executed by users of this class.
    pub tasks: TasksConfig,
}

/// Main configuration of the load runner.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The relay under test.
    pub relay: RelayConfig,
    /// Sends to fake projects whose keys encode their IDs, instead of [`projects`](Self::projects).
    #[serde(default = "default_true")]
    pub use_fake_projects: bool,
    /// Real projects to send to.
    #[serde(default)]
    pub projects: Vec<ProjectInfo>,
    /// How long to run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Total number of simulated users, distributed across user classes by weight.
    #[serde(default = "default_num_users")]
    pub num_users: usize,
    /// Users started per second. All users start at once if unset.
    #[serde(default)]
    pub spawn_rate: Option<f64>,
    /// User classes by name.
    pub users: BTreeMap<String, UserConfig>,
}

impl Config {
    /// Reads the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    /// Parses the configuration from YAML, expanding environment variables.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut value: YamlValue =
            serde_yaml::from_str(yaml).context("failed to parse config YAML")?;
        expand_env(&mut value, &|name: &str| std::env::var(name).ok());
        serde_yaml::from_value(value).context("invalid configuration")
    }
}

/// Replaces `${VAR}` strings using the given lookup.
fn expand_env(value: &mut YamlValue, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        YamlValue::String(s) => {
            let Some(name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) else {
                return;
            };
            *value = match lookup(name) {
                Some(raw) => serde_yaml::from_str(&raw).unwrap_or(YamlValue::String(raw)),
                None => YamlValue::Null,
            };
        }
        YamlValue::Sequence(items) => {
            for item in items {
                expand_env(item, lookup);
            }
        }
        YamlValue::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_env(item, lookup);
            }
        }
        YamlValue::Tagged(tagged) => expand_env(&mut tagged.value, lookup),
        YamlValue::Null | YamlValue::Bool(_) | YamlValue::Number(_) => (),
    }
}

fn default_weight() -> u32 {
    1
}

fn default_num_projects() -> usize {
    1
}

fn default_num_users() -> usize {
    1
}

fn default_true() -> bool {
    true
}
