//! Configuration for the fake upstream.
//!
//! Values are merged from built-in defaults, the YAML file passed with `-c`, and finally
//! environment variables. Variables start with `FAKE_SENTRY__` and separate nested keys with a
//! double underscore, so `FAKE_SENTRY__LOGGING__LEVEL=debug` is the same as:
//!
//! ```yaml
//! logging:
//!   level: debug
//! ```
//!
//! A typical file for a local relay looks like this:
//!
//! ```yaml
//! http_addr: 127.0.0.1:8000
//! public_key: 31a5a894b4524f74a9a8d0e27e21ba91
//! projects_dir: config/projects
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "FAKE_SENTRY__";

/// Largest request body accepted, matching the default envelope size limit of relays.
const DEFAULT_MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

/// A string that is redacted from debug output. Wrap in [`secrecy::SecretBox`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// The secret value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl SerializableSecret for Secret {}

impl Zeroize for Secret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Settings of the Tokio runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads, one per CPU core by default.
    ///
    /// Most requests are answered without doing any work, so relays under load rarely need more.
    pub worker_threads: usize,

    /// Interval for reporting runtime and ingestion gauges, `10s` by default.
    #[serde(with = "humantime_serde")]
    pub metrics_interval: Duration,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            metrics_interval: Duration::from_secs(10),
        }
    }
}

/// Error reporting for the fake upstream itself, disabled without a DSN.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN, `FAKE_SENTRY__SENTRY__DSN`.
    pub dsn: Option<SecretBox<Secret>>,
    /// Environment name for this deployment.
    pub environment: Option<Cow<'static, str>>,
    /// Server name or identifier.
    pub server_name: Option<Cow<'static, str>>,
    /// Error event sample rate between `0.0` and `1.0`.
    pub sample_rate: f32,
    /// Transaction sample rate between `0.0` and `1.0`.
    pub traces_sample_rate: f32,
    /// Whether to inherit sampling decisions from incoming traces.
    pub inherit_sampling_decision: bool,
    /// Enables debug output of the Sentry SDK.
    pub debug: bool,
    /// Tags attached to all events.
    pub tags: BTreeMap<String, String>,
}

impl Sentry {
    /// Whether a DSN is configured.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.01,
            inherit_sampling_decision: true,
            debug: false,
            tags: BTreeMap::new(),
        }
    }
}

/// Minimum level of emitted logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Disables logging.
    Off,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages such as startup and shutdown.
    Info,
    /// Every request.
    Debug,
    /// Everything, including request payloads.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty output on a TTY, simplified output otherwise.
    Auto,
    /// Colored multi-line output for development.
    Pretty,
    /// Compact single-line output without colors.
    Simplified,
    /// Newline delimited JSON records.
    Json,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum level, `info` by default. `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
        }
    }
}

/// Metrics reporting to Datadog.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Metrics {
    /// Datadog API key. Metrics are disabled when unset.
    pub datadog_key: Option<SecretBox<Secret>>,
    /// Tags attached to all metrics.
    pub tags: BTreeMap<String, String>,
}

/// Main configuration of the fake upstream.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Address the HTTP server binds to, `FAKE_SENTRY__HTTP_ADDR`.
    ///
    /// Defaults to `127.0.0.1:8000`, the upstream address a locally started relay expects.
    pub http_addr: SocketAddr,

    /// Largest accepted request body in bytes. Defaults to 100 MiB.
    pub max_body_size: usize,

    /// Public key of the DSN advertised on the root page.
    ///
    /// The key is never checked. Any key is accepted by the ingestion endpoints.
    pub public_key: Option<String>,

    /// Directory containing project configurations.
    ///
    /// A request for project key `<key>` is answered with `<key>.json` from this directory,
    /// falling back to `default.json` and then to a built-in default config.
    pub projects_dir: Option<PathBuf>,

    /// Soft limit of open file descriptors requested at startup, capped by the hard limit.
    pub max_open_files: u64,

    pub runtime: Runtime,
    pub logging: Logging,
    pub sentry: Sentry,
    pub metrics: Metrics,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            public_key: None,
            projects_dir: None,
            max_open_files: 12_000,
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
            metrics: Metrics::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = figment::Figment::from(Serialized::defaults(Config::default()));
        let figment = match path {
            Some(path) => figment.merge(Yaml::file(path)),
            None => figment,
        };

        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// The DSN that clients of this fake upstream would use, if a public key is configured.
    pub fn dsn(&self) -> Option<String> {
        let key = self.public_key.as_deref()?;
        Some(format!("http://{key}@{}/42", self.http_addr))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config.http_addr.to_string(), "127.0.0.1:8000");
            assert_eq!(config.logging.level, LogLevel::Info);
            assert_eq!(config.max_body_size, 100 * 1024 * 1024);
            assert_eq!(config.logging.format, LogFormat::Auto);
            assert!(config.projects_dir.is_none());
            assert!(config.dsn().is_none());
            assert!(!config.sentry.is_enabled());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FAKE_SENTRY__HTTP_ADDR", "0.0.0.0:9000");
            jail.set_env("FAKE_SENTRY__PUBLIC_KEY", "31a5a894b4524f74a9a8d0e27e21ba91");
            jail.set_env("FAKE_SENTRY__PROJECTS_DIR", "/tmp/projects");
            jail.set_env("FAKE_SENTRY__LOGGING__LEVEL", "debug");
            jail.set_env("FAKE_SENTRY__LOGGING__FORMAT", "json");
            jail.set_env("FAKE_SENTRY__METRICS__TAGS__FOO", "bar");
            jail.set_env("FAKE_SENTRY__SENTRY__DSN", "abcde");
            jail.set_env("FAKE_SENTRY__SENTRY__SAMPLE_RATE", "0.5");
            jail.set_env("FAKE_SENTRY__MAX_OPEN_FILES", "4096");

            let config = Config::load(None).unwrap();

            assert_eq!(config.http_addr.port(), 9000);
            assert_eq!(
                config.dsn().as_deref(),
                Some("http://31a5a894b4524f74a9a8d0e27e21ba91@0.0.0.0:9000/42")
            );
            assert_eq!(config.projects_dir.as_deref(), Some(Path::new("/tmp/projects")));
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(LevelFilter::from(config.logging.level), LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.metrics.tags, [("foo".into(), "bar".into())].into());
            assert_eq!(config.sentry.dsn.unwrap().expose_secret().as_str(), "abcde");
            assert_eq!(config.sentry.sample_rate, 0.5);
            assert_eq!(config.max_open_files, 4096);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            http_addr: 127.0.0.1:8001
            projects_dir: config/projects
            logging:
                level: warn
                format: simplified
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("FAKE_SENTRY__HTTP_ADDR", "127.0.0.1:8002");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.http_addr.port(), 8002);
            assert_eq!(
                config.projects_dir.as_deref(),
                Some(Path::new("config/projects"))
            );
            assert_eq!(config.logging.level, LogLevel::Warn);
            assert_eq!(config.logging.format, LogFormat::Simplified);

            Ok(())
        });
    }

    #[test]
    fn invalid_logging() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FAKE_SENTRY__LOGGING__FORMAT", "xml");
            assert!(Config::load(None).is_err());

            jail.set_env("FAKE_SENTRY__LOGGING__FORMAT", "json");
            jail.set_env("FAKE_SENTRY__LOGGING__LEVEL", "verbose");
            assert!(Config::load(None).is_err());
            Ok(())
        });
    }
}
