//! Project configurations served to relays.
//!
//! Relays request project configs by public key. The fake upstream answers every request with a
//! config read from the projects directory:
//!
//! 1. `<projects_dir>/<public_key>.json`, if it exists and contains valid JSON,
//! 2. `<projects_dir>/default.json`, if it exists,
//! 3. a built-in default config.
//!
//! The public key, project ID and timestamps of the returned config are always replaced. The
//! project ID is derived from the key with [`project_id_from_key`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use loadtest_types::project::project_id_from_key;
use serde_json::{Map, Value, json};

const DEFAULT_CONFIG_FILE: &str = "default.json";

/// Errors reading project configurations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectConfigError {
    /// The default config could not be read.
    #[error("failed to read {}", .path.display())]
    Io {
        /// The file that failed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The default config is not valid JSON.
    #[error("invalid project config in {}", .path.display())]
    InvalidJson {
        /// The file that failed.
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// The config is not a JSON object.
    #[error("project config in {} is not an object", .path.display())]
    NotAnObject {
        /// The file that failed.
        path: PathBuf,
    },
}

/// Loads and caches base project configurations.
///
/// Files are read once per public key. Restart the fake upstream to pick up changes.
#[derive(Debug)]
pub struct ProjectConfigs {
    dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Arc<Map<String, Value>>>>,
}

impl ProjectConfigs {
    /// Creates a loader for configs in the given directory.
    ///
    /// Without a directory, all projects receive the built-in default.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            cache: Mutex::default(),
        }
    }

    /// Returns the complete config for a project key.
    pub async fn full_project_config(
        &self,
        public_key: &str,
    ) -> Result<Map<String, Value>, ProjectConfigError> {
        let base = self.base_config(public_key).await?;
        Ok(complete_config(&base, public_key, SystemTime::now()))
    }

    async fn base_config(
        &self,
        public_key: &str,
    ) -> Result<Arc<Map<String, Value>>, ProjectConfigError> {
        if let Some(config) = self.cached(public_key) {
            return Ok(config);
        }

        let config = Arc::new(match &self.dir {
            Some(dir) => load_config(dir, public_key).await?,
            None => builtin_default(),
        });

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(public_key.to_owned(), config.clone());
        Ok(config)
    }

    fn cached(&self, public_key: &str) -> Option<Arc<Map<String, Value>>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(public_key).cloned()
    }
}

async fn load_config(dir: &Path, public_key: &str) -> Result<Map<String, Value>, ProjectConfigError> {
    // Keys are chosen by the client and must not escape the directory.
    let is_plain_key = !public_key.is_empty()
        && public_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if is_plain_key {
        let path = dir.join(format!("{public_key}.json"));
        match read_config(&path).await {
            Ok(Some(config)) => return Ok(config),
            Ok(None) => (),
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "ignoring project config, using default"
                );
            }
        }
    }

    let path = dir.join(DEFAULT_CONFIG_FILE);
    Ok(read_config(&path).await?.unwrap_or_else(builtin_default))
}

/// Reads a config file, returning `None` if it does not exist.
async fn read_config(path: &Path) -> Result<Option<Map<String, Value>>, ProjectConfigError> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProjectConfigError::Io {
                path: path.to_owned(),
                source,
            });
        }
    };

    let value = serde_json::from_slice(&contents).map_err(|source| {
        ProjectConfigError::InvalidJson {
            path: path.to_owned(),
            source,
        }
    })?;

    match value {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(ProjectConfigError::NotAnObject {
            path: path.to_owned(),
        }),
    }
}

/// Overrides identifying fields of a base config for the given project key.
fn complete_config(
    base: &Map<String, Value>,
    public_key: &str,
    now: SystemTime,
) -> Map<String, Value> {
    let project_id = project_id_from_key(public_key);
    let now = humantime::format_rfc3339_micros(now).to_string();

    let mut key_config = base
        .get("publicKeys")
        .and_then(|keys| keys.get(0))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    key_config.insert("publicKey".to_owned(), public_key.into());
    key_config.insert("numericId".to_owned(), project_id.into());

    let mut config = base.clone();
    config.insert("publicKeys".to_owned(), json!([key_config]));
    config.insert("projectId".to_owned(), project_id.into());
    config.insert("lastFetch".to_owned(), now.clone().into());
    config.insert("lastChange".to_owned(), now.into());
    config
}

fn builtin_default() -> Map<String, Value> {
    let config = json!({
        "disabled": false,
        "slug": "fake-project",
        "organizationId": 1,
        "rev": "fake-rev",
        "publicKeys": [{"isEnabled": true}],
        "config": {
            "allowedDomains": ["*"],
            "trustedRelays": [],
            "piiConfig": null,
            "datascrubbingSettings": {
                "excludeFields": [],
                "scrubData": false,
                "scrubIpAddresses": false,
                "sensitiveFields": [],
                "scrubDefaults": false,
            },
            "features": [],
        },
    });

    match config {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn overrides_identity() {
        let base = json!({
            "slug": "python",
            "projectId": 1,
            "publicKeys": [{"publicKey": "old", "numericId": 1, "isEnabled": true}],
        });
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);

        let config = complete_config(base.as_object().unwrap(), "abc42", now);
        assert_eq!(config["slug"], "python");
        assert_eq!(config["projectId"], 42);
        assert_eq!(
            config["publicKeys"],
            json!([{"publicKey": "abc42", "numericId": 42, "isEnabled": true}])
        );
        assert_eq!(config["lastFetch"], "2020-09-13T12:26:40.000000Z");
        assert_eq!(config["lastChange"], config["lastFetch"]);
    }

    #[test]
    fn missing_public_keys() {
        let config = complete_config(&Map::new(), "key", SystemTime::now());
        assert_eq!(
            config["publicKeys"],
            json!([{"publicKey": "key", "numericId": 0}])
        );
    }

    #[tokio::test]
    async fn builtin_without_directory() {
        let projects = ProjectConfigs::new(None);
        let config = projects.full_project_config("aaaa7").await.unwrap();
        assert_eq!(config["projectId"], 7);
        assert_eq!(config["config"]["allowedDomains"], json!(["*"]));
    }

    #[tokio::test]
    async fn files_and_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let projects = ProjectConfigs::new(Some(dir.path().to_owned()));

        // Without any files, the built-in default is used.
        let config = projects.full_project_config("nofiles1").await.unwrap();
        assert_eq!(config["slug"], "fake-project");

        std::fs::write(dir.path().join("default.json"), r#"{"slug": "default"}"#).unwrap();
        std::fs::write(dir.path().join("special2.json"), r#"{"slug": "special"}"#).unwrap();
        std::fs::write(dir.path().join("broken3.json"), "{").unwrap();

        let config = projects.full_project_config("special2").await.unwrap();
        assert_eq!(config["slug"], "special");
        assert_eq!(config["projectId"], 2);

        let config = projects.full_project_config("other4").await.unwrap();
        assert_eq!(config["slug"], "default");

        let config = projects.full_project_config("broken3").await.unwrap();
        assert_eq!(config["slug"], "default");

        // Keys that look like paths never read outside of the directory.
        let config = projects.full_project_config("../special2").await.unwrap();
        assert_eq!(config["slug"], "default");

        // Configs are cached per key.
        std::fs::write(dir.path().join("special2.json"), r#"{"slug": "changed"}"#).unwrap();
        let config = projects.full_project_config("special2").await.unwrap();
        assert_eq!(config["slug"], "special");
    }

    #[tokio::test]
    async fn broken_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("default.json"), "[]").unwrap();

        let projects = ProjectConfigs::new(Some(dir.path().to_owned()));
        assert!(matches!(
            projects.full_project_config("key").await,
            Err(ProjectConfigError::NotAnObject { .. })
        ));
    }
}
