//! Release health session updates.

use std::time::{Duration, SystemTime};

use rand::{Rng, RngCore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::GeneratorError;
use crate::schema::{FieldSpec, Generator, Map, Schema};
use crate::util::{Release, release_generator, uuid_generator};

const SESSION_STATUSES: &[&str] = &["ok", "exited", "crashed", "abnormal", "errored"];

/// Settings for [`SessionGenerator`], as found in task configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// A fixed release or a list of releases to choose from.
    pub release: Option<Release>,
    /// Number of generated releases when no explicit `release` is set.
    pub num_releases: u32,
    /// Environments to choose from.
    pub environments: Vec<String>,
    /// Size of the device population, every session gets a new device when unset.
    pub max_users: Option<u32>,
    /// Sessions last up to this many whole seconds.
    pub max_duration_secs: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            release: None,
            num_releases: 10,
            environments: vec!["production".to_owned()],
            max_users: None,
            max_duration_secs: 600,
        }
    }
}

/// Generates session updates.
#[derive(Clone, Debug)]
pub struct SessionGenerator {
    base: Generator,
    max_duration_secs: u32,
}

impl SessionGenerator {
    /// Creates a generator from task settings.
    pub fn new(params: &SessionParams) -> Result<Self, GeneratorError> {
        let did = match params.max_users {
            Some(max_users) if max_users > 0 => FieldSpec::producer(move |rng: &mut dyn RngCore| {
                Value::from(format!("device{}", rng.random_range(0..max_users)))
            }),
            _ => uuid_generator(),
        };
        let environment = if params.environments.is_empty() {
            FieldSpec::null()
        } else {
            FieldSpec::one_of(params.environments.iter().cloned())
        };

        let base = Schema::new()
            .field("sid", uuid_generator())
            .field("did", did)
            .field("init", FieldSpec::one_of([true, false]))
            .field("status", FieldSpec::one_of(SESSION_STATUSES.iter().copied()))
            .field(
                "errors",
                FieldSpec::producer(|rng| Value::from(rng.random_range(0..3))),
            )
            .field(
                "attrs",
                Schema::new()
                    .field(
                        "release",
                        release_generator(params.release.as_ref(), params.num_releases)?,
                    )
                    .field("environment", environment),
            )
            .compile()?;

        Ok(Self {
            base,
            max_duration_secs: params.max_duration_secs,
        })
    }

    /// Generates a session update using the thread-local random source.
    pub fn generate(&self) -> Map {
        self.generate_with(&mut rand::rng())
    }

    /// Generates a session update using the given random source.
    pub fn generate_with(&self, rng: &mut dyn RngCore) -> Map {
        let mut session = self.base.generate_with(rng);

        let duration = match self.max_duration_secs {
            0 => 0.0,
            max => rng.random_range(0.0..f64::from(max)),
        };
        let now = SystemTime::now();
        let started = now
            .checked_sub(Duration::from_secs_f64(duration))
            .unwrap_or(now);

        session.insert(
            "started".to_owned(),
            json!(humantime::format_rfc3339_millis(started).to_string()),
        );
        session.insert(
            "timestamp".to_owned(),
            json!(humantime::format_rfc3339_millis(now).to_string()),
        );
        session.insert("duration".to_owned(), json!(duration));
        session
    }
}
