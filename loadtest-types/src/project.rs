//! Projects that load is sent to.
//!
//! Load tests either run against real projects listed in the configuration, or against fake
//! projects whose public key encodes the project ID. Fake keys are 32 characters long and end with
//! the decimal project ID, left padded with `a`:
//!
//! ```
//! use loadtest_types::project::{fake_project_key, project_id_from_key};
//!
//! let key = fake_project_key(123);
//! assert_eq!(key, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaa123");
//! assert_eq!(project_id_from_key(&key), 123);
//! ```

use serde::{Deserialize, Serialize};

/// Length of project public keys.
pub const PROJECT_KEY_LEN: usize = 32;

/// The protocol version sent in authentication headers.
pub const PROTOCOL_VERSION: u32 = 7;

/// Identifies a project and the public key used to submit data to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Numeric project ID, part of the ingestion URL.
    pub id: u64,
    /// Public key used for authentication.
    pub key: String,
}

impl ProjectInfo {
    /// Creates a fake project with a key derived from its ID.
    pub fn fake(id: u64) -> Self {
        Self {
            id,
            key: fake_project_key(id),
        }
    }

    /// Returns the value of the `X-Sentry-Auth` header for this project.
    pub fn auth_header(&self) -> String {
        auth_header(&self.key)
    }
}

/// Creates a fake project key for the given project ID.
pub fn fake_project_key(id: u64) -> String {
    let mut id = id.to_string();
    id.truncate(PROJECT_KEY_LEN);
    format!("{id:a>width$}", width = PROJECT_KEY_LEN)
}

/// Recovers the project ID from a fake project key.
///
/// The ID is the longest run of trailing digits. Keys without trailing digits map to `0`.
pub fn project_id_from_key(key: &str) -> u64 {
    let prefix = key.trim_end_matches(|c: char| c.is_ascii_digit());
    key[prefix.len()..].parse().unwrap_or(0)
}

/// Returns the value of the `X-Sentry-Auth` header for a project key.
pub fn auth_header(key: &str) -> String {
    format!("Sentry sentry_key={key},sentry_version={PROTOCOL_VERSION}")
}
