//! An HTTP client sending data to the relay under test.

use std::time::Duration;

use async_compression::tokio::bufread::GzipEncoder;
use loadtest_types::envelope::{self, Envelope, EnvelopeError};
use loadtest_types::project::ProjectInfo;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::{Map, Value};
use tokio::io::AsyncReadExt;

/// Header carrying the project key.
const AUTH_HEADER: &str = "X-Sentry-Auth";

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// Timeout for a single request to the relay.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An error sending data to the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request failed or the relay responded with an error status.
    #[error("request to relay failed")]
    Request(#[from] reqwest::Error),
    /// The envelope could not be encoded.
    #[error("failed to encode envelope")]
    Envelope(#[from] EnvelopeError),
    /// The payload could not be serialized or compressed.
    #[error("failed to prepare payload")]
    Payload(#[source] std::io::Error),
}

/// Sends events, envelopes, and sessions to a relay.
#[derive(Clone, Debug)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    compress: bool,
}

impl RelayClient {
    /// Creates a client for the relay at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            compress: false,
        })
    }

    /// Compresses envelope bodies with gzip.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sends an event to the store endpoint.
    pub async fn send_message(
        &self,
        project: &ProjectInfo,
        event: &Map<String, Value>,
    ) -> Result<(), RelayError> {
        let body = serde_json::to_vec(event).map_err(|e| RelayError::Payload(e.into()))?;
        self.post(project, "store", JSON_CONTENT_TYPE, body).await
    }

    /// Sends an envelope to the envelope endpoint.
    pub async fn send_envelope(
        &self,
        project: &ProjectInfo,
        envelope: &Envelope,
    ) -> Result<(), RelayError> {
        let body = envelope.to_vec()?;
        self.post(project, "envelope", envelope::CONTENT_TYPE, body)
            .await
    }

    /// Sends serialized session data to the envelope endpoint as plain text.
    pub async fn send_session(&self, project: &ProjectInfo, data: Vec<u8>) -> Result<(), RelayError> {
        self.post(project, "envelope", TEXT_CONTENT_TYPE, data).await
    }

    async fn post(
        &self,
        project: &ProjectInfo,
        endpoint: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), RelayError> {
        let url = format!("{}/api/{}/{endpoint}/", self.base_url, project.id);

        let mut request = self
            .client
            .post(url)
            .header(AUTH_HEADER, project.auth_header())
            .header(CONTENT_TYPE, content_type);

        let body = if self.compress && endpoint == "envelope" {
            request = request.header(CONTENT_ENCODING, "gzip");
            gzip(&body).await?
        } else {
            body
        };

        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }
}

async fn gzip(data: &[u8]) -> Result<Vec<u8>, RelayError> {
    let mut encoder = GzipEncoder::new(data);
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .await
        .map_err(RelayError::Payload)?;
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use async_compression::tokio::bufread::GzipDecoder;

    use super::*;

    #[tokio::test]
    async fn gzip_round_trip() {
        let data = b"{}\n{\"type\":\"session\"}\n{}\n".repeat(10);
        let compressed = gzip(&data).await.unwrap();
        assert!(compressed.len() < data.len());

        let mut decoded = Vec::new();
        GzipDecoder::new(&compressed[..])
            .read_to_end(&mut decoded)
            .await
            .unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn base_url_without_trailing_slash() {
        let client = RelayClient::new("http://localhost:3000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:3000");
    }
}
