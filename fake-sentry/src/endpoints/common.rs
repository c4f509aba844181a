//! Common types and utilities for API endpoints.

use std::error::Error;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use loadtest_types::envelope::EnvelopeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::projects::ProjectConfigError;

/// Error type for API operations.
///
/// Relays treat any failure of the upstream the same way, so all errors are reported as
/// `400 Bad Request`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Errors indicating malformed or illegal requests.
    #[error("client error: {0}")]
    Client(String),

    /// The request body is not the expected JSON.
    #[error("invalid JSON body")]
    Json(#[from] serde_json::Error),

    /// The request body is not a valid envelope.
    #[error("invalid envelope")]
    Envelope(#[from] EnvelopeError),

    /// The request body could not be decompressed.
    #[error("invalid compressed body")]
    Decompress(#[source] std::io::Error),

    /// A project config could not be loaded.
    #[error("project config unavailable")]
    ProjectConfig(#[from] ProjectConfigError),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    /// The main error message.
    #[serde(default)]
    pub detail: Option<String>,
    /// Chain of error causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ApiErrorResponse {
    /// Creates an error response from an error, extracting the full cause chain.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let causes = std::iter::successors(error.source(), |&cause| cause.source())
            .map(ToString::to_string)
            .collect();

        Self {
            detail: Some(error.to_string()),
            causes,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Bad requests are expected when pointing other clients at the fake upstream.
        match self {
            ApiError::ProjectConfig(_) => {
                tracing::error!(error = &self as &dyn Error, "error handling request")
            }
            _ => tracing::debug!(error = &self as &dyn Error, "rejected request"),
        }

        let body = ApiErrorResponse::from_error(&self);
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Parses a JSON request body.
///
/// Unlike the `Json` extractor, this does not check the content type and reports every failure as
/// an [`ApiError`].
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Response of ingestion endpoints.
#[derive(Debug, Serialize)]
pub struct EventIdResponse {
    /// Hex encoded event ID, without dashes.
    pub event_id: String,
}

impl EventIdResponse {
    /// Creates a response with a random event ID.
    pub fn random() -> Json<Self> {
        Json(Self {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
        })
    }
}
