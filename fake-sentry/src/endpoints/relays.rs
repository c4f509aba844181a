//! Relay registration and project configuration endpoints.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Json, Router, routing};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoints::common::{ApiError, ApiResult, parse_json};
use crate::state::ServiceState;

/// Header carrying the ID of the relay sending a request.
pub(crate) const RELAY_ID_HEADER: &str = "x-sentry-relay-id";

/// The only project config protocol version served.
const PROJECT_CONFIG_VERSION: &str = "2";

/// Token handed out in registration challenges. Never verified.
const CHALLENGE_TOKEN: &str = "123";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/register/challenge/", routing::post(register_challenge))
        .route("/register/response/", routing::post(register_response))
        .route("/projectconfigs/", routing::post(project_configs))
        .route("/publickeys/", routing::post(public_keys))
}

#[derive(Debug, Deserialize)]
struct ChallengeRequest {
    relay_id: String,
    public_key: String,
}

#[derive(Debug, Serialize)]
struct ChallengeResponse {
    token: &'static str,
    relay_id: String,
}

async fn register_challenge(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ChallengeResponse>> {
    let request: ChallengeRequest = parse_json(&body)?;
    state.register_relay(&request.relay_id, &request.public_key);
    check_relay_id(&headers, &request.relay_id)?;

    tracing::info!(relay_id = request.relay_id, "relay requested registration challenge");
    Ok(Json(ChallengeResponse {
        token: CHALLENGE_TOKEN,
        relay_id: request.relay_id,
    }))
}

#[derive(Debug, Deserialize, Serialize)]
struct RegisterResponse {
    relay_id: String,
}

async fn register_response(
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<RegisterResponse>> {
    let request: RegisterResponse = parse_json(&body)?;
    check_relay_id(&headers, &request.relay_id)?;

    tracing::info!(relay_id = request.relay_id, "relay registered");
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectConfigsRequest {
    #[serde(rename = "publicKeys")]
    public_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProjectConfigsResponse {
    configs: BTreeMap<String, Map<String, Value>>,
}

async fn project_configs(
    State(state): State<ServiceState>,
    Query(query): Query<VersionQuery>,
    body: Bytes,
) -> ApiResult<Json<ProjectConfigsResponse>> {
    if query.version.as_deref() != Some(PROJECT_CONFIG_VERSION) {
        return Err(ApiError::Client(format!(
            "unsupported project config version {:?}",
            query.version
        )));
    }

    let request: ProjectConfigsRequest = parse_json(&body)?;
    tracing::debug!(keys = ?request.public_keys, "project configs requested");

    let mut configs = BTreeMap::new();
    for public_key in request.public_keys {
        let config = state.projects.full_project_config(&public_key).await?;
        configs.insert(public_key, config);
    }

    merni::counter!("relays.project_configs": configs.len());
    Ok(Json(ProjectConfigsResponse { configs }))
}

#[derive(Debug, Deserialize)]
struct PublicKeysRequest {
    relay_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PublicKeysResponse {
    public_keys: BTreeMap<String, Option<String>>,
}

async fn public_keys(
    State(state): State<ServiceState>,
    body: Bytes,
) -> ApiResult<Json<PublicKeysResponse>> {
    let request: PublicKeysRequest = parse_json(&body)?;
    let public_keys = state.relay_public_keys(request.relay_ids.iter().map(String::as_str));
    Ok(Json(PublicKeysResponse { public_keys }))
}

fn check_relay_id(headers: &HeaderMap, relay_id: &str) -> ApiResult<()> {
    let header = headers.get(RELAY_ID_HEADER).and_then(|v| v.to_str().ok());
    if header != Some(relay_id) {
        return Err(ApiError::Client(format!(
            "{RELAY_ID_HEADER} header does not match relay {relay_id}"
        )));
    }
    Ok(())
}
