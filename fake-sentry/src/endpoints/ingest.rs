//! Ingestion endpoints receiving data forwarded by relays.

use async_compression::tokio::bufread::GzipDecoder;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::{Json, Router, routing};
use bytes::Bytes;
use loadtest_types::envelope::{self, Envelope};
use tokio::io::AsyncReadExt;

use crate::endpoints::common::{ApiError, ApiResult, EventIdResponse};
use crate::state::ServiceState;

/// Item type of metric bucket batches.
const METRIC_BUCKETS: &str = "metric_buckets";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/{project_id}/store/", routing::get(store).post(store))
        .route("/{project_id}/envelope/", routing::post(store_envelope))
}

async fn store(Path(project_id): Path<String>, body: Bytes) -> Json<EventIdResponse> {
    tracing::debug!(project_id, size = body.len(), "received store request");
    merni::counter!("ingest.store": 1);
    EventIdResponse::random()
}

async fn store_envelope(
    State(state): State<ServiceState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<EventIdResponse>> {
    tracing::debug!(project_id, size = body.len(), "received envelope request");

    if header_value(&headers, header::CONTENT_ENCODING) != Some("gzip") {
        return Err(ApiError::Client(
            "relay should always compress envelope requests".into(),
        ));
    }

    let content_type = header_value(&headers, header::CONTENT_TYPE)
        .and_then(|v| v.split(';').next())
        .map(str::trim);
    if content_type != Some(envelope::CONTENT_TYPE) {
        return Err(ApiError::Client(format!(
            "relay sent non-envelope data: {content_type:?}"
        )));
    }

    let data = decompress(&body).await?;
    let envelope = Envelope::parse(&data)?;
    let buckets = count_metric_buckets(&envelope)?;

    merni::counter!("ingest.envelope": 1);
    for item in &envelope.items {
        merni::counter!("ingest.envelope.items": 1, "type" => item.ty().unwrap_or("unknown"));
    }

    if buckets > 0 {
        let total = state.add_metric_buckets(buckets);
        tracing::debug!(buckets, total, "collected metric buckets");
    }

    Ok(EventIdResponse::random())
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn decompress(body: &[u8]) -> ApiResult<Vec<u8>> {
    let mut decoder = GzipDecoder::new(body);
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .await
        .map_err(ApiError::Decompress)?;
    Ok(data)
}

/// Counts the buckets in all `metric_buckets` items of an envelope.
fn count_metric_buckets(envelope: &Envelope) -> ApiResult<u64> {
    let mut count = 0;
    for item in &envelope.items {
        if item.ty() != Some(METRIC_BUCKETS) {
            continue;
        }

        match item.payload_json()? {
            serde_json::Value::Array(buckets) => count += buckets.len() as u64,
            _ => {
                return Err(ApiError::Client(
                    "metric buckets must be a JSON array".into(),
                ));
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use loadtest_types::envelope::{Headers, Item};
    use serde_json::json;

    use super::*;

    #[test]
    fn counts_buckets_of_all_items() {
        let mut envelope = Envelope::new(Headers::new());
        envelope.add_item(Item::json(METRIC_BUCKETS, &json!([{}, {}])).unwrap());
        envelope.add_item(Item::json("event", &json!({"a": [1, 2, 3]})).unwrap());
        envelope.add_item(Item::json(METRIC_BUCKETS, &json!([{}])).unwrap());

        assert_eq!(count_metric_buckets(&envelope).unwrap(), 3);
    }

    #[test]
    fn buckets_must_be_arrays() {
        let mut envelope = Envelope::new(Headers::new());
        envelope.add_item(Item::json(METRIC_BUCKETS, &json!({})).unwrap());
        assert!(matches!(
            count_metric_buckets(&envelope),
            Err(ApiError::Client(_))
        ));
    }
}
