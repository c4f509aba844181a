//! Envelope headers carrying the dynamic sampling context of a trace.

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{FieldSpec, Schema};
use crate::util::uuid_generator;

/// Settings for the `trace` envelope header.
///
/// Unset values are omitted from the header, except for the trace ID, which is randomized per
/// envelope when unset.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraceHeaderParams {
    /// Release of the trace root.
    #[serde(rename = "trace_release")]
    pub release: Option<String>,
    /// ID of the user that started the trace.
    #[serde(rename = "trace_user_id")]
    pub user_id: Option<String>,
    /// Segment of the user that started the trace.
    #[serde(rename = "trace_user_segment")]
    pub user_segment: Option<String>,
    /// Environment of the trace root.
    #[serde(rename = "trace_environment")]
    pub environment: Option<String>,
    /// Public key of the project that started the trace.
    pub public_key: Option<String>,
    /// Fixed trace ID.
    pub trace_id: Option<String>,
}

/// Creates the `trace` header schema.
pub fn trace_generator(params: &TraceHeaderParams) -> Schema {
    let user = if params.user_id.is_some() || params.user_segment.is_some() {
        FieldSpec::from(
            Schema::new()
                .field("segment", params.user_segment.clone())
                .field("id", params.user_id.clone()),
        )
    } else {
        FieldSpec::null()
    };

    let trace_id = match &params.trace_id {
        Some(trace_id) => FieldSpec::from(trace_id.as_str()),
        None => uuid_generator(),
    };

    Schema::new()
        .field("release", params.release.clone())
        .field("user", user)
        .field("environment", params.environment.clone())
        .field("trace_id", trace_id)
        .field("public_key", params.public_key.clone())
}

/// Creates the envelope header schema, `{event_id, trace}`.
pub fn envelope_header_generator(event_id: Option<String>, params: &TraceHeaderParams) -> Schema {
    Schema::new()
        .field("event_id", event_id.map(Value::from))
        .field("trace", trace_generator(params))
}
