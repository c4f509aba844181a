use std::any::Any;
use std::net::SocketAddr;

use axum::RequestExt;
use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::time::Instant;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::endpoints::RELAY_ID_HEADER;

/// Route reported for requests that did not match any route.
const UNMATCHED_ROUTE: &str = "fallback";

/// Sets the `Server` header on all responses.
pub fn server_header() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(
        header::SERVER,
        HeaderValue::from_static(concat!("fake-sentry/", env!("CARGO_PKG_VERSION"))),
    )
}

/// Creates the tracing span of a request.
///
/// Requests from relays carry the relay ID, which is recorded next to the client address.
pub fn request_span(request: &Request) -> tracing::Span {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let relay_id = request
        .headers()
        .get(RELAY_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    tracing::debug_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        client_addr = client_addr.map(tracing::field::display),
        relay_id,
    )
}

/// Logs a panic in a handler and answers with `500`.
///
/// Use with [`CatchPanicLayer`](tower_http::catch_panic::CatchPanicLayer).
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast_ref::<&str>() {
            Some(message) => (*message).to_owned(),
            None => "no error details".to_owned(),
        },
    };

    tracing::error!("panic in web handler: {detail}");
    (StatusCode::INTERNAL_SERVER_ERROR, detail).into_response()
}

/// Reports the count, duration and body size of requests per route.
///
/// Use with [`from_fn`](axum::middleware::from_fn).
pub async fn request_metrics(mut request: Request, next: Next) -> Response {
    let route = match request.extract_parts::<MatchedPath>().await {
        Ok(path) => path.as_str().to_owned(),
        Err(_) => UNMATCHED_ROUTE.to_owned(),
    };

    let body_size = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    let mut metrics = RequestMetrics::start(route, request.method().clone());
    if let Some(size) = body_size {
        merni::distribution!("server.requests.body_size"@b: size, "route" => metrics.route.as_str());
    }

    let response = next.run(request).await;
    metrics.status = Some(response.status());
    response
}

/// Reports the duration of a request when dropped.
///
/// Without a status, the client went away before the response and `499` is reported.
struct RequestMetrics {
    route: String,
    method: Method,
    start: Instant,
    status: Option<StatusCode>,
}

impl RequestMetrics {
    fn start(route: String, method: Method) -> Self {
        merni::counter!("server.requests": 1, "route" => route.as_str(), "method" => method.as_str());

        Self {
            route,
            method,
            start: Instant::now(),
            status: None,
        }
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        merni::distribution!(
            "server.requests.duration"@s: self.start.elapsed(),
            "route" => self.route.as_str(),
            "method" => self.method.as_str(),
            "status" => self.status.map_or(499, |status| status.as_u16())
        );
    }
}
