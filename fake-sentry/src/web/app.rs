use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::ServiceExt;
use axum::extract::{DefaultBodyLimit, Request};
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::metrics::InFlightRequestsLayer;
use tower_http::metrics::in_flight_requests::InFlightRequestsCounter;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::endpoints;
use crate::state::ServiceState;
use crate::web::middleware;

/// Interval of the in-flight request and ingestion gauges.
const GAUGE_INTERVAL: Duration = Duration::from_secs(1);

/// The routes and middleware of the fake upstream.
#[derive(Debug)]
pub struct App {
    router: axum::Router,
    state: ServiceState,
    in_flight: InFlightRequestsCounter,
}

impl App {
    /// Creates the application for the given state.
    pub fn new(state: ServiceState) -> Self {
        let (in_flight_layer, in_flight) = InFlightRequestsLayer::pair();

        // Outermost first. Metrics and panics cover the entire request, tracing only the handler.
        let layers = ServiceBuilder::new()
            .layer(axum::middleware::from_fn(middleware::request_metrics))
            .layer(in_flight_layer)
            .layer(CatchPanicLayer::custom(middleware::panic_response))
            .layer(middleware::server_header())
            .layer(NewSentryLayer::new_from_top())
            .layer(SentryHttpLayer::new().enable_transaction())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(middleware::request_span)
                    .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
            )
            .layer(DefaultBodyLimit::max(state.config.max_body_size));

        let router = endpoints::routes()
            .layer(layers)
            .with_state(state.clone());

        Self {
            router,
            state,
            in_flight,
        }
    }

    /// Serves requests on the listener until `shutdown` resolves.
    ///
    /// Open connections are drained before this returns.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            router,
            state,
            in_flight,
        } = self;

        let service =
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(router);
        let server = async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(shutdown)
                .await
        };

        let gauges = in_flight.run_emitter(GAUGE_INTERVAL, move |count| {
            let buckets = state.metric_buckets();
            async move {
                merni::gauge!("server.requests.in_flight": count);
                merni::gauge!("envelopes.metric_buckets.total": buckets);
            }
        });

        // The emitter runs forever.
        tokio::select! {
            result = server => result?,
            _ = gauges => (),
        }

        Ok(())
    }
}
