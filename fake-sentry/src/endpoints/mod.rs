//! HTTP endpoints of the fake upstream.
//!
//! Relay-facing endpoints live under `/api/0/relays`, ingestion endpoints under
//! `/api/<project_id>`. Everything else is answered by a catch-all page.

use axum::Router;

use crate::state::ServiceState;

pub mod common;
pub mod health;
mod ingest;
mod pages;
mod relays;

pub(crate) use relays::RELAY_ID_HEADER;

/// Creates the router with all endpoints.
pub fn routes() -> Router<ServiceState> {
    let api = Router::new()
        .nest("/0/relays", relays::router())
        .merge(ingest::router());

    Router::new()
        .nest("/api", api)
        .merge(health::router())
        .merge(pages::router())
}
