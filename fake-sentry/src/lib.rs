//! A fake Sentry upstream for load testing a relay.
//!
//! The server implements just enough of the upstream API for a relay to register, fetch project
//! configurations, and forward ingested data, which is accepted and discarded. It never rejects
//! well-formed data, so load test results reflect the relay alone.

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod healthcheck;
pub mod observability;
pub mod projects;
pub mod state;
pub mod web;
