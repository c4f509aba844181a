//! Test utilities for the load testing harness.
//!
//! This crate runs the fake upstream in-process, so that integration tests of the fake upstream
//! and of the load runner can talk to a real HTTP server. See the modules for all available
//! utilities.

pub mod server;
pub mod tracing;
