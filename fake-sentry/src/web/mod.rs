//! The HTTP server of the fake upstream.
//!
//! [`server()`] binds the configured address and runs until a termination signal arrives. Tests
//! use [`App`] directly to serve on a listener of their choice.

mod app;
mod middleware;
mod server;

pub use app::App;
pub use server::server;
