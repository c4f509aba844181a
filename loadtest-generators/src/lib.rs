//! Randomized payload generators for load testing an event ingestion relay.
//!
//! The heart of this crate is the [`Schema`]: a declarative description of a JSON object whose
//! fields are literals, sets of alternatives, nested schemas, or producer functions. A schema is
//! compiled once into a [`Generator`] which is then invoked for every simulated request, yielding
//! a fresh payload with independent random choices each time.
//!
//! On top of the schema engine, this crate provides generators for the payloads a relay ingests:
//!
//! - [`EventGenerator`] for error events with breadcrumbs, contexts, and stack traces,
//! - [`TransactionGenerator`] for transactions with span trees built by [`create_spans`],
//! - [`SessionGenerator`] for release health sessions,
//! - [`envelope_header_generator`](trace::envelope_header_generator) for envelope headers.
//!
//! All generators are `Send + Sync` and draw from the thread-local random source by default.
//! Every generator also accepts an explicit random source for reproducible output.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod breadcrumbs;
mod config;
pub mod contexts;
mod error;
pub mod event;
pub mod javascript;
mod schema;
pub mod session;
pub mod spans;
pub mod trace;
pub mod transaction;
pub mod util;

pub use error::{GeneratorError, SchemaError};
pub use event::{EventGenerator, EventParams};
pub use schema::{FieldSpec, Generator, Map, Producer, Schema};
pub use session::{SessionGenerator, SessionParams};
pub use spans::{Span, SpanTreeParams, create_spans};
pub use transaction::{TransactionGenerator, TransactionParams};
