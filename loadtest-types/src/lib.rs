//! Types shared between the load runner and the fake upstream.
//!
//! - [`envelope`] encodes and decodes the envelope wire format.
//! - [`project`] identifies the projects traffic is sent to.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod envelope;
pub mod project;
