//! A load generator for relays.
//!
//! The runner simulates users that repeatedly execute [tasks](tasks) against a relay. Each user
//! belongs to a [class](users::UserClass) that determines which tasks it runs, which projects it
//! sends to and how long it waits between two tasks. Tasks generate random events, transactions
//! and sessions with [`loadtest_generators`], or send canned payloads read from files.
//!
//! After the configured duration, [`run`] returns a [`Report`] with latency percentiles and
//! failure counts per task.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod relay;
pub mod run;
pub mod tasks;
pub mod users;
pub mod wait;

pub use crate::config::Config;
pub use crate::run::{Report, run};
