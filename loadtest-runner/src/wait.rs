//! Pauses of simulated users between tasks.
//!
//! Wait times are written as expressions in the configuration, with all durations in seconds:
//!
//! - `constant(x)` waits `x` seconds after every task.
//! - `between(a, b)` waits a uniformly random duration between `a` and `b` seconds.
//! - `constant_pacing(x)` starts a task every `x` seconds. If a task takes longer than `x`, the
//!   next task starts immediately.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// An error parsing a wait time expression.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid wait time `{expr}`: {reason}")]
pub struct WaitTimeError {
    expr: String,
    reason: &'static str,
}

/// How long a simulated user waits between two tasks.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum WaitTime {
    /// A fixed pause after every task.
    Constant(Duration),
    /// A random pause within an inclusive range.
    Between(Duration, Duration),
    /// A fixed interval between task starts.
    ConstantPacing(Duration),
}

impl WaitTime {
    /// Returns the pause after a task that took `elapsed`.
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R, elapsed: Duration) -> Duration {
        match *self {
            WaitTime::Constant(wait) => wait,
            WaitTime::Between(min, max) => {
                Duration::from_secs_f64(rng.random_range(min.as_secs_f64()..=max.as_secs_f64()))
            }
            WaitTime::ConstantPacing(interval) => interval.saturating_sub(elapsed),
        }
    }
}

impl Default for WaitTime {
    fn default() -> Self {
        WaitTime::Constant(Duration::ZERO)
    }
}

impl FromStr for WaitTime {
    type Err = WaitTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason| WaitTimeError {
            expr: s.to_owned(),
            reason,
        };

        let (name, args) = s
            .trim()
            .strip_suffix(')')
            .and_then(|call| call.split_once('('))
            .ok_or_else(|| error("expected a call like `constant(1)`"))?;

        let args = args
            .split(',')
            .map(|arg| parse_seconds(arg.trim()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| error("arguments must be non-negative numbers of seconds"))?;

        match (name.trim(), args.as_slice()) {
            ("constant", [wait]) => Ok(WaitTime::Constant(*wait)),
            ("constant_pacing", [interval]) => Ok(WaitTime::ConstantPacing(*interval)),
            ("between", [min, max]) if min <= max => Ok(WaitTime::Between(*min, *max)),
            ("between", [_, _]) => Err(error("the lower bound exceeds the upper bound")),
            ("constant" | "constant_pacing" | "between", _) => {
                Err(error("wrong number of arguments"))
            }
            _ => Err(error(
                "expected one of `constant`, `between`, `constant_pacing`",
            )),
        }
    }
}

impl TryFrom<String> for WaitTime {
    type Error = WaitTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for WaitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitTime::Constant(wait) => write!(f, "constant({})", wait.as_secs_f64()),
            WaitTime::Between(min, max) => {
                write!(f, "between({}, {})", min.as_secs_f64(), max.as_secs_f64())
            }
            WaitTime::ConstantPacing(interval) => {
                write!(f, "constant_pacing({})", interval.as_secs_f64())
            }
        }
    }
}

fn parse_seconds(arg: &str) -> Option<Duration> {
    let seconds = arg.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}
