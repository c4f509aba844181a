//! JavaScript exceptions with stack traces sampled from a pool of real frames.

use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::{Value, json};

use crate::error::{GeneratorError, check_range};
use crate::schema::FieldSpec;

/// Default upper bound of frames per stack trace.
pub const DEFAULT_MAX_FRAMES: usize = 50;

/// Creates a producer for an `exception` interface with a single `Error`.
///
/// Each stack trace holds between `min_frames` and `max_frames` (inclusive) frames drawn with
/// replacement from `frames`. An empty pool yields empty stack traces.
pub fn javascript_exception_generator(
    frames: Arc<[Value]>,
    min_frames: usize,
    max_frames: usize,
) -> Result<FieldSpec, GeneratorError> {
    check_range("frames", min_frames, max_frames)?;

    Ok(FieldSpec::producer(move |rng| {
        let num_frames = if frames.is_empty() {
            0
        } else {
            rng.random_range(min_frames..=max_frames)
        };
        let stacktrace: Vec<Value> = (0..num_frames)
            .filter_map(|_| frames.choose(rng).cloned())
            .collect();

        json!({
            "values": [{
                "type": "Error",
                "stacktrace": { "frames": stacktrace },
            }]
        })
    }))
}
