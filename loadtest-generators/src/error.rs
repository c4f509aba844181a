use std::num::NonZeroU32;

use thiserror::Error;

/// Errors raised while compiling a [`Schema`](crate::Schema).
///
/// Both variants carry the dotted path of the offending field, for example `contexts.os.name`.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// A set of alternatives has no entries to choose from.
    #[error("field `{path}` has an empty set of alternatives")]
    EmptyChoiceSet {
        /// Dotted path of the field.
        path: String,
    },

    /// A field specification read from configuration could not be interpreted.
    #[error("field `{path}` is malformed: {reason}")]
    MalformedSpec {
        /// Dotted path of the field.
        path: String,
        /// Human readable description of the problem.
        reason: String,
    },
}

/// Errors raised when setting up or running payload generators.
#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    /// A `min..=max` argument pair where `min` exceeds `max`.
    #[error("invalid {name} range: min {min} is greater than max {max}")]
    InvalidRange {
        /// What the range counts, e.g. `spans`.
        name: &'static str,
        /// The lower bound.
        min: usize,
        /// The upper bound.
        max: usize,
    },

    /// A count that values are drawn below is zero, leaving nothing to draw from.
    #[error("{name} must be at least 1")]
    EmptyRange {
        /// The setting, e.g. `num_releases`.
        name: &'static str,
    },

    /// The underlying schema failed to compile.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Checks that `min <= max`, returning [`GeneratorError::InvalidRange`] otherwise.
pub(crate) fn check_range(name: &'static str, min: usize, max: usize) -> Result<(), GeneratorError> {
    if min > max {
        return Err(GeneratorError::InvalidRange { name, min, max });
    }
    Ok(())
}

/// Checks that an exclusive upper bound leaves at least one value to draw.
pub(crate) fn check_positive(name: &'static str, value: u32) -> Result<NonZeroU32, GeneratorError> {
    NonZeroU32::new(value).ok_or(GeneratorError::EmptyRange { name })
}
