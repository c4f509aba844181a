//! Ready-made producers for common scalar fields.
//!
//! Every `*_generator` function returns a [`FieldSpec`] that can be placed directly into a
//! [`Schema`](crate::Schema). The underlying value functions are exposed as well so that composite
//! generators can draw from the same random source.

use std::num::NonZeroU32;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GeneratorError, check_positive};
use crate::schema::{FieldSpec, Map};

const ARTICLES: &[&str] = &["The", "A"];
const ARTICLES_BEFORE_VOWEL: &[&str] = &["The", "An"];

const PREDICATES: &[&str] = &[
    "eats",
    "talks with",
    "looks at",
    "annoys",
    "collects",
    "sprays",
    "disrespects",
    "embarrasses",
    "empathises with",
    "slaps",
    "plays with",
    "runs after",
    "swims after",
];

const SUBJECTS: &[&str] = &[
    "man", "dog", "child", "woman", "girl", "boy", "lion", "cat", "wombat", "llama", "alpaca",
    "vicuna", "guanaco", "leopard", "cougar", "wallaby", "bear", "skunk", "rabbit", "badger",
];

/// All subjects followed by a few inanimate objects.
const DIRECT_OBJECTS: &[&str] = &[
    "man",
    "dog",
    "child",
    "woman",
    "girl",
    "boy",
    "lion",
    "cat",
    "wombat",
    "llama",
    "alpaca",
    "vicuna",
    "guanaco",
    "leopard",
    "cougar",
    "wallaby",
    "bear",
    "skunk",
    "rabbit",
    "badger",
    "meal",
    "baby",
    "table",
    "glass",
    "chronometer",
    "parliament",
    "computer",
    "cellular phone",
    "toy",
    "tortilla",
    "laptop",
    "bottle",
    "fountain pen",
];

/// Segments used to build operation names such as `relay.project_cache.upstream`.
pub const OP_PARTS: &[&str] = &[
    "celery",
    "task",
    "redis",
    "feature",
    "flagr",
    "has",
    "nodestore",
    "set_subkeys",
    "sentry",
    "reprocessing2",
    "save_unprocessed_event",
    "get_unprocessed_event",
    "relay",
    "actors",
    "connector",
    "controller",
    "events",
    "healthcheck",
    "mod",
    "outcome",
    "project",
    "project_cache",
    "project_local",
    "project_redis",
    "project_upstream",
    "relay",
    "server",
    "store",
    "upstream",
];

/// Upper bound (exclusive) of generated measurement values.
const MAX_MEASUREMENT_VALUE: f64 = 10_000.0;

/// Returns a random 32 character lowercase hex identifier.
pub fn uuid_hex<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .simple()
        .to_string()
}

/// Returns a random 16 character lowercase hex identifier.
pub fn span_id_hex<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut id = uuid_hex(rng);
    id.truncate(16);
    id
}

/// Returns a random sentence such as `"The wombat collects a laptop."`.
pub fn sentence<R: Rng + ?Sized>(rng: &mut R) -> String {
    let subject = pick(SUBJECTS, rng);
    let direct_object = loop {
        let candidate = pick(DIRECT_OBJECTS, rng);
        if candidate != subject {
            break candidate;
        }
    };

    // Only a leading 'a' counts as a vowel here.
    let article1 = if subject.starts_with('a') {
        pick(ARTICLES_BEFORE_VOWEL, rng)
    } else {
        pick(ARTICLES, rng)
    };

    // The second article looks at the head of the word list rather than the chosen object.
    let article2 = if DIRECT_OBJECTS[0] == "a" {
        pick(ARTICLES_BEFORE_VOWEL, rng)
    } else {
        pick(ARTICLES, rng)
    }
    .to_lowercase();

    let predicate = pick(PREDICATES, rng);

    format!("{article1} {subject} {predicate} {article2} {direct_object}.")
}

/// Returns a dot separated path of one to four distinct [`OP_PARTS`].
pub fn op_path<R: Rng + ?Sized>(rng: &mut R) -> String {
    let num_segments = rng.random_range(1..5);
    let mut segments: Vec<&str> = Vec::with_capacity(num_segments);
    while segments.len() < num_segments {
        let segment = pick(OP_PARTS, rng);
        if !segments.contains(&segment) {
            segments.push(segment);
        }
    }
    segments.join(".")
}

/// Returns `num_segments` dot separated integers, each in `[0, max_version_segment)`.
pub fn version<R: Rng + ?Sized>(
    rng: &mut R,
    num_segments: usize,
    max_version_segment: NonZeroU32,
) -> String {
    (0..num_segments)
        .map(|_| rng.random_range(0..max_version_segment.get()).to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Returns a string of random length below `max_length` made of code points in `[0, 256)`.
pub fn string_databag<R: Rng + ?Sized>(rng: &mut R, max_length: usize) -> String {
    if max_length == 0 {
        return String::new();
    }
    let len = rng.random_range(0..max_length);
    (0..len).map(|_| char::from(rng.random::<u8>())).collect()
}

/// Returns one `{value}` entry per measurement name.
pub fn measurements<R: Rng + ?Sized>(rng: &mut R, names: &[String]) -> Map {
    names
        .iter()
        .map(|name| {
            let value = rng.random_range(0.0..MAX_MEASUREMENT_VALUE);
            (name.clone(), json!({ "value": value }))
        })
        .collect()
}

/// Returns the current time as fractional seconds since the UNIX epoch.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or_default()
}

/// Picks an element of a non-empty static word list.
pub(crate) fn pick<R: Rng + ?Sized>(list: &[&'static str], rng: &mut R) -> &'static str {
    list.choose(rng).copied().unwrap_or_default()
}

/// Producer for [`uuid_hex`].
pub fn uuid_generator() -> FieldSpec {
    FieldSpec::producer(|rng| Value::from(uuid_hex(rng)))
}

/// Producer for [`span_id_hex`].
pub fn span_id_generator() -> FieldSpec {
    FieldSpec::producer(|rng| Value::from(span_id_hex(rng)))
}

/// Producer for [`sentence`].
pub fn sentence_generator() -> FieldSpec {
    FieldSpec::producer(|rng| Value::from(sentence(rng)))
}

/// Producer for [`op_path`].
pub fn op_generator() -> FieldSpec {
    FieldSpec::producer(|rng| Value::from(op_path(rng)))
}

/// Producer for [`version`].
///
/// Returns [`GeneratorError::EmptyRange`] if `max_version_segment` is zero.
pub fn version_generator(
    num_segments: usize,
    max_version_segment: u32,
) -> Result<FieldSpec, GeneratorError> {
    let max = check_positive("max_version_segment", max_version_segment)?;
    Ok(FieldSpec::producer(move |rng| {
        Value::from(version(rng, num_segments, max))
    }))
}

/// Producer for [`string_databag`].
pub fn string_databag_generator(max_length: usize) -> FieldSpec {
    FieldSpec::producer(move |rng| Value::from(string_databag(rng, max_length)))
}

/// Producer for [`measurements`].
pub fn measurements_generator(names: Vec<String>) -> FieldSpec {
    FieldSpec::producer(move |rng| Value::Object(measurements(rng, &names)))
}

/// Producer for [`epoch_seconds`].
pub fn timestamp_generator() -> FieldSpec {
    FieldSpec::producer(|_| Value::from(epoch_seconds()))
}

/// The `release` setting of a generator.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Release {
    /// Always the same release.
    One(String),
    /// A release picked at random per payload.
    Many(Vec<String>),
}

/// Creates the release field.
///
/// Without an explicit release, payloads are spread over `release0` to `release{N-1}`, and
/// [`GeneratorError::EmptyRange`] is returned if `num_releases` is zero.
pub fn release_generator(
    release: Option<&Release>,
    num_releases: u32,
) -> Result<FieldSpec, GeneratorError> {
    let spec = match release {
        Some(Release::One(release)) => release.as_str().into(),
        Some(Release::Many(releases)) if !releases.is_empty() => {
            FieldSpec::one_of(releases.iter().cloned())
        }
        Some(Release::Many(_)) | None => {
            let num_releases = check_positive("num_releases", num_releases)?.get();
            FieldSpec::producer(move |rng: &mut dyn RngCore| {
                Value::from(format!("release{}", rng.random_range(0..num_releases)))
            })
        }
    };
    Ok(spec)
}

/// Returns `true` if every character of `id` is a lowercase hex digit.
#[cfg(test)]
pub(crate) fn is_lower_hex(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
