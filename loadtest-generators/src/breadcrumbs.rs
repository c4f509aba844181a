//! Breadcrumb trails attached to error events.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{GeneratorError, check_range};
use crate::schema::FieldSpec;
use crate::util::epoch_seconds;

const DEFAULT_MAX_BREADCRUMBS: usize = 50;

const DEFAULT_CATEGORIES: &[&str] = &["auth", "web-request", "query"];
const DEFAULT_LEVELS: &[&str] = &["fatal", "error", "warning", "info", "debug"];
const DEFAULT_TYPES: &[&str] = &["default", "http", "error"];
const DEFAULT_MESSAGES: &[&str] = &[
    "sending message via: UDP(10.8.0.10:53)",
    "GET http://localhost/xx/xxxx/xxxxxxxxxxxxxx [200]",
    "Authenticating the user",
    "IOError: [Errno 2] No such file or directory: '/tmp/someFile/'",
];

/// Settings for [`breadcrumb_generator`].
///
/// Unset or empty pools fall back to built-in defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BreadcrumbParams {
    /// Minimum number of breadcrumbs, defaults to `0`.
    pub min: Option<usize>,
    /// Maximum number of breadcrumbs (inclusive), defaults to `50`.
    pub max: Option<usize>,
    /// Pool of breadcrumb categories.
    pub categories: Option<Vec<String>>,
    /// Pool of breadcrumb levels.
    pub levels: Option<Vec<String>>,
    /// Pool of breadcrumb types.
    pub types: Option<Vec<String>>,
    /// Pool of breadcrumb messages.
    pub messages: Option<Vec<String>>,
}

fn pool(configured: Option<Vec<String>>, defaults: &[&str]) -> Vec<String> {
    match configured {
        Some(pool) if !pool.is_empty() => pool,
        _ => defaults.iter().map(|s| (*s).to_owned()).collect(),
    }
}

fn choose<R: Rng + ?Sized>(pool: &[String], rng: &mut R) -> String {
    pool.choose(rng).cloned().unwrap_or_default()
}

/// Creates a producer for a list of breadcrumbs.
///
/// Every invocation yields between `min` and `max` (inclusive) breadcrumbs, each timestamped with
/// the current time.
pub fn breadcrumb_generator(params: BreadcrumbParams) -> Result<FieldSpec, GeneratorError> {
    let min = params.min.unwrap_or(0);
    let max = params.max.unwrap_or(DEFAULT_MAX_BREADCRUMBS);
    check_range("breadcrumbs", min, max)?;

    let categories = pool(params.categories, DEFAULT_CATEGORIES);
    let levels = pool(params.levels, DEFAULT_LEVELS);
    let types = pool(params.types, DEFAULT_TYPES);
    let messages = pool(params.messages, DEFAULT_MESSAGES);

    Ok(FieldSpec::producer(move |rng| {
        let num_crumbs = rng.random_range(min..=max);
        let crumbs = (0..num_crumbs)
            .map(|_| {
                json!({
                    "category": choose(&categories, rng),
                    "timestamp": epoch_seconds(),
                    "level": choose(&levels, rng),
                    "type": choose(&types, rng),
                    "message": choose(&messages, rng),
                })
            })
            .collect();
        Value::Array(crumbs)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;

    #[test]
    fn default_breadcrumbs() {
        let generator = Schema::new()
            .field("crumbs", breadcrumb_generator(Default::default()).unwrap())
            .compile()
            .unwrap();

        for _ in 0..50 {
            let value = generator.generate();
            let crumbs = value["crumbs"].as_array().unwrap();
            assert!(crumbs.len() <= DEFAULT_MAX_BREADCRUMBS);
            for crumb in crumbs {
                assert!(DEFAULT_CATEGORIES.contains(&crumb["category"].as_str().unwrap()));
                assert!(DEFAULT_LEVELS.contains(&crumb["level"].as_str().unwrap()));
                assert!(DEFAULT_TYPES.contains(&crumb["type"].as_str().unwrap()));
                assert!(DEFAULT_MESSAGES.contains(&crumb["message"].as_str().unwrap()));
                assert!(crumb["timestamp"].as_f64().unwrap() > 0.0);
            }
        }
    }

    #[test]
    fn configured_breadcrumbs() {
        let params = BreadcrumbParams {
            min: Some(2),
            max: Some(2),
            categories: Some(vec!["navigation".into()]),
            levels: Some(vec![]),
            ..Default::default()
        };
        let generator = Schema::new()
            .field("crumbs", breadcrumb_generator(params).unwrap())
            .compile()
            .unwrap();

        let value = generator.generate();
        let crumbs = value["crumbs"].as_array().unwrap();
        assert_eq!(crumbs.len(), 2);
        assert!(crumbs.iter().all(|c| c["category"] == "navigation"));
        // empty pools use the defaults
        assert!(crumbs
            .iter()
            .all(|c| DEFAULT_LEVELS.contains(&c["level"].as_str().unwrap())));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let params = BreadcrumbParams {
            min: Some(10),
            max: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            breadcrumb_generator(params),
            Err(GeneratorError::InvalidRange { name: "breadcrumbs", .. })
        ));
    }
}
