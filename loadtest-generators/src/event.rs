//! Randomized error events.

use std::sync::Arc;

use rand::{Rng, RngCore};
use serde::Deserialize;
use serde_json::Value;

use crate::breadcrumbs::{BreadcrumbParams, breadcrumb_generator};
use crate::contexts::{
    app_context_generator, device_context_generator, os_context_generator,
    trace_context_generator, user_interface_generator,
};
use crate::error::{GeneratorError, check_positive};
use crate::javascript::javascript_exception_generator;
use crate::schema::{FieldSpec, Generator, Map, Schema};
use crate::util::{
    Release, release_generator, sentence_generator, timestamp_generator, uuid_generator, uuid_hex,
};

/// Settings for [`EventGenerator`], as found in task configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EventParams {
    /// Whether events carry an `event_id`.
    pub with_event_id: bool,
    /// Whether events carry a `level`.
    pub with_level: bool,
    /// Number of distinct fingerprints, and thus issues, events are spread over.
    pub num_event_groups: u32,
    /// Size of the user population, omits users when unset.
    pub max_users: Option<u32>,
    /// Number of generated releases when no explicit `release` is set.
    pub num_releases: u32,
    /// A fixed release or a list of releases to choose from.
    pub release: Option<Release>,
    /// Minimum number of breadcrumbs.
    pub min_breadcrumbs: Option<usize>,
    /// Maximum number of breadcrumbs.
    pub max_breadcrumbs: Option<usize>,
    /// Pool of breadcrumb categories.
    pub breadcrumb_categories: Option<Vec<String>>,
    /// Pool of breadcrumb levels.
    pub breadcrumb_levels: Option<Vec<String>>,
    /// Pool of breadcrumb types.
    pub breadcrumb_types: Option<Vec<String>>,
    /// Pool of breadcrumb messages.
    pub breadcrumb_messages: Option<Vec<String>>,
    /// Whether events carry a JavaScript exception.
    pub with_javascript_stacktrace: bool,
    /// Minimum number of stack frames.
    pub min_frames: usize,
    /// Maximum number of stack frames.
    pub max_frames: usize,
}

impl Default for EventParams {
    fn default() -> Self {
        Self {
            with_event_id: true,
            with_level: true,
            num_event_groups: 1,
            max_users: None,
            num_releases: 10,
            release: None,
            min_breadcrumbs: None,
            max_breadcrumbs: None,
            breadcrumb_categories: None,
            breadcrumb_levels: None,
            breadcrumb_types: None,
            breadcrumb_messages: None,
            with_javascript_stacktrace: false,
            min_frames: 5,
            max_frames: 30,
        }
    }
}

impl EventParams {
    fn breadcrumbs(&self) -> BreadcrumbParams {
        BreadcrumbParams {
            min: self.min_breadcrumbs,
            max: self.max_breadcrumbs,
            categories: self.breadcrumb_categories.clone(),
            levels: self.breadcrumb_levels.clone(),
            types: self.breadcrumb_types.clone(),
            messages: self.breadcrumb_messages.clone(),
        }
    }
}

/// Generates error events.
///
/// All events of one generator share a single trace ID in their trace context.
#[derive(Clone, Debug)]
pub struct EventGenerator {
    generator: Generator,
    trace_id: String,
}

impl EventGenerator {
    /// Creates a generator from task settings.
    ///
    /// `frames` is the pool JavaScript stack traces are sampled from. It is only used with
    /// `with_javascript_stacktrace`.
    pub fn new(params: &EventParams, frames: Option<Arc<[Value]>>) -> Result<Self, GeneratorError> {
        let trace_id = uuid_hex(&mut rand::rng());
        let num_event_groups = check_positive("num_event_groups", params.num_event_groups)?.get();

        let contexts = Schema::new()
            .field("os", optional(os_context_generator()?))
            .field("device", optional(device_context_generator()))
            .field("app", optional(app_context_generator()?))
            .field(
                "trace",
                optional(trace_context_generator(Some(trace_id.clone()))),
            );

        let mut schema = Schema::new()
            .field("event_id", params.with_event_id.then(uuid_generator))
            .field(
                "level",
                params
                    .with_level
                    .then(|| FieldSpec::one_of(["error", "debug"])),
            )
            .field(
                "fingerprint",
                FieldSpec::producer(move |rng: &mut dyn RngCore| {
                    let group = rng.random_range(0..num_event_groups);
                    Value::from(vec![format!("fingerprint{group}")])
                }),
            )
            .field(
                "release",
                release_generator(params.release.as_ref(), params.num_releases)?,
            )
            .field(
                "transaction",
                FieldSpec::one_of([
                    FieldSpec::null(),
                    FieldSpec::producer(|rng| {
                        Value::from(format!("mytransaction{}", rng.random_range(0..100)))
                    }),
                ]),
            )
            .field(
                "logentry",
                Schema::new().field("formatted", sentence_generator()),
            )
            .field(
                "logger",
                FieldSpec::one_of([Some("foo.bar.baz"), Some("bam.baz.bad"), None]),
            )
            .field("timestamp", timestamp_generator())
            .field(
                "environment",
                FieldSpec::one_of(["production", "development", "staging"]),
            )
            .field("user", user_interface_generator(params.max_users))
            .field("contexts", contexts)
            .field(
                "breadcrumbs",
                Schema::new().field("values", breadcrumb_generator(params.breadcrumbs())?),
            );

        if params.with_javascript_stacktrace {
            let frames = frames.unwrap_or_else(|| Arc::from(Vec::new()));
            schema.insert("platform", "javascript");
            schema.insert(
                "exception",
                javascript_exception_generator(frames, params.min_frames, params.max_frames)?,
            );
        }

        Ok(Self {
            generator: schema.compile()?,
            trace_id,
        })
    }

    /// The trace ID shared by all events of this generator.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Generates an event using the thread-local random source.
    pub fn generate(&self) -> Map {
        self.generator.generate()
    }

    /// Generates an event using the given random source.
    pub fn generate_with(&self, rng: &mut dyn RngCore) -> Map {
        self.generator.generate_with(rng)
    }
}

/// Present about half of the time.
fn optional(schema: Schema) -> FieldSpec {
    FieldSpec::one_of([FieldSpec::null(), schema.into()])
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    use super::*;
    use crate::util::is_lower_hex;

    #[test]
    fn default_event() {
        let generator = EventGenerator::new(&EventParams::default(), None).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..100 {
            let event = generator.generate_with(&mut rng);

            let event_id = event["event_id"].as_str().unwrap();
            assert_eq!(event_id.len(), 32);
            assert!(is_lower_hex(event_id));

            assert!(["error", "debug"].contains(&event["level"].as_str().unwrap()));
            assert_eq!(event["fingerprint"], json!(["fingerprint0"]));
            assert!(event["release"].as_str().unwrap().starts_with("release"));
            assert!(event["logentry"]["formatted"].as_str().unwrap().ends_with('.'));
            assert!(event["timestamp"].as_f64().unwrap() > 0.0);
            assert!(event["breadcrumbs"]["values"].is_array());
            assert!(!event.contains_key("user"));
            assert!(!event.contains_key("exception"));

            if let Some(trace) = event["contexts"].get("trace") {
                assert_eq!(trace["trace_id"], generator.trace_id());
            }
            if let Some(transaction) = event.get("transaction") {
                assert!(transaction.as_str().unwrap().starts_with("mytransaction"));
            }
        }
    }

    #[test]
    fn optional_fields_can_be_disabled() {
        let params = EventParams {
            with_event_id: false,
            with_level: false,
            ..Default::default()
        };
        let event = EventGenerator::new(&params, None).unwrap().generate();
        assert!(!event.contains_key("event_id"));
        assert!(!event.contains_key("level"));
    }

    #[test]
    fn fingerprints_spread_over_groups() {
        let params = EventParams {
            num_event_groups: 3,
            ..Default::default()
        };
        let generator = EventGenerator::new(&params, None).unwrap();

        for _ in 0..50 {
            let event = generator.generate();
            let fingerprint = event["fingerprint"][0].as_str().unwrap();
            assert!(["fingerprint0", "fingerprint1", "fingerprint2"].contains(&fingerprint));
        }
    }

    #[test]
    fn javascript_events() {
        let params = EventParams {
            with_javascript_stacktrace: true,
            min_frames: 1,
            max_frames: 2,
            ..Default::default()
        };
        let frames: Arc<[Value]> = vec![json!({"function": "f"})].into();
        let event = EventGenerator::new(&params, Some(frames)).unwrap().generate();

        assert_eq!(event["platform"], "javascript");
        let stacktrace = &event["exception"]["values"][0]["stacktrace"]["frames"];
        assert!((1..=2).contains(&stacktrace.as_array().unwrap().len()));
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: EventParams = serde_json::from_value(json!({
            "max_users": 100,
            "release": ["a", "b"],
            "max_breadcrumbs": 5,
        }))
        .unwrap();

        assert!(params.with_event_id);
        assert_eq!(params.max_users, Some(100));
        assert_eq!(params.num_releases, 10);
        assert_eq!(params.release, Some(Release::Many(vec!["a".into(), "b".into()])));
        assert_eq!(params.breadcrumbs().max, Some(5));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let params = EventParams {
            num_event_groups: 0,
            ..Default::default()
        };
        assert_eq!(
            EventGenerator::new(&params, None).err(),
            Some(GeneratorError::EmptyRange {
                name: "num_event_groups"
            })
        );

        let params = EventParams {
            num_releases: 0,
            ..Default::default()
        };
        assert_eq!(
            EventGenerator::new(&params, None).err(),
            Some(GeneratorError::EmptyRange {
                name: "num_releases"
            })
        );

        let params = EventParams {
            num_releases: 0,
            release: Some(Release::One("1.0".into())),
            ..Default::default()
        };
        assert!(EventGenerator::new(&params, None).is_ok());
    }

    #[test]
    fn invalid_breadcrumb_range() {
        let params = EventParams {
            min_breadcrumbs: Some(3),
            max_breadcrumbs: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            EventGenerator::new(&params, None),
            Err(GeneratorError::InvalidRange { name: "breadcrumbs", .. })
        ));
    }
}
