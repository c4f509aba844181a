//! Declarative schemas that compile into reusable payload generators.
//!
//! A [`Schema`] is an ordered list of fields, each described by a [`FieldSpec`]. Compiling the
//! schema validates it once and yields a [`Generator`], which produces a fresh JSON object with
//! independent random choices on every call:
//!
//! ```
//! use loadtest_generators::{FieldSpec, Schema};
//! use loadtest_generators::util::uuid_generator;
//!
//! let generator = Schema::new()
//!     .field("event_id", uuid_generator())
//!     .field("level", FieldSpec::one_of(["error", "debug"]))
//!     .field("logger", FieldSpec::null())
//!     .compile()
//!     .unwrap();
//!
//! let event = generator.generate();
//! assert_eq!(event["event_id"].as_str().unwrap().len(), 32);
//! assert!(!event.contains_key("logger"));
//! ```

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand::seq::IndexedRandom;
use serde_json::Value;

use crate::error::SchemaError;

/// A JSON object produced by a [`Generator`].
pub type Map = serde_json::Map<String, Value>;

/// A function invoked on every generation to obtain a fresh value.
///
/// Producers receive the random source driving the current generation. Their output is used as-is
/// and never interpreted as a further [`FieldSpec`].
pub type Producer = Arc<dyn Fn(&mut dyn RngCore) -> Value + Send + Sync>;

/// Describes how to obtain the value of a single field.
#[derive(Clone)]
pub enum FieldSpec {
    /// A value used verbatim. A `null` literal omits the field.
    Literal(Value),
    /// A set of alternatives, one of which is chosen uniformly at random and resolved in turn.
    OneOf(Vec<FieldSpec>),
    /// A nested object generated from its own schema.
    Nested(Schema),
    /// A function producing the value.
    Producer(Producer),
}

impl FieldSpec {
    /// A specification that always omits its field.
    pub fn null() -> Self {
        FieldSpec::Literal(Value::Null)
    }

    /// Creates a set of alternatives from anything convertible into field specifications.
    pub fn one_of<I, T>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldSpec>,
    {
        FieldSpec::OneOf(alternatives.into_iter().map(Into::into).collect())
    }

    /// Wraps a closure into a [`FieldSpec::Producer`].
    pub fn producer<F>(f: F) -> Self
    where
        F: Fn(&mut dyn RngCore) -> Value + Send + Sync + 'static,
    {
        FieldSpec::Producer(Arc::new(f))
    }

    fn validate(&self, path: &str) -> Result<(), SchemaError> {
        match self {
            FieldSpec::OneOf(alternatives) if alternatives.is_empty() => {
                Err(SchemaError::EmptyChoiceSet {
                    path: path.to_owned(),
                })
            }
            FieldSpec::OneOf(alternatives) => alternatives
                .iter()
                .try_for_each(|alternative| alternative.validate(path)),
            FieldSpec::Nested(schema) => schema.validate(path),
            FieldSpec::Literal(_) | FieldSpec::Producer(_) => Ok(()),
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::OneOf(alternatives) => f.debug_tuple("OneOf").field(alternatives).finish(),
            Self::Nested(schema) => f.debug_tuple("Nested").field(schema).finish(),
            Self::Producer(_) => f.write_str("Producer(..)"),
        }
    }
}

impl From<Value> for FieldSpec {
    fn from(value: Value) -> Self {
        FieldSpec::Literal(value)
    }
}

impl From<&str> for FieldSpec {
    fn from(value: &str) -> Self {
        FieldSpec::Literal(value.into())
    }
}

impl From<String> for FieldSpec {
    fn from(value: String) -> Self {
        FieldSpec::Literal(value.into())
    }
}

impl From<bool> for FieldSpec {
    fn from(value: bool) -> Self {
        FieldSpec::Literal(value.into())
    }
}

impl From<i64> for FieldSpec {
    fn from(value: i64) -> Self {
        FieldSpec::Literal(value.into())
    }
}

impl From<f64> for FieldSpec {
    fn from(value: f64) -> Self {
        FieldSpec::Literal(value.into())
    }
}

impl From<Schema> for FieldSpec {
    fn from(schema: Schema) -> Self {
        FieldSpec::Nested(schema)
    }
}

impl From<Generator> for FieldSpec {
    fn from(generator: Generator) -> Self {
        FieldSpec::producer(move |rng| Value::Object(generator.generate_with(rng)))
    }
}

impl<T: Into<FieldSpec>> From<Option<T>> for FieldSpec {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(FieldSpec::null, Into::into)
    }
}

/// An ordered collection of named field specifications.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field, replacing an earlier field with the same name.
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.insert(name, spec);
        self
    }

    /// Inserts a field in place, replacing an earlier field with the same name.
    pub fn insert(&mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) {
        let name = name.into();
        let spec = spec.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = spec,
            None => self.fields.push((name, spec)),
        }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates the schema and turns it into a [`Generator`].
    pub fn compile(self) -> Result<Generator, SchemaError> {
        self.validate("")?;
        Ok(Generator {
            schema: Arc::new(self),
        })
    }

    fn validate(&self, prefix: &str) -> Result<(), SchemaError> {
        for (name, spec) in &self.fields {
            spec.validate(&join_path(prefix, name))?;
        }
        Ok(())
    }

    fn generate_with(&self, rng: &mut dyn RngCore) -> Map {
        let mut map = Map::with_capacity(self.fields.len());
        for (name, spec) in &self.fields {
            let value = resolve(spec, rng);
            if !value.is_null() {
                map.insert(name.clone(), value);
            }
        }
        map
    }
}

/// Produces JSON objects from a validated [`Schema`].
///
/// Generators are cheap to clone and safe to share across threads.
#[derive(Clone, Debug)]
pub struct Generator {
    schema: Arc<Schema>,
}

impl Generator {
    /// Generates a fresh object using the thread-local random source.
    pub fn generate(&self) -> Map {
        self.generate_with(&mut rand::rng())
    }

    /// Generates a fresh object using the given random source.
    pub fn generate_with(&self, rng: &mut dyn RngCore) -> Map {
        self.schema.generate_with(rng)
    }
}

fn resolve(spec: &FieldSpec, rng: &mut dyn RngCore) -> Value {
    match spec {
        FieldSpec::Literal(value) => value.clone(),
        // Compiled schemas never contain empty alternatives.
        FieldSpec::OneOf(alternatives) => match alternatives.choose(rng) {
            Some(choice) => resolve(choice, rng),
            None => Value::Null,
        },
        FieldSpec::Nested(schema) => Value::Object(schema.generate_with(rng)),
        FieldSpec::Producer(producer) => producer(rng),
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    use super::*;

    #[test]
    fn single_alternative_is_deterministic() {
        let generator = Schema::new()
            .field("environment", FieldSpec::one_of(["production"]))
            .field("nested", Schema::new().field("flag", FieldSpec::one_of([true])))
            .compile()
            .unwrap();

        for _ in 0..100 {
            let value = generator.generate();
            assert_eq!(
                Value::Object(value),
                json!({"environment": "production", "nested": {"flag": true}})
            );
        }
    }

    #[test]
    fn null_fields_are_omitted() {
        let generator = Schema::new()
            .field("literal", FieldSpec::null())
            .field("optional", None::<&str>)
            .field("choice", FieldSpec::one_of([FieldSpec::null()]))
            .field("producer", FieldSpec::producer(|_| Value::Null))
            .field("kept", "value")
            .compile()
            .unwrap();

        for _ in 0..50 {
            let value = generator.generate();
            assert_eq!(value.len(), 1);
            assert_eq!(value["kept"], "value");
        }
    }

    #[test]
    fn alternatives_resolve_recursively() {
        let generator = Schema::new()
            .field(
                "value",
                FieldSpec::one_of([FieldSpec::one_of([FieldSpec::producer(|_| json!(42))])]),
            )
            .field(
                "object",
                FieldSpec::one_of([FieldSpec::Nested(Schema::new().field("a", 1i64))]),
            )
            .compile()
            .unwrap();

        let value = generator.generate();
        assert_eq!(value["value"], 42);
        assert_eq!(value["object"], json!({"a": 1}));
    }

    #[test]
    fn producer_output_is_not_resolved_again() {
        let generator = Schema::new()
            .field("list", FieldSpec::producer(|_| json!(["a", "b"])))
            .compile()
            .unwrap();

        assert_eq!(generator.generate()["list"], json!(["a", "b"]));
    }

    #[test]
    fn empty_choice_set_is_rejected() {
        let result = Schema::new()
            .field("ok", "fine")
            .field(
                "contexts",
                Schema::new().field("os", FieldSpec::OneOf(Vec::new())),
            )
            .compile();

        assert_eq!(
            result.unwrap_err(),
            SchemaError::EmptyChoiceSet {
                path: "contexts.os".into()
            }
        );
    }

    #[test]
    fn nested_empty_choice_set_is_rejected() {
        let spec = FieldSpec::one_of([FieldSpec::OneOf(Vec::new())]);
        let result = Schema::new().field("level", spec).compile();
        assert!(matches!(result, Err(SchemaError::EmptyChoiceSet { path }) if path == "level"));
    }

    #[test]
    fn producers_run_once_per_generation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let generator = Schema::new()
            .field(
                "count",
                FieldSpec::producer(move |_| json!(counter.fetch_add(1, Ordering::Relaxed))),
            )
            .compile()
            .unwrap();

        assert_eq!(generator.generate()["count"], 0);
        assert_eq!(generator.generate()["count"], 1);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn calls_do_not_share_state() {
        let generator = Schema::new()
            .field("nested", Schema::new().field("value", "fixed"))
            .compile()
            .unwrap();

        let mut first = generator.generate();
        first.insert("mutated".into(), json!(true));
        first["nested"]["value"] = json!("changed");

        let second = generator.generate();
        assert!(!second.contains_key("mutated"));
        assert_eq!(second["nested"]["value"], "fixed");
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let generator = Schema::new()
            .field("level", FieldSpec::one_of(["error", "warning", "info", "debug"]))
            .field("number", FieldSpec::one_of([1i64, 2, 3, 4, 5, 6]))
            .compile()
            .unwrap();

        let first = generator.generate_with(&mut SmallRng::seed_from_u64(7));
        let second = generator.generate_with(&mut SmallRng::seed_from_u64(7));
        assert_eq!(first, second);
    }

    #[test]
    fn insert_replaces_existing_field() {
        let schema = Schema::new().field("a", 1i64).field("b", 2i64).field("a", 3i64);
        assert_eq!(schema.len(), 2);

        let value = schema.compile().unwrap().generate();
        assert_eq!(value["a"], 3);
    }

    #[test]
    fn generators_nest_as_producers() {
        let inner = Schema::new().field("id", "abc").compile().unwrap();
        let outer = Schema::new().field("user", inner).compile().unwrap();

        assert_eq!(outer.generate()["user"], json!({"id": "abc"}));
    }
}
