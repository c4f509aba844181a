//! Schemas read from configuration files.
//!
//! A schema is a JSON (or YAML) object whose values are interpreted as field specifications:
//!
//! - `null` omits the field, other scalars are literals.
//! - Arrays are sets of alternatives.
//! - Objects are nested schemas, unless they contain one of the following directives:
//!   - `{"$generator": "<name>", ...}` invokes a built-in producer with the remaining keys as
//!     arguments.
//!   - `{"$literal": <value>}` emits any value verbatim, including arrays and objects.
//!
//! Built-in producers are `uuid`, `span_id`, `sentence`, `op`, `timestamp`,
//! `version` (`num_segments`, `max_version_segment`), `string_databag` (`max_length`),
//! `measurements` (`names`) and `release` (`num_releases`).

use serde_json::Value;

use crate::error::SchemaError;
use crate::schema::{FieldSpec, Map, Schema, join_path};
use crate::util;

const GENERATOR_KEY: &str = "$generator";
const LITERAL_KEY: &str = "$literal";

impl Schema {
    /// Reads a schema from a configuration value, which must be an object.
    pub fn from_config(config: &Value) -> Result<Self, SchemaError> {
        match config {
            Value::Object(map) => schema_from_map(map, ""),
            other => Err(malformed("", format!("expected an object, found {}", kind(other)))),
        }
    }
}

impl FieldSpec {
    /// Reads a single field specification from a configuration value.
    pub fn from_config(config: &Value) -> Result<Self, SchemaError> {
        spec_from_value(config, "")
    }
}

fn schema_from_map(map: &Map, prefix: &str) -> Result<Schema, SchemaError> {
    let mut schema = Schema::new();
    for (name, value) in map {
        let spec = spec_from_value(value, &join_path(prefix, name))?;
        schema.insert(name.as_str(), spec);
    }
    Ok(schema)
}

fn spec_from_value(value: &Value, path: &str) -> Result<FieldSpec, SchemaError> {
    match value {
        Value::Array(alternatives) if alternatives.is_empty() => Err(SchemaError::EmptyChoiceSet {
            path: path.to_owned(),
        }),
        Value::Array(alternatives) => alternatives
            .iter()
            .map(|alternative| spec_from_value(alternative, path))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldSpec::OneOf),
        Value::Object(map) if map.contains_key(GENERATOR_KEY) => named_generator(map, path),
        Value::Object(map) if map.contains_key(LITERAL_KEY) => {
            if map.len() > 1 {
                return Err(malformed(path, format!("`{LITERAL_KEY}` takes no other keys")));
            }
            Ok(FieldSpec::Literal(map[LITERAL_KEY].clone()))
        }
        Value::Object(map) => schema_from_map(map, path).map(FieldSpec::Nested),
        scalar => Ok(FieldSpec::Literal(scalar.clone())),
    }
}

fn named_generator(map: &Map, path: &str) -> Result<FieldSpec, SchemaError> {
    let Some(name) = map[GENERATOR_KEY].as_str() else {
        return Err(malformed(path, format!("`{GENERATOR_KEY}` must be a string")));
    };

    let args = Args { map, path };
    let spec = match name {
        "uuid" => util::uuid_generator(),
        "span_id" => util::span_id_generator(),
        "sentence" => util::sentence_generator(),
        "op" => util::op_generator(),
        "timestamp" => util::timestamp_generator(),
        "version" => util::version_generator(
            args.integer("num_segments", 3)? as usize,
            args.integer("max_version_segment", 10)? as u32,
        )
        .map_err(|error| malformed(path, error.to_string()))?,
        "string_databag" => {
            util::string_databag_generator(args.integer("max_length", 10_000)? as usize)
        }
        "measurements" => util::measurements_generator(args.strings("names")?),
        "release" => util::release_generator(None, args.integer("num_releases", 10)? as u32)
            .map_err(|error| malformed(path, error.to_string()))?,
        unknown => return Err(malformed(path, format!("unknown generator `{unknown}`"))),
    };

    Ok(spec)
}

/// Arguments of a `$generator` directive.
struct Args<'a> {
    map: &'a Map,
    path: &'a str,
}

impl Args<'_> {
    fn integer(&self, key: &str, default: u64) -> Result<u64, SchemaError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(value) => value.as_u64().filter(|v| *v <= u64::from(u32::MAX)).ok_or_else(|| {
                malformed(self.path, format!("`{key}` must be a non-negative integer"))
            }),
        }
    }

    fn strings(&self, key: &str) -> Result<Vec<String>, SchemaError> {
        let error = || malformed(self.path, format!("`{key}` must be a list of strings"));
        let values = self.map.get(key).and_then(Value::as_array).ok_or_else(error)?;
        values
            .iter()
            .map(|value| value.as_str().map(str::to_owned).ok_or_else(error))
            .collect()
    }
}

fn malformed(path: &str, reason: String) -> SchemaError {
    SchemaError::MalformedSpec {
        path: path.to_owned(),
        reason,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
