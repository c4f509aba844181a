//! Randomized transactions with span trees.

use rand::{Rng, RngCore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::contexts::{device_context_generator, os_context_generator};
use crate::error::{GeneratorError, check_range};
use crate::schema::{FieldSpec, Generator, Map, Schema};
use crate::spans::{STATUS_OK, SpanTreeParams, create_spans};
use crate::util::{
    Release, epoch_seconds, measurements_generator, op_generator, op_path, release_generator,
    span_id_hex, uuid_generator, uuid_hex,
};

/// Settings for [`TransactionGenerator`], as found in task configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TransactionParams {
    /// A fixed release or a list of releases to choose from. Omitted when unset.
    pub release: Option<Release>,
    /// Minimum number of spans.
    pub min_spans: usize,
    /// Maximum number of spans.
    pub max_spans: usize,
    /// Transactions last up to this many whole seconds.
    pub max_duration_secs: u32,
    /// Names of the measurements attached to every transaction.
    pub measurements: Vec<String>,
}

impl Default for TransactionParams {
    fn default() -> Self {
        Self {
            release: None,
            min_spans: 1,
            max_spans: 15,
            max_duration_secs: 30,
            measurements: Vec::new(),
        }
    }
}

/// Generates transactions.
///
/// Unlike plain schema generators, the spans of a transaction depend on its timestamps and trace
/// context. Those fields are computed on every call and merged into the output of the base schema.
#[derive(Clone, Debug)]
pub struct TransactionGenerator {
    base: Generator,
    min_spans: usize,
    max_spans: usize,
    max_duration_secs: u32,
}

impl TransactionGenerator {
    /// Creates a generator from task settings.
    pub fn new(params: &TransactionParams) -> Result<Self, GeneratorError> {
        check_range("spans", params.min_spans, params.max_spans)?;

        let release = match &params.release {
            Some(release) => release_generator(Some(release), 1)?,
            None => FieldSpec::null(),
        };
        let measurements = if params.measurements.is_empty() {
            FieldSpec::null()
        } else {
            measurements_generator(params.measurements.clone())
        };

        let base = Schema::new()
            .field("event_id", uuid_generator())
            .field("type", "transaction")
            .field("version", "7")
            .field("release", release)
            .field(
                "contexts",
                Schema::new()
                    .field(
                        "os",
                        FieldSpec::one_of([FieldSpec::null(), os_context_generator()?.into()]),
                    )
                    .field(
                        "device",
                        FieldSpec::one_of([FieldSpec::null(), device_context_generator().into()]),
                    ),
            )
            .field("culprit", op_generator())
            .field("environment", FieldSpec::one_of(["prod", "debug"]))
            .field("measurements", measurements)
            .compile()?;

        Ok(Self {
            base,
            min_spans: params.min_spans,
            max_spans: params.max_spans,
            max_duration_secs: params.max_duration_secs,
        })
    }

    /// Generates a transaction using the thread-local random source.
    pub fn generate(&self) -> Result<Map, GeneratorError> {
        self.generate_with(&mut rand::rng())
    }

    /// Generates a transaction using the given random source.
    pub fn generate_with(&self, rng: &mut dyn RngCore) -> Result<Map, GeneratorError> {
        let mut transaction = self.base.generate_with(rng);

        let timestamp = epoch_seconds();
        let duration = match self.max_duration_secs {
            0 => 0,
            max => rng.random_range(0..max),
        };
        let start_timestamp = timestamp - 0.001 - f64::from(duration);

        let trace_id = uuid_hex(rng);
        let span_id = span_id_hex(rng);

        let params = SpanTreeParams {
            min_spans: self.min_spans,
            max_spans: self.max_spans,
            transaction_id: span_id.clone(),
            trace_id: trace_id.clone(),
            transaction_start: start_timestamp,
            timestamp,
        };
        let spans: Vec<Value> = create_spans(rng, &params, |rng| op_path(rng))?
            .into_iter()
            .map(|span| span.into_value())
            .collect();

        let trace_context = json!({
            "type": "trace",
            "trace_id": trace_id,
            "span_id": span_id,
            "op": op_path(rng),
            "status": STATUS_OK,
        });
        if let Some(Value::Object(contexts)) = transaction.get_mut("contexts") {
            contexts.insert("trace".to_owned(), trace_context);
        } else {
            transaction.insert("contexts".to_owned(), json!({ "trace": trace_context }));
        }

        transaction.insert("timestamp".to_owned(), timestamp.into());
        transaction.insert("start_timestamp".to_owned(), start_timestamp.into());
        transaction.insert("spans".to_owned(), Value::Array(spans));

        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::spans::Span;

    #[test]
    fn default_transaction() {
        let generator = TransactionGenerator::new(&TransactionParams::default()).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..50 {
            let transaction = generator.generate_with(&mut rng).unwrap();

            assert_eq!(transaction["type"], "transaction");
            assert_eq!(transaction["version"], "7");
            assert!(!transaction.contains_key("release"));
            assert!(!transaction.contains_key("measurements"));

            let timestamp = transaction["timestamp"].as_f64().unwrap();
            let start = transaction["start_timestamp"].as_f64().unwrap();
            assert!(start < timestamp);
            assert!(timestamp - start <= 30.001 + 1e-6);

            let trace = &transaction["contexts"]["trace"];
            let spans: Vec<Span> = serde_json::from_value(transaction["spans"].clone()).unwrap();
            assert!((1..=15).contains(&spans.len()));

            for span in &spans {
                assert_eq!(span.trace_id, trace["trace_id"].as_str().unwrap());
                assert!(span.start_timestamp >= start - 1e-6);
                assert!(span.timestamp <= timestamp + 1e-6);
            }
            assert!(spans.iter().any(|s| s.parent_span_id == trace["span_id"]));
        }
    }

    #[test]
    fn release_and_measurements() {
        let params = TransactionParams {
            release: Some(Release::One("backend@2".into())),
            measurements: vec!["lcp".into(), "fid".into()],
            min_spans: 0,
            max_spans: 0,
            max_duration_secs: 0,
        };
        let transaction = TransactionGenerator::new(&params).unwrap().generate().unwrap();

        assert_eq!(transaction["release"], "backend@2");
        assert!(transaction["measurements"]["lcp"]["value"].is_f64());
        assert!(transaction["measurements"]["fid"]["value"].is_f64());
        assert_eq!(transaction["spans"], json!([]));
    }

    #[test]
    fn invalid_span_range() {
        let params = TransactionParams {
            min_spans: 4,
            max_spans: 2,
            ..Default::default()
        };
        assert!(matches!(
            TransactionGenerator::new(&params),
            Err(GeneratorError::InvalidRange { name: "spans", .. })
        ));
    }
}
