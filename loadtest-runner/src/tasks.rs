//! Tasks executed by simulated users.
//!
//! Every task produces one request to the relay per execution. Tasks are configured by name,
//! with parameters passed on to the underlying generator:
//!
//! | Task                    | Request  | Parameters                                              |
//! |-------------------------|----------|---------------------------------------------------------|
//! | `random_event`          | store    | [`EventParams`], `javascript_frames` (path)             |
//! | `random_envelope_event` | envelope | [`EventParams`], [`TraceHeaderParams`], `javascript_frames` |
//! | `random_transaction`    | envelope | [`TransactionParams`], [`TraceHeaderParams`]            |
//! | `random_session`        | session  | [`SessionParams`]                                       |
//! | `file_event`            | store    | `filename`                                              |
//! | `file_envelope_event`   | envelope | `filename`                                              |
//! | `custom_event`          | store    | `schema`, `envelope` (bool)                             |
//!
//! Names may carry a `_task_factory` suffix, so `random_event_task_factory` is the same task as
//! `random_event`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use loadtest_generators::trace::{TraceHeaderParams, envelope_header_generator};
use loadtest_generators::{
    EventGenerator, EventParams, Generator, GeneratorError, Map, Schema, SessionGenerator,
    SessionParams, TransactionGenerator, TransactionParams,
};
use loadtest_types::envelope::{Envelope, EnvelopeError, Headers, Item};
use loadtest_types::project::ProjectInfo;
use rand::RngCore;
use rand::rngs::SmallRng;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::relay::{RelayClient, RelayError};

const FACTORY_SUFFIX: &str = "_task_factory";

/// An error executing a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The payload could not be generated.
    #[error("failed to generate payload")]
    Generator(#[from] GeneratorError),
    /// The envelope could not be built.
    #[error("failed to build envelope")]
    Envelope(#[from] EnvelopeError),
    /// Sending to the relay failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// A request prepared by a task.
#[derive(Debug)]
pub enum Request {
    /// An event for the store endpoint.
    Store(Map),
    /// An envelope for the envelope endpoint.
    Envelope(Envelope),
    /// An encoded session envelope sent as plain text.
    Session(Vec<u8>),
}

impl Request {
    /// Sends the request to the given project.
    pub async fn send(&self, client: &RelayClient, project: &ProjectInfo) -> Result<(), RelayError> {
        match self {
            Request::Store(event) => client.send_message(project, event).await,
            Request::Envelope(envelope) => client.send_envelope(project, envelope).await,
            Request::Session(data) => client.send_session(project, data.clone()).await,
        }
    }
}

#[derive(Debug)]
enum TaskKind {
    Event {
        generator: EventGenerator,
        headers: Option<Generator>,
    },
    Transaction {
        generator: TransactionGenerator,
        headers: Generator,
        fixed_trace_id: bool,
    },
    Session(SessionGenerator),
    File {
        event: Arc<Map>,
        envelope: bool,
    },
    Custom {
        generator: Generator,
        envelope: bool,
    },
}

/// A configured task.
#[derive(Debug)]
pub struct Task {
    name: String,
    kind: TaskKind,
}

impl Task {
    /// Creates a task from its configured name and parameters.
    pub fn new(name: &str, params: &serde_json::Map<String, Value>) -> Result<Self> {
        let kind = match name.strip_suffix(FACTORY_SUFFIX).unwrap_or(name) {
            "random_event" => event_task(params, false)?,
            "random_envelope_event" => event_task(params, true)?,
            "random_transaction" => {
                let trace: TraceHeaderParams = parse_params(params)?;
                TaskKind::Transaction {
                    generator: TransactionGenerator::new(&parse_params::<TransactionParams>(
                        params,
                    )?)?,
                    headers: envelope_header_generator(None, &trace).compile()?,
                    fixed_trace_id: trace.trace_id.is_some(),
                }
            }
            "random_session" => {
                TaskKind::Session(SessionGenerator::new(&parse_params::<SessionParams>(params)?)?)
            }
            "file_event" => file_task(params, false)?,
            "file_envelope_event" => file_task(params, true)?,
            "custom_event" => {
                let schema = params
                    .get("schema")
                    .context("custom_event requires a `schema` parameter")?;
                TaskKind::Custom {
                    generator: Schema::from_config(schema)?.compile()?,
                    envelope: bool_param(params, "envelope")?,
                }
            }
            other => bail!("unknown task `{other}`"),
        };

        Ok(Self {
            name: name.to_owned(),
            kind,
        })
    }

    /// The configured name of the task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generates the request for a single execution.
    pub fn prepare(&self, project: &ProjectInfo, rng: &mut dyn RngCore) -> Result<Request, TaskError> {
        let request = match &self.kind {
            TaskKind::Event {
                generator,
                headers: None,
            } => Request::Store(generator.generate_with(rng)),
            TaskKind::Event {
                generator,
                headers: Some(headers),
            } => {
                let event = generator.generate_with(rng);
                let headers = trace_headers(headers.generate_with(rng), project, None);
                Request::Envelope(Envelope::from_payload("event", &event, headers)?)
            }
            TaskKind::Transaction {
                generator,
                headers,
                fixed_trace_id,
            } => {
                let transaction = generator.generate_with(rng)?;
                let trace_id = if *fixed_trace_id {
                    None
                } else {
                    transaction
                        .get("contexts")
                        .and_then(|c| c.get("trace"))
                        .and_then(|t| t.get("trace_id"))
                        .cloned()
                };
                let headers = trace_headers(headers.generate_with(rng), project, trace_id);
                Request::Envelope(Envelope::from_payload("transaction", &transaction, headers)?)
            }
            TaskKind::Session(generator) => {
                let session = generator.generate_with(rng);
                let mut envelope = Envelope::new(Headers::new());
                envelope.add_item(Item::json("session", &session)?);
                Request::Session(envelope.to_vec()?)
            }
            TaskKind::File { event, envelope } => {
                if *envelope {
                    Request::Envelope(Envelope::from_payload("event", event, Headers::new())?)
                } else {
                    Request::Store(Map::clone(event))
                }
            }
            TaskKind::Custom {
                generator,
                envelope,
            } => {
                let event = generator.generate_with(rng);
                if *envelope {
                    Request::Envelope(Envelope::from_payload("event", &event, Headers::new())?)
                } else {
                    Request::Store(event)
                }
            }
        };

        Ok(request)
    }

    /// Generates a request and sends it to the relay.
    pub async fn execute(
        &self,
        client: &RelayClient,
        project: &ProjectInfo,
        rng: &mut SmallRng,
    ) -> Result<(), TaskError> {
        let request = self.prepare(project, rng)?;
        request.send(client, project).await?;
        Ok(())
    }
}

fn event_task(params: &serde_json::Map<String, Value>, envelope: bool) -> Result<TaskKind> {
    let event_params: EventParams = parse_params(params)?;

    let frames = match params.get("javascript_frames") {
        Some(Value::String(path)) => Some(load_frames(Path::new(path))?),
        Some(_) => bail!("`javascript_frames` must be a file path"),
        None => None,
    };
    if event_params.with_javascript_stacktrace && frames.is_none() {
        tracing::warn!("javascript stack traces without `javascript_frames` will be empty");
    }

    let headers = if envelope {
        let trace: TraceHeaderParams = parse_params(params)?;
        Some(envelope_header_generator(None, &trace).compile()?)
    } else {
        None
    };

    Ok(TaskKind::Event {
        generator: EventGenerator::new(&event_params, frames)?,
        headers,
    })
}

fn file_task(params: &serde_json::Map<String, Value>, envelope: bool) -> Result<TaskKind> {
    let filename = params
        .get("filename")
        .and_then(Value::as_str)
        .context("file tasks require a `filename` parameter")?;

    let contents = std::fs::read(filename)
        .with_context(|| format!("failed to read event file {filename}"))?;
    let event: Map = serde_json::from_slice(&contents)
        .with_context(|| format!("event file {filename} must contain a JSON object"))?;

    Ok(TaskKind::File {
        event: Arc::new(event),
        envelope,
    })
}

/// Loads a pool of stack frames from a file containing a JSON array.
fn load_frames(path: &Path) -> Result<Arc<[Value]>> {
    let contents = std::fs::read(path)
        .with_context(|| format!("failed to read frames file {}", path.display()))?;
    let frames: Vec<Value> = serde_json::from_slice(&contents)
        .with_context(|| format!("frames file {} must contain a JSON array", path.display()))?;
    Ok(frames.into())
}

fn parse_params<T: DeserializeOwned>(params: &serde_json::Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone())).context("invalid task parameters")
}

fn bool_param(params: &serde_json::Map<String, Value>, key: &str) -> Result<bool> {
    match params.get(key) {
        None => Ok(false),
        Some(value) => value
            .as_bool()
            .with_context(|| format!("`{key}` must be a boolean")),
    }
}

/// Completes the dynamic sampling context of envelope headers.
fn trace_headers(mut headers: Map, project: &ProjectInfo, trace_id: Option<Value>) -> Map {
    if let Some(trace) = headers.get_mut("trace").and_then(Value::as_object_mut) {
        trace
            .entry("public_key")
            .or_insert_with(|| project.key.clone().into());
        if let Some(trace_id) = trace_id {
            trace.insert("trace_id".to_owned(), trace_id);
        }
    }
    headers
}
