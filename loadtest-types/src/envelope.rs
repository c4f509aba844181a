//! The envelope wire format.
//!
//! An envelope is a JSON header line followed by any number of items. Each item consists of a
//! JSON header line and a payload:
//!
//! ```text
//! {"event_id":"9ec79c33ec9942ab8353589fcb2e04dc"}
//! {"type":"event","length":41}
//! {"message":"hello","level":"error"}
//! ```
//!
//! If the item header declares a `length`, the payload is exactly that many bytes, optionally
//! followed by a newline. Otherwise the payload extends to the next newline.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

/// Content type of envelope requests.
pub const CONTENT_TYPE: &str = "application/x-sentry-envelope";

/// Headers of an envelope or an item.
pub type Headers = Map<String, Value>;

/// An error encountered while decoding or encoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The envelope is empty.
    #[error("missing envelope header")]
    MissingHeader,
    /// The envelope header is not a JSON object.
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// An item header is not a JSON object.
    #[error("invalid header of item {index}")]
    InvalidItemHeader {
        /// Position of the item in the envelope.
        index: usize,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// An item declares a length that is not a non-negative integer.
    #[error("invalid length of item {index}")]
    InvalidLength {
        /// Position of the item in the envelope.
        index: usize,
    },
    /// An item declares more payload bytes than the envelope contains.
    #[error("item {index} declares {length} bytes, but only {available} remain")]
    UnexpectedEof {
        /// Position of the item in the envelope.
        index: usize,
        /// The declared payload length.
        length: usize,
        /// The number of remaining bytes.
        available: usize,
    },
    /// A payload could not be serialized.
    #[error("failed to serialize payload")]
    Serialize(#[source] serde_json::Error),
}

/// A single item of an [`Envelope`].
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    /// Item headers, including the `type`.
    pub headers: Headers,
    /// The raw payload.
    pub payload: Bytes,
}

impl Item {
    /// Creates an item of the given type with a raw payload.
    pub fn new(ty: &str, payload: impl Into<Bytes>) -> Self {
        let mut headers = Headers::new();
        headers.insert("type".to_owned(), ty.into());
        Self {
            headers,
            payload: payload.into(),
        }
    }

    /// Creates an item of the given type with a JSON payload.
    pub fn json<T: Serialize + ?Sized>(ty: &str, payload: &T) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_vec(payload).map_err(EnvelopeError::Serialize)?;
        Ok(Self::new(ty, payload))
    }

    /// Returns the item type, if declared.
    pub fn ty(&self) -> Option<&str> {
        self.headers.get("type").and_then(Value::as_str)
    }

    /// Parses the payload as JSON.
    pub fn payload_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// A container for sending multiple payloads in a single request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Envelope headers, such as the `event_id`.
    pub headers: Headers,
    /// All items in order.
    pub items: Vec<Item>,
}

impl Envelope {
    /// Creates an envelope with the given headers and no items.
    pub fn new(headers: Headers) -> Self {
        Self {
            headers,
            items: Vec::new(),
        }
    }

    /// Creates an envelope containing a single JSON item of type `ty`.
    ///
    /// If the payload has an `event_id`, it is copied into the envelope headers, replacing any
    /// given one.
    pub fn from_payload(
        ty: &str,
        payload: &Map<String, Value>,
        mut headers: Headers,
    ) -> Result<Self, EnvelopeError> {
        if let Some(event_id) = payload.get("event_id") {
            headers.insert("event_id".to_owned(), event_id.clone());
        }

        let mut envelope = Self::new(headers);
        envelope.add_item(Item::json(ty, payload)?);
        Ok(envelope)
    }

    /// Appends an item.
    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the envelope has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Encodes the envelope, declaring the `length` of every item.
    pub fn to_vec(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut buf = Vec::new();
        write_json(&mut buf, &self.headers)?;
        buf.push(b'\n');

        for item in &self.items {
            let mut headers = item.headers.clone();
            headers.insert("length".to_owned(), item.payload.len().into());
            write_json(&mut buf, &headers)?;
            buf.push(b'\n');
            buf.extend_from_slice(&item.payload);
            buf.push(b'\n');
        }

        Ok(buf)
    }

    /// Decodes an envelope.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut rest = Bytes::copy_from_slice(bytes);

        let header_line = split_line(&mut rest);
        if header_line.iter().all(u8::is_ascii_whitespace) {
            return Err(EnvelopeError::MissingHeader);
        }
        let headers = serde_json::from_slice(&header_line).map_err(EnvelopeError::InvalidHeader)?;

        let mut items = Vec::new();
        while !rest.is_empty() {
            let index = items.len();
            let header_line = split_line(&mut rest);
            // Tolerate trailing and empty lines between items.
            if header_line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let headers: Headers = serde_json::from_slice(&header_line)
                .map_err(|source| EnvelopeError::InvalidItemHeader { index, source })?;

            let payload = match headers.get("length") {
                Some(length) => {
                    let length = length
                        .as_u64()
                        .and_then(|l| usize::try_from(l).ok())
                        .ok_or(EnvelopeError::InvalidLength { index })?;
                    if length > rest.len() {
                        return Err(EnvelopeError::UnexpectedEof {
                            index,
                            length,
                            available: rest.len(),
                        });
                    }
                    let payload = rest.split_to(length);
                    if rest.first() == Some(&b'\n') {
                        let _ = rest.split_to(1);
                    }
                    payload
                }
                None => split_line(&mut rest),
            };

            items.push(Item { headers, payload });
        }

        Ok(Self { headers, items })
    }
}

fn write_json(buf: &mut Vec<u8>, value: &Headers) -> Result<(), EnvelopeError> {
    serde_json::to_writer(buf, value).map_err(EnvelopeError::Serialize)
}

/// Splits off everything up to the next newline, consuming the newline.
fn split_line(rest: &mut Bytes) -> Bytes {
    match rest.iter().position(|b| *b == b'\n') {
        Some(pos) => {
            let line = rest.split_to(pos);
            let _ = rest.split_to(1);
            line
        }
        None => rest.split_to(rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_event_envelope() {
        let event = json!({"event_id": "abc", "message": "hi"});
        let envelope =
            Envelope::from_payload("event", event.as_object().unwrap(), Headers::new()).unwrap();
        let encoded = String::from_utf8(envelope.to_vec().unwrap()).unwrap();

        let lines: Vec<_> = encoded.split_terminator('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            serde_json::from_str::<Value>(lines[0]).unwrap(),
            json!({"event_id": "abc"})
        );

        let payload = serde_json::to_string(&event).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(lines[1]).unwrap(),
            json!({"type": "event", "length": payload.len()})
        );
        assert_eq!(lines[2], payload);
    }

    #[test]
    fn payload_event_id_wins() {
        let mut headers = Headers::new();
        headers.insert("event_id".into(), json!("stale"));
        headers.insert("sdk".into(), json!({"name": "loadtest"}));

        let transaction = json!({"event_id": "fresh", "type": "transaction"});
        let envelope =
            Envelope::from_payload("transaction", transaction.as_object().unwrap(), headers)
                .unwrap();

        assert_eq!(envelope.headers["event_id"], "fresh");
        assert_eq!(envelope.headers["sdk"]["name"], "loadtest");
        assert_eq!(envelope.items[0].ty(), Some("transaction"));

        let session = json!({"sid": "abc"});
        let envelope =
            Envelope::from_payload("session", session.as_object().unwrap(), Headers::new())
                .unwrap();
        assert!(envelope.headers.is_empty());
    }

    #[test]
    fn parse_mixed_items() {
        let raw = b"{\"event_id\":\"e\"}\n\
            {\"type\":\"metric_buckets\",\"length\":4}\n[{}]\n\n\
            {\"type\":\"session\"}\n{\"sid\":\"s\"}\n\
            {\"type\":\"attachment\",\"length\":3}\nabc";

        let envelope = Envelope::parse(raw).unwrap();
        assert_eq!(envelope.headers["event_id"], "e");
        assert_eq!(envelope.len(), 3);

        assert_eq!(envelope.items[0].ty(), Some("metric_buckets"));
        assert_eq!(envelope.items[0].payload_json().unwrap(), json!([{}]));
        assert_eq!(envelope.items[1].ty(), Some("session"));
        assert_eq!(&envelope.items[1].payload[..], b"{\"sid\":\"s\"}");
        assert_eq!(&envelope.items[2].payload[..], b"abc");
    }

    #[test]
    fn length_may_contain_newlines() {
        let raw = b"{}\n{\"type\":\"attachment\",\"length\":5}\na\nb\nc\n";
        let envelope = Envelope::parse(raw).unwrap();
        assert_eq!(envelope.len(), 1);
        assert_eq!(&envelope.items[0].payload[..], b"a\nb\nc");
    }

    #[test]
    fn encoded_envelopes_parse() {
        let mut envelope = Envelope::new(Headers::new());
        envelope.add_item(Item::new("attachment", &b"line1\nline2"[..]));
        envelope.add_item(Item::json("session", &json!({"sid": "x"})).unwrap());

        let parsed = Envelope::parse(&envelope.to_vec().unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.items[0].payload, envelope.items[0].payload);
        assert_eq!(parsed.items[1].headers["length"], 11);
        assert_eq!(parsed.items[1].payload_json().unwrap(), json!({"sid": "x"}));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            Envelope::parse(b""),
            Err(EnvelopeError::MissingHeader)
        ));
        assert!(matches!(
            Envelope::parse(b"nope\n"),
            Err(EnvelopeError::InvalidHeader(_))
        ));
        assert!(matches!(
            Envelope::parse(b"{}\n[1]\n"),
            Err(EnvelopeError::InvalidItemHeader { index: 0, .. })
        ));
        assert!(matches!(
            Envelope::parse(b"{}\n{\"length\":-1}\n"),
            Err(EnvelopeError::InvalidLength { index: 0 })
        ));
        assert!(matches!(
            Envelope::parse(b"{}\n{\"length\":10}\nabc"),
            Err(EnvelopeError::UnexpectedEof {
                length: 10,
                available: 3,
                ..
            })
        ));
    }
}
