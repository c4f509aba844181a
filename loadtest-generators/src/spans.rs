//! Synthesis of plausible span trees for transactions.
//!
//! [`create_spans`] builds a flat list of spans that nevertheless forms a tree: every span's time
//! window lies within the window of its parent. The tree is grown breadth-first with a cursor over
//! the spans emitted so far, starting from the transaction itself as the root:
//!
//! 1. The current parent is assigned between one and three children.
//! 2. The parent's window is cut into as many equal slices, which are handed to its children in
//!    chronological order.
//! 3. Once a parent has no children left, the cursor advances to the next emitted span.
//!
//! Since children always come after their parent in the list, the cursor can never overtake the
//! spans that have been emitted.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{GeneratorError, check_range};
use crate::util::span_id_hex;

/// Maximum number of children assigned to a single parent.
const MAX_CHILDREN: usize = 3;

/// The status of successful spans.
pub const STATUS_OK: &str = "ok";

/// Every span status known to the ingestion protocol.
pub const SPAN_STATUSES: &[&str] = &[
    "ok",
    "deadline_exceeded",
    "unauthenticated",
    "permission_denied",
    "not_found",
    "resource_exhausted",
    "invalid_argument",
    "unimplemented",
    "unavailable",
    "internal_error",
    "failure",
    "unknown",
    "cancelled",
    "already_exists",
    "failed_precondition",
    "aborted",
    "out_of_range",
    "data_loss",
];

/// A single timed operation within a trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// End of the span in seconds since the UNIX epoch.
    pub timestamp: f64,
    /// Start of the span in seconds since the UNIX epoch.
    pub start_timestamp: f64,
    /// Trace shared by all spans of a transaction.
    pub trace_id: String,
    /// Either the transaction's span ID or the ID of an earlier span.
    pub parent_span_id: String,
    /// Unique 16 character hex ID.
    pub span_id: String,
    /// Operation name.
    pub op: String,
    /// Outcome of the operation, see [`SPAN_STATUSES`].
    pub status: String,
}

impl Span {
    /// Converts the span into its JSON payload representation.
    pub fn into_value(self) -> Value {
        json!({
            "timestamp": self.timestamp,
            "start_timestamp": self.start_timestamp,
            "trace_id": self.trace_id,
            "parent_span_id": self.parent_span_id,
            "span_id": self.span_id,
            "op": self.op,
            "status": self.status,
        })
    }
}

/// Inputs for [`create_spans`].
#[derive(Clone, Debug)]
pub struct SpanTreeParams {
    /// Lower bound (inclusive) of the number of spans.
    pub min_spans: usize,
    /// Upper bound (inclusive) of the number of spans.
    pub max_spans: usize,
    /// Span ID of the transaction, the root of the tree.
    pub transaction_id: String,
    /// Trace ID assigned to every span.
    pub trace_id: String,
    /// Start of the transaction in seconds since the UNIX epoch.
    pub transaction_start: f64,
    /// End of the transaction in seconds since the UNIX epoch.
    pub timestamp: f64,
}

/// The span currently receiving children.
#[derive(Debug)]
struct Parent {
    span_id: String,
    start: f64,
    end: f64,
    children: usize,
    children_left: usize,
    slice: f64,
}

impl Parent {
    fn new<R: Rng + ?Sized>(rng: &mut R, span_id: String, start: f64, end: f64) -> Self {
        let children = rng.random_range(1..=MAX_CHILDREN);
        let slice = (end - start).max(0.0) / children as f64;
        Self {
            span_id,
            start,
            end,
            children,
            children_left: children,
            slice,
        }
    }

    /// Hands out the next slice of the parent's window.
    fn next_window(&mut self) -> (f64, f64) {
        let index = self.children - self.children_left;
        self.children_left -= 1;

        let start = self.start + index as f64 * self.slice;
        let end = if self.children_left == 0 {
            self.end
        } else {
            (start + self.slice).min(self.end)
        };
        (start, end.max(start))
    }
}

/// Creates a span tree for a single transaction.
///
/// The number of spans is drawn uniformly from `min_spans..=max_spans`. Operation names are
/// obtained from `op`, and roughly one in a hundred spans receives a random non-default status.
///
/// Returns [`GeneratorError::InvalidRange`] if `min_spans > max_spans`.
pub fn create_spans<R, F>(
    rng: &mut R,
    params: &SpanTreeParams,
    mut op: F,
) -> Result<Vec<Span>, GeneratorError>
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> String,
{
    check_range("spans", params.min_spans, params.max_spans)?;

    let num_spans = rng.random_range(params.min_spans..=params.max_spans);
    let mut spans: Vec<Span> = Vec::with_capacity(num_spans);

    let mut parent = Parent::new(
        rng,
        params.transaction_id.clone(),
        params.transaction_start,
        params.timestamp,
    );
    let mut next_parent = 0;

    while spans.len() < num_spans {
        if parent.children_left == 0 {
            let Some(span) = spans.get(next_parent) else {
                debug_assert!(false, "span cursor overtook the emitted spans");
                tracing::error!(next_parent, "span cursor overtook the emitted spans");
                break;
            };

            parent = Parent::new(
                rng,
                span.span_id.clone(),
                span.start_timestamp,
                span.timestamp,
            );
            next_parent += 1;
            continue;
        }

        let (start_timestamp, timestamp) = parent.next_window();
        spans.push(Span {
            timestamp,
            start_timestamp,
            trace_id: params.trace_id.clone(),
            parent_span_id: parent.span_id.clone(),
            span_id: span_id_hex(rng),
            op: op(rng),
            status: span_status(rng).to_owned(),
        });
    }

    Ok(spans)
}

/// Returns `ok` most of the time, and a random status one in a hundred times.
fn span_status<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    if rng.random_ratio(1, 100) {
        SPAN_STATUSES.choose(rng).copied().unwrap_or(STATUS_OK)
    } else {
        STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::util::op_path;

    fn params(min_spans: usize, max_spans: usize) -> SpanTreeParams {
        SpanTreeParams {
            min_spans,
            max_spans,
            transaction_id: "T".into(),
            trace_id: "R".into(),
            transaction_start: 0.0,
            timestamp: 10.0,
        }
    }

    #[test]
    fn three_spans_within_window() {
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..200 {
            let spans = create_spans(&mut rng, &params(3, 3), |_| "op".to_owned()).unwrap();

            assert_eq!(spans.len(), 3);
            for span in &spans {
                assert!(span.start_timestamp <= span.timestamp);
                assert_eq!(span.trace_id, "R");
                assert_eq!(span.op, "op");
                assert!((0.0..=10.0).contains(&span.start_timestamp));
                assert!((0.0..=10.0).contains(&span.timestamp));
            }
        }
    }

    #[test]
    fn zero_spans() {
        let mut rng = SmallRng::seed_from_u64(0);
        let spans = create_spans(&mut rng, &params(0, 0), |_| "op".to_owned()).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(0);
        let result = create_spans(&mut rng, &params(5, 2), |_| "op".to_owned());
        assert_eq!(
            result.unwrap_err(),
            GeneratorError::InvalidRange {
                name: "spans",
                min: 5,
                max: 2
            }
        );
    }

    #[test]
    fn count_is_within_range() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let spans = create_spans(&mut rng, &params(2, 6), op_path).unwrap();
            assert!((2..=6).contains(&spans.len()));
            seen.insert(spans.len());
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn children_fit_inside_parents() {
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..100 {
            let spans = create_spans(&mut rng, &params(50, 200), op_path).unwrap();

            let mut windows: HashMap<&str, (f64, f64)> = HashMap::new();
            windows.insert("T", (0.0, 10.0));

            for span in &spans {
                let (start, end) = windows[span.parent_span_id.as_str()];
                assert!(span.start_timestamp >= start - 1e-9);
                assert!(span.timestamp <= end + 1e-9);
                assert!(span.start_timestamp <= span.timestamp);
                windows.insert(&span.span_id, (span.start_timestamp, span.timestamp));
            }
        }
    }

    #[test]
    fn parents_are_emitted_first() {
        let mut rng = SmallRng::seed_from_u64(3);
        let spans = create_spans(&mut rng, &params(100, 100), op_path).unwrap();

        let mut known: HashSet<&str> = HashSet::from(["T"]);
        for span in &spans {
            assert!(known.contains(span.parent_span_id.as_str()));
            known.insert(&span.span_id);
        }
    }

    #[test]
    fn siblings_slice_parent_window_in_order() {
        let mut rng = SmallRng::seed_from_u64(4);
        for _ in 0..100 {
            let spans = create_spans(&mut rng, &params(10, 10), |_| "op".to_owned()).unwrap();

            let root_children: Vec<_> = spans.iter().filter(|s| s.parent_span_id == "T").collect();
            assert!((1..=MAX_CHILDREN).contains(&root_children.len()));

            let slice = 10.0 / root_children.len() as f64;
            for (index, span) in root_children.iter().enumerate() {
                assert!((span.start_timestamp - index as f64 * slice).abs() < 1e-9);
                assert!((span.timestamp - (index + 1) as f64 * slice).abs() < 1e-9);
            }
            assert_eq!(root_children.last().unwrap().timestamp, 10.0);
        }
    }

    #[test]
    fn statuses_are_mostly_ok() {
        let mut rng = SmallRng::seed_from_u64(5);
        let spans = create_spans(&mut rng, &params(5000, 5000), |_| "op".to_owned()).unwrap();

        let ok = spans.iter().filter(|s| s.status == STATUS_OK).count();
        assert!(ok > 4800, "{ok} ok spans");
        assert!(spans.iter().all(|s| SPAN_STATUSES.contains(&s.status.as_str())));
    }

    #[test]
    fn span_ids_are_unique() {
        let mut rng = SmallRng::seed_from_u64(6);
        let spans = create_spans(&mut rng, &params(300, 300), op_path).unwrap();
        let ids: HashSet<_> = spans.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids.len(), spans.len());
    }

    #[test]
    fn into_value_contains_all_fields() {
        let mut rng = SmallRng::seed_from_u64(7);
        let span = create_spans(&mut rng, &params(1, 1), |_| "db".to_owned())
            .unwrap()
            .remove(0);

        let value = span.clone().into_value();
        assert_eq!(value["parent_span_id"], "T");
        assert_eq!(value["op"], "db");
        assert_eq!(value["span_id"], span.span_id.as_str());
        assert_eq!(serde_json::from_value::<Span>(value).unwrap(), span);
    }
}
