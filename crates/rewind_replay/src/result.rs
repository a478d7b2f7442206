//! Replay output types.

use crate::action::ActionKind;
use rewind_core::time::duration_ms;
use rewind_core::{OperationType, SpanId, SpanStatus, TraceId};
use rewind_tool::ExecutionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Error kind recorded on spans skipped because an ancestor failed
pub const SKIPPED_KIND: &str = "skipped";

/// Failure recorded on a replayed span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanError {
    /// Error class, e.g. `status_503`, `timeout`, `permanent`, `skipped`
    pub kind: String,
    /// Human-readable detail
    pub message: String,
}

impl SpanError {
    /// Marker for a span not run because `ancestor` failed
    #[must_use]
    pub fn skipped(ancestor: &SpanId) -> Self {
        Self {
            kind: SKIPPED_KIND.to_string(),
            message: format!("ancestor span {} failed", ancestor),
        }
    }
}

impl From<&ExecutionError> for SpanError {
    fn from(err: &ExecutionError) -> Self {
        Self {
            kind: err.kind.to_string(),
            message: err.message.clone(),
        }
    }
}

impl std::fmt::Display for SpanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of replaying one span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedSpan {
    /// Span id
    pub span_id: SpanId,
    /// Parent span id
    pub parent_span_id: Option<SpanId>,
    /// Distance from the root
    pub depth: usize,
    /// Operation name
    pub name: String,
    /// Operation category
    pub operation_type: OperationType,
    /// How the output was obtained
    pub action: ActionKind,
    /// Replay status
    pub status: SpanStatus,
    /// Output value, `Null` on failure
    pub output: Value,
    /// Time taken; recorded duration for cached spans
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Tokens consumed
    pub tokens: Option<u64>,
    /// Cost in USD
    pub cost: Option<f64>,
    /// Span attributes
    pub attributes: Map<String, Value>,
    /// Failure, if the span did not produce an output
    pub error: Option<SpanError>,
    /// Retries spent on a live call
    pub retry_count: u32,
}

impl ReplayedSpan {
    /// Whether the span ended in error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == SpanStatus::Error
    }
}

/// Complete result of one replay invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Replayed trace
    pub trace_id: TraceId,
    /// Spans in depth-first order
    pub spans: Vec<ReplayedSpan>,
    /// Sum of span durations
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    /// Sum of known token counts
    pub total_tokens: u64,
    /// Sum of known costs
    pub total_cost: f64,
}

impl ReplayResult {
    /// Build a result and compute its totals
    #[must_use]
    pub fn new(trace_id: TraceId, spans: Vec<ReplayedSpan>) -> Self {
        let total_duration = spans.iter().map(|s| s.duration).sum();
        let total_tokens = spans.iter().filter_map(|s| s.tokens).sum();
        let total_cost = spans.iter().filter_map(|s| s.cost).sum();
        Self {
            trace_id,
            spans,
            total_duration,
            total_tokens,
            total_cost,
        }
    }

    /// Find a span by id
    #[must_use]
    pub fn get(&self, span_id: &SpanId) -> Option<&ReplayedSpan> {
        self.spans.iter().find(|s| &s.span_id == span_id)
    }

    /// Spans that ended in error
    pub fn failed(&self) -> impl Iterator<Item = &ReplayedSpan> {
        self.spans.iter().filter(|s| s.is_error())
    }

    /// Number of spans
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether no spans were replayed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Span counts per action kind
    #[must_use]
    pub fn count_by_action(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for span in &self.spans {
            *counts.entry(span.action.to_string()).or_insert(0) += 1;
        }
        counts
    }
}
