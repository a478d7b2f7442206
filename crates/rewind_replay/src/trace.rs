//! Trace loading from exported span records.
//!
//! Two persisted shapes are accepted: a single JSON document
//! `{"trace_id": ..., "spans": [...]}`, or one span record per line.

use rewind_core::{CoreError, CoreResult, Span, SpanRecord, Trace, TraceId};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Builds validated `Trace`s from raw records
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLoader;

impl TraceLoader {
    /// Load a trace file, detecting document or line-delimited form
    ///
    /// # Errors
    ///
    /// Returns a format error if the file is missing, empty, or unparseable,
    /// and a validation error if the records do not form a valid trace
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Trace> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let trace = Self::parse(&text)?;
        info!(
            path = %path.display(),
            trace_id = %trace.trace_id(),
            spans = trace.len(),
            "loaded trace"
        );
        Ok(trace)
    }

    /// Parse trace text in either persisted shape
    ///
    /// # Errors
    ///
    /// Same as [`TraceLoader::from_file`]
    pub fn parse(text: &str) -> CoreResult<Trace> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::format("trace input is empty"));
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) if value.get("spans").is_some() => {
                Self::from_document(value)
            }
            Ok(Value::Array(records)) => Self::from_span_list(records),
            Ok(record @ Value::Object(_)) => Self::from_span_list(vec![record]),
            Ok(other) => Err(CoreError::format(format!(
                "expected a trace document or span records, found {}",
                json_kind(&other)
            ))),
            // Several top-level values: one record per line
            Err(_) => Self::from_span_list(Self::parse_lines(text)?),
        }
    }

    fn parse_lines(text: &str) -> CoreResult<Vec<Value>> {
        let mut records = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| CoreError::format(format!("line {}: {}", n + 1, e)))?;
            if !value.is_object() {
                return Err(CoreError::format(format!(
                    "line {}: expected a span record, found {}",
                    n + 1,
                    json_kind(&value)
                )));
            }
            records.push(value);
        }
        Ok(records)
    }

    /// Build from a `{trace_id, spans}` document.
    ///
    /// Spans may omit `trace_id` and inherit the document's. An empty
    /// `spans` array yields an empty trace.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `trace_id` or `spans` is absent, a record
    /// is malformed, or the spans do not form a valid tree
    pub fn from_document(data: Value) -> CoreResult<Trace> {
        let Value::Object(mut document) = data else {
            return Err(CoreError::validation("document", "expected a JSON object"));
        };
        let trace_id = match document.get("trace_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => TraceId::new(id),
            _ => return Err(CoreError::validation("trace_id", "missing trace_id")),
        };
        let Some(Value::Array(records)) = document.remove("spans") else {
            return Err(CoreError::validation("spans", "missing spans array"));
        };
        Self::build(trace_id, records)
    }

    /// Build from a flat list of span records.
    ///
    /// The first record picks the trace id; records of other traces are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the list is empty, the first record has
    /// no trace id, or the selected spans do not form a valid tree
    pub fn from_span_list(records: Vec<Value>) -> CoreResult<Trace> {
        let first = records
            .first()
            .ok_or_else(|| CoreError::validation("spans", "no span records"))?;
        let trace_id = match first.get("trace_id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => TraceId::new(id),
            _ => {
                return Err(CoreError::validation(
                    "spans[0].trace_id",
                    "first record has no trace_id",
                ));
            }
        };

        let total = records.len();
        let selected: Vec<Value> = records
            .into_iter()
            .filter(|r| r.get("trace_id").and_then(Value::as_str) == Some(trace_id.as_str()))
            .collect();
        if selected.len() < total {
            debug!(
                trace_id = %trace_id,
                dropped = total - selected.len(),
                "ignoring records from other traces"
            );
        }
        Self::build(trace_id, selected)
    }

    fn build(trace_id: TraceId, records: Vec<Value>) -> CoreResult<Trace> {
        let spans = records
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let record = SpanRecord::from_value(value, i)?;
                Span::from_record(record, Some(&trace_id))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        Trace::new(trace_id, spans)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
