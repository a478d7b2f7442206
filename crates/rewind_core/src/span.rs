//! Span data model.
//!
//! A `SpanRecord` is the lenient wire shape an exporter writes; a `Span` is
//! the validated, immutable form the rest of the system reads.

use crate::error::{CoreError, CoreResult};
use crate::id::{SpanId, TraceId};
use crate::time::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Well-known attribute keys written by the instrumentation layer.
///
/// Lookups try keys in the order listed; the first present key wins.
pub mod attrs {
    /// Generic recorded output, checked before any type-specific key
    pub const OUTPUT: &str = "output";
    /// LLM completion text
    pub const LLM_RESPONSE: &str = "llm.response";
    /// Tool return value
    pub const TOOL_OUTPUT: &str = "tool.output";
    /// Retrieved documents
    pub const RETRIEVAL_DOCUMENTS: &str = "retrieval.documents";

    /// Total tokens
    pub const TOTAL_TOKENS: &[&str] = &["llm.usage.total_tokens", "llm.tokens.total", "tokens"];
    /// Prompt tokens
    pub const PROMPT_TOKENS: &[&str] = &["llm.usage.prompt_tokens", "llm.tokens.prompt"];
    /// Completion tokens
    pub const COMPLETION_TOKENS: &[&str] =
        &["llm.usage.completion_tokens", "llm.tokens.completion"];
    /// Cost in USD
    pub const COST: &[&str] = &["llm.cost", "cost"];

    /// Model name
    pub const MODEL: &[&str] = &["llm.model", "gen_ai.request.model", "model"];
    /// Sampling temperature
    pub const TEMPERATURE: &[&str] = &["llm.temperature", "gen_ai.request.temperature"];
    /// System prompt
    pub const SYSTEM_PROMPT: &[&str] = &["llm.system_prompt", "system_prompt"];
    /// Output length limit
    pub const MAX_TOKENS: &[&str] = &["llm.max_tokens", "gen_ai.request.max_tokens"];
    /// Prompt or chat messages
    pub const PROMPT: &[&str] = &["llm.messages", "llm.prompt", "input"];

    /// Tool arguments
    pub const TOOL_INPUT: &[&str] = &["tool.input", "input"];
    /// Retrieval query text
    pub const RETRIEVAL_QUERY: &[&str] = &["retrieval.query", "query"];
    /// Number of documents requested
    pub const RETRIEVAL_TOP_K: &str = "retrieval.top_k";

    /// Failure message of an errored span
    pub const ERROR_MESSAGE: &[&str] = &["error.message", "exception.message", "error"];
}

/// Category of work a span records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Language model call
    Llm,
    /// Tool invocation
    Tool,
    /// Retrieval query
    Retrieval,
    /// Embedding computation
    Embedding,
    /// Agent step or container
    Agent,
    /// Anything else
    #[default]
    Custom,
}

impl OperationType {
    /// Parse leniently: any case, unknown names map to `Custom`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "llm" | "chat" | "completion" => Self::Llm,
            "tool" | "function" => Self::Tool,
            "retrieval" | "retriever" => Self::Retrieval,
            "embedding" | "embeddings" => Self::Embedding,
            "agent" | "chain" => Self::Agent,
            _ => Self::Custom,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Retrieval => "retrieval",
            Self::Embedding => "embedding",
            Self::Agent => "agent",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|r| Self::parse(&r)).unwrap_or_default())
    }
}

/// Completion status of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// Not finished (or status never set)
    #[default]
    Pending,
    /// Completed successfully
    Success,
    /// Failed
    Error,
}

impl SpanStatus {
    /// Parse leniently
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" | "completed" => Self::Success,
            "error" | "failed" | "failure" => Self::Error,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl<'de> Deserialize<'de> for SpanStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|r| Self::parse(&r)).unwrap_or_default())
    }
}

/// Explicit `null` reads as the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamped event inside a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Event name
    pub name: String,
    /// When it happened
    pub timestamp: Timestamp,
    /// Event attributes
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
}

/// Span as written by an exporter, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct SpanRecord {
    /// Span id
    pub span_id: String,
    /// Trace id; document-form spans may omit it
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Parent span id; null or empty for roots
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// Operation name
    pub name: String,
    /// Operation category
    #[serde(default, alias = "operation_type", alias = "type")]
    pub span_type: OperationType,
    /// Completion status
    #[serde(default)]
    pub status: SpanStatus,
    /// Start time
    pub started_at: Timestamp,
    /// End time
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    /// Open attribute map
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Map<String, Value>,
    /// Ordered events
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<SpanEvent>,
}

impl SpanRecord {
    /// Parse a record from a JSON value
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the record position if a required
    /// field is absent or mistyped
    pub fn from_value(value: Value, position: usize) -> CoreResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::validation(format!("spans[{}]", position), e.to_string()))
    }
}

/// One timed unit of work. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    /// Span id
    pub span_id: SpanId,
    /// Owning trace
    pub trace_id: TraceId,
    /// Parent span, `None` for roots
    pub parent_span_id: Option<SpanId>,
    /// Operation name
    pub name: String,
    /// Operation category
    #[serde(rename = "span_type")]
    pub operation_type: OperationType,
    /// Completion status
    pub status: SpanStatus,
    /// Start time
    pub started_at: Timestamp,
    /// End time
    pub ended_at: Option<Timestamp>,
    /// Open attribute map
    pub attributes: Map<String, Value>,
    /// Ordered events
    pub events: Vec<SpanEvent>,
}

impl Span {
    /// Build from a wire record
    ///
    /// `default_trace` fills in a missing `trace_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the span id is empty or no trace id is available
    pub fn from_record(record: SpanRecord, default_trace: Option<&TraceId>) -> CoreResult<Self> {
        if record.span_id.is_empty() {
            return Err(CoreError::validation("span_id", "empty span id"));
        }
        let trace_id = match (record.trace_id, default_trace) {
            (Some(id), _) if !id.is_empty() => TraceId::new(id),
            (_, Some(default)) => default.clone(),
            _ => {
                return Err(CoreError::validation(
                    "trace_id",
                    format!("span {} has no trace id", record.span_id),
                ));
            }
        };
        let parent_span_id = record
            .parent_span_id
            .filter(|p| !p.is_empty())
            .map(SpanId::new);

        Ok(Self {
            span_id: SpanId::new(record.span_id),
            trace_id,
            parent_span_id,
            name: record.name,
            operation_type: record.span_type,
            status: record.status,
            started_at: record.started_at,
            ended_at: record.ended_at,
            attributes: record.attributes,
            events: record.events,
        })
    }

    /// Whether this span has no parent
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Recorded wall-clock duration, zero for unfinished spans
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ended_at
            .map(|end| end.duration_since(&self.started_at))
            .unwrap_or(Duration::ZERO)
    }

    /// Look up an attribute
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// First present attribute among `keys`
    #[must_use]
    pub fn first_attr(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|key| self.attr(key))
    }

    /// Output recorded during the original run, `Null` if none was captured
    #[must_use]
    pub fn recorded_output(&self) -> Value {
        let specific = match self.operation_type {
            OperationType::Llm => Some(attrs::LLM_RESPONSE),
            OperationType::Tool => Some(attrs::TOOL_OUTPUT),
            OperationType::Retrieval => Some(attrs::RETRIEVAL_DOCUMENTS),
            _ => None,
        };
        self.attr(attrs::OUTPUT)
            .or_else(|| specific.and_then(|key| self.attr(key)))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Tokens recorded during the original run
    #[must_use]
    pub fn recorded_tokens(&self) -> Option<u64> {
        if let Some(total) = self.first_attr(attrs::TOTAL_TOKENS).and_then(as_u64) {
            return Some(total);
        }
        let prompt = self.first_attr(attrs::PROMPT_TOKENS).and_then(as_u64);
        let completion = self.first_attr(attrs::COMPLETION_TOKENS).and_then(as_u64);
        match (prompt, completion) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
        }
    }

    /// Cost recorded during the original run
    #[must_use]
    pub fn recorded_cost(&self) -> Option<f64> {
        self.first_attr(attrs::COST).and_then(as_f64)
    }

    /// Model used by the original call
    #[must_use]
    pub fn recorded_model(&self) -> Option<&str> {
        self.first_attr(attrs::MODEL).and_then(Value::as_str)
    }

    /// Temperature used by the original call
    #[must_use]
    pub fn recorded_temperature(&self) -> Option<f64> {
        self.first_attr(attrs::TEMPERATURE).and_then(as_f64)
    }

    /// System prompt used by the original call
    #[must_use]
    pub fn recorded_system_prompt(&self) -> Option<&str> {
        self.first_attr(attrs::SYSTEM_PROMPT).and_then(Value::as_str)
    }

    /// Output length limit used by the original call
    #[must_use]
    pub fn recorded_max_tokens(&self) -> Option<u64> {
        self.first_attr(attrs::MAX_TOKENS).and_then(as_u64)
    }

    /// Prompt or message list sent by the original call
    #[must_use]
    pub fn recorded_prompt(&self) -> Option<&Value> {
        self.first_attr(attrs::PROMPT)
    }

    /// Arguments the original tool call received, `Null` if not captured
    #[must_use]
    pub fn tool_input(&self) -> Value {
        self.first_attr(attrs::TOOL_INPUT)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Query text of a retrieval span
    #[must_use]
    pub fn retrieval_query(&self) -> Option<&str> {
        self.first_attr(attrs::RETRIEVAL_QUERY).and_then(Value::as_str)
    }

    /// Requested result count of a retrieval span
    #[must_use]
    pub fn retrieval_top_k(&self) -> Option<usize> {
        self.attr(attrs::RETRIEVAL_TOP_K)
            .and_then(as_u64)
            .map(|k| k as usize)
    }

    /// Failure message recorded on an errored span
    #[must_use]
    pub fn recorded_error(&self) -> Option<String> {
        if self.status != SpanStatus::Error {
            return None;
        }
        let message = match self.first_attr(attrs::ERROR_MESSAGE) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self
                .events
                .iter()
                .find(|e| e.name == "exception")
                .and_then(|e| e.attributes.get("exception.message"))
                .and_then(Value::as_str)
                .unwrap_or("span recorded an error")
                .to_string(),
        };
        Some(message)
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SpanRecord {
        SpanRecord::from_value(value, 0).unwrap()
    }

    fn llm_span() -> Span {
        let rec = record(json!({
            "span_id": "s1",
            "trace_id": "t1",
            "parent_span_id": null,
            "name": "chat",
            "span_type": "LLM",
            "status": "ok",
            "started_at": "2024-05-01T12:00:00Z",
            "ended_at": "2024-05-01T12:00:01.250Z",
            "attributes": {
                "llm.model": "gpt-4",
                "llm.temperature": 0.2,
                "llm.response": "hello",
                "llm.usage.prompt_tokens": 10,
                "llm.usage.completion_tokens": 5,
                "llm.cost": "0.0021"
            }
        }));
        Span::from_record(rec, None).unwrap()
    }

    #[test]
    fn test_operation_type_parse() {
        assert_eq!(OperationType::parse("LLM"), OperationType::Llm);
        assert_eq!(OperationType::parse("Tool"), OperationType::Tool);
        assert_eq!(OperationType::parse("retrieval"), OperationType::Retrieval);
        assert_eq!(OperationType::parse("something"), OperationType::Custom);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(SpanStatus::parse("OK"), SpanStatus::Success);
        assert_eq!(SpanStatus::parse("error"), SpanStatus::Error);
        assert_eq!(SpanStatus::parse("unset"), SpanStatus::Pending);
    }

    #[test]
    fn test_span_from_record() {
        let span = llm_span();
        assert_eq!(span.span_id.as_str(), "s1");
        assert_eq!(span.operation_type, OperationType::Llm);
        assert_eq!(span.status, SpanStatus::Success);
        assert!(span.is_root());
        assert_eq!(span.duration(), Duration::from_millis(1250));
    }

    #[test]
    fn test_recorded_fields() {
        let span = llm_span();
        assert_eq!(span.recorded_output(), json!("hello"));
        assert_eq!(span.recorded_tokens(), Some(15));
        assert_eq!(span.recorded_cost(), Some(0.0021));
        assert_eq!(span.recorded_model(), Some("gpt-4"));
        assert_eq!(span.recorded_temperature(), Some(0.2));
        assert_eq!(span.recorded_system_prompt(), None);
    }

    #[test]
    fn test_generic_output_wins() {
        let rec = record(json!({
            "span_id": "s2",
            "trace_id": "t1",
            "name": "search",
            "span_type": "tool",
            "started_at": 1714564800,
            "attributes": {"output": "generic", "tool.output": "specific"}
        }));
        let span = Span::from_record(rec, None).unwrap();
        assert_eq!(span.recorded_output(), json!("generic"));
        assert_eq!(span.duration(), Duration::ZERO);
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let rec = record(json!({
            "span_id": "s3",
            "trace_id": "t1",
            "name": "step",
            "span_type": null,
            "status": null,
            "started_at": 1714564800,
            "ended_at": null,
            "attributes": null,
            "events": null
        }));
        let span = Span::from_record(rec, None).unwrap();
        assert_eq!(span.operation_type, OperationType::Custom);
        assert_eq!(span.status, SpanStatus::Pending);
        assert!(span.attributes.is_empty());
        assert!(span.events.is_empty());
    }

    #[test]
    fn test_recorded_error() {
        let mut span = Span::from_record(
            record(json!({
                "span_id": "s1",
                "trace_id": "t1",
                "name": "search",
                "status": "error",
                "started_at": 0,
                "events": [{
                    "name": "exception",
                    "timestamp": 1,
                    "attributes": {"exception.message": "boom"}
                }]
            })),
            None,
        )
        .unwrap();
        assert_eq!(span.recorded_error().as_deref(), Some("boom"));

        span.attributes.insert("error.message".to_string(), json!("quota exceeded"));
        assert_eq!(span.recorded_error().as_deref(), Some("quota exceeded"));

        span.status = SpanStatus::Success;
        assert_eq!(span.recorded_error(), None);
    }

    #[test]
    fn test_missing_trace_id_uses_default() {
        let rec = record(json!({
            "span_id": "s3",
            "parent_span_id": "",
            "name": "step",
            "started_at": 1714564800
        }));
        let default = TraceId::from("doc-trace");
        let span = Span::from_record(rec.clone(), Some(&default)).unwrap();
        assert_eq!(span.trace_id, default);
        assert!(span.parent_span_id.is_none());

        let err = Span::from_record(rec, None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_record_missing_name_is_validation_error() {
        let err = SpanRecord::from_value(json!({"span_id": "x", "started_at": 0}), 3).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("spans[3]"));
    }
}
