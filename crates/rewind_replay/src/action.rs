//! Per-span action resolution.
//!
//! Decides, before any I/O, whether a span is mocked, executed live, or
//! served from its recording. Priority is mock, then execute, then cache.

use crate::params::ReplayParams;
use rewind_core::{OperationType, Span, SpanId};
use rewind_tool::{LlmRequest, RegistryError, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TEMPERATURE_EPSILON: f64 = 1e-9;

/// Live call to make for an executed span
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionTarget {
    /// LLM completion with the modified request
    Llm(LlmRequest),
    /// Registered tool with the recorded arguments
    Tool {
        /// Tool name
        name: String,
        /// Recorded arguments
        input: Value,
    },
    /// Retrieval backend query
    Retrieval {
        /// Recorded query text, empty if none was captured
        query: String,
        /// Result count
        top_k: usize,
    },
}

/// Resolved action for one span
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayAction {
    /// Caller-supplied output
    Mock(Value),
    /// Re-invoke the real capability
    Execute(ExecutionTarget),
    /// Reuse the recorded output
    Cache,
}

impl ReplayAction {
    /// Outcome kind this action produces
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Mock(_) => ActionKind::Mocked,
            Self::Execute(_) => ActionKind::Executed,
            Self::Cache => ActionKind::Cached,
        }
    }
}

/// How a replayed span got its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Recorded output reused
    Cached,
    /// Caller-supplied output
    Mocked,
    /// Live call made
    Executed,
    /// Not run because an ancestor failed
    Skipped,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Mocked => write!(f, "mocked"),
            Self::Executed => write!(f, "executed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Capabilities available to a replay
#[derive(Debug, Clone, Copy)]
pub struct Capabilities<'a> {
    /// Registered tools
    pub tools: &'a ToolRegistry,
    /// Whether an LLM provider is configured
    pub has_llm: bool,
    /// Whether a retrieval backend is configured
    pub has_retrieval: bool,
    /// Result count for retrieval spans without a recorded one
    pub default_top_k: usize,
}

/// Resolve the action for one span.
///
/// Unlisted or unregistered names fall back to cache. Forcing a name that is
/// blocked or has no capability is an error.
///
/// # Errors
///
/// Returns a registry error if execution is forced for a blocked or
/// unregistered name, or an LLM span needs a provider that is missing
pub fn resolve(
    span: &Span,
    params: &ReplayParams,
    caps: &Capabilities<'_>,
) -> Result<ReplayAction, RegistryError> {
    if let Some(output) = params.mocks.get(&span.name) {
        return Ok(ReplayAction::Mock(output.clone()));
    }

    match span.operation_type {
        OperationType::Llm => resolve_llm(span, params, caps),
        OperationType::Tool => {
            let registered = caps.tools.contains(&span.name);
            let execute = gate(span, params, params.enable_tools, registered, || {
                RegistryError::NotRegistered {
                    name: span.name.clone(),
                }
            })?;
            if !execute {
                return Ok(ReplayAction::Cache);
            }
            Ok(ReplayAction::Execute(ExecutionTarget::Tool {
                name: span.name.clone(),
                input: span.tool_input(),
            }))
        }
        OperationType::Retrieval => {
            let execute = gate(span, params, params.enable_retrieval, caps.has_retrieval, || {
                RegistryError::MissingRetrievalBackend {
                    name: span.name.clone(),
                }
            })?;
            if !execute {
                return Ok(ReplayAction::Cache);
            }
            Ok(ReplayAction::Execute(ExecutionTarget::Retrieval {
                query: span.retrieval_query().unwrap_or_default().to_string(),
                top_k: span.retrieval_top_k().unwrap_or(caps.default_top_k),
            }))
        }
        OperationType::Embedding | OperationType::Agent | OperationType::Custom => {
            Ok(ReplayAction::Cache)
        }
    }
}

/// Shared tool/retrieval gate, `true` means execute
fn gate(
    span: &Span,
    params: &ReplayParams,
    enabled: bool,
    available: bool,
    missing: impl FnOnce() -> RegistryError,
) -> Result<bool, RegistryError> {
    let forced = params.force_execute.contains(&span.name);
    if params.blocklist.contains(&span.name) {
        return if forced {
            Err(RegistryError::Blocked {
                name: span.name.clone(),
            })
        } else {
            Ok(false)
        };
    }
    if forced {
        return if available { Ok(true) } else { Err(missing()) };
    }
    Ok(enabled && available && params.permits(&span.name))
}

fn resolve_llm(
    span: &Span,
    params: &ReplayParams,
    caps: &Capabilities<'_>,
) -> Result<ReplayAction, RegistryError> {
    if !params.enable_llm || !llm_request_changed(span, params) {
        return Ok(ReplayAction::Cache);
    }
    if !caps.has_llm {
        return Err(RegistryError::MissingLlmProvider {
            span_id: span.span_id.to_string(),
        });
    }
    Ok(ReplayAction::Execute(ExecutionTarget::Llm(LlmRequest {
        model: params
            .model
            .as_deref()
            .or(span.recorded_model())
            .unwrap_or_default()
            .to_string(),
        prompt: span.recorded_prompt().cloned().unwrap_or(Value::Null),
        system_prompt: params
            .system_prompt
            .as_deref()
            .or(span.recorded_system_prompt())
            .map(str::to_string),
        temperature: params.temperature.or(span.recorded_temperature()),
        max_tokens: params.max_tokens.or(span.recorded_max_tokens()),
    })))
}

/// Whether any set request parameter differs from what the span recorded
#[must_use]
pub fn llm_request_changed(span: &Span, params: &ReplayParams) -> bool {
    let model = params
        .model
        .as_deref()
        .is_some_and(|m| span.recorded_model() != Some(m));
    let temperature = params.temperature.is_some_and(|t| {
        span.recorded_temperature()
            .is_none_or(|recorded| (recorded - t).abs() > TEMPERATURE_EPSILON)
    });
    let system_prompt = params
        .system_prompt
        .as_deref()
        .is_some_and(|p| span.recorded_system_prompt() != Some(p));
    let max_tokens = params
        .max_tokens
        .is_some_and(|n| span.recorded_max_tokens() != Some(n));
    model || temperature || system_prompt || max_tokens
}

/// One row of a dry-run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Span id
    pub span_id: SpanId,
    /// Operation name
    pub name: String,
    /// Operation category
    pub operation_type: OperationType,
    /// Distance from the root
    pub depth: usize,
    /// Resolved action
    pub action: ActionKind,
}
