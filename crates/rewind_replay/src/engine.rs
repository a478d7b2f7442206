//! Replay engine for captured traces.
//!
//! A replay walks the trace depth-first. Each span's action is resolved up
//! front, so a forced execution that cannot run stops the request before any
//! live call is made. Spans are then finalized one at a time in traversal
//! order, which guarantees a parent's outcome exists before any of its
//! children start. Resolving ahead is only sound while `action::resolve`
//! ignores parent outcomes; if it ever reads them, resolve per span inside
//! the walk instead.

use crate::action::{self, ActionKind, Capabilities, ExecutionTarget, PlannedAction, ReplayAction};
use crate::config::{FailureMode, ReplayConfig};
use crate::error::ReplayError;
use crate::params::ReplayParams;
use crate::result::{ReplayResult, ReplayedSpan, SpanError};
use crate::retry::{RetryExecutor, RetryExhausted, Retried};
use futures::future::join_all;
use rewind_core::span::attrs;
use rewind_core::{Span, SpanId, SpanStatus, Trace};
use rewind_tool::{ExecutionError, LlmProvider, LlmRequest, RetrievalBackend, ToolRegistry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Kind recorded on cached spans that errored in the original run
const RECORDED_ERROR_KIND: &str = "recorded";

/// Value produced by a successful live call
#[derive(Debug)]
struct LiveOutput {
    output: Value,
    tokens: Option<u64>,
    cost: Option<f64>,
}

/// Replays traces against cached, mocked, and live capabilities
#[derive(Clone)]
pub struct ReplayEngine {
    config: ReplayConfig,
    retry: RetryExecutor,
    tools: ToolRegistry,
    llm: Option<Arc<dyn LlmProvider>>,
    retrieval: Option<Arc<dyn RetrievalBackend>>,
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine")
            .field("config", &self.config)
            .field("tools", &self.tools.list())
            .field("llm", &self.llm.as_ref().map(|p| p.name().to_string()))
            .field("retrieval", &self.retrieval.is_some())
            .finish()
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayEngine {
    /// Engine with default config and no capabilities
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ReplayConfig::default(),
            retry: RetryExecutor::default(),
            tools: ToolRegistry::new(),
            llm: None,
            retrieval: None,
        }
    }

    /// Set the configuration
    #[must_use]
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.retry = RetryExecutor::new(config.retry.clone());
        self.config = config;
        self
    }

    /// Set the tool registry
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Set the LLM provider
    #[must_use]
    pub fn with_llm_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    /// Set the retrieval backend
    #[must_use]
    pub fn with_retrieval_backend(mut self, backend: Arc<dyn RetrievalBackend>) -> Self {
        self.retrieval = Some(backend);
        self
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Registered tools
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities {
            tools: &self.tools,
            has_llm: self.llm.is_some(),
            has_retrieval: self.retrieval.is_some(),
            default_top_k: self.config.default_top_k,
        }
    }

    /// Replay every span from its recording. No live calls, deterministic.
    #[must_use]
    #[instrument(skip_all, fields(trace_id = %trace.trace_id(), spans = trace.len()))]
    pub fn replay_exact(&self, trace: &Trace) -> ReplayResult {
        let spans = trace
            .depth_first()
            .map(|span| cached(span, depth_of(trace, span)))
            .collect();
        ReplayResult::new(trace.trace_id().clone(), spans)
    }

    /// Resolve the action of every span without running anything
    ///
    /// # Errors
    ///
    /// Returns a registry error if a forced execution cannot run
    pub fn plan(
        &self,
        trace: &Trace,
        params: &ReplayParams,
    ) -> Result<Vec<PlannedAction>, ReplayError> {
        let caps = self.capabilities();
        trace
            .depth_first()
            .map(|span| -> Result<PlannedAction, ReplayError> {
                let action = action::resolve(span, params, &caps)?;
                Ok(PlannedAction {
                    span_id: span.span_id.clone(),
                    name: span.name.clone(),
                    operation_type: span.operation_type,
                    depth: depth_of(trace, span),
                    action: action.kind(),
                })
            })
            .collect()
    }

    /// Replay with modified parameters
    ///
    /// # Errors
    ///
    /// Returns a registry error if a forced execution cannot run. Live call
    /// failures are recorded on their spans instead.
    pub async fn replay_with_modifications(
        &self,
        trace: &Trace,
        params: &ReplayParams,
    ) -> Result<ReplayResult, ReplayError> {
        self.replay_with_callback(trace, params, |_| {}).await
    }

    /// Replay with modified parameters, reporting each span as it finalizes
    ///
    /// # Errors
    ///
    /// Same as [`ReplayEngine::replay_with_modifications`]
    #[instrument(skip_all, fields(trace_id = %trace.trace_id(), spans = trace.len()))]
    pub async fn replay_with_callback<F>(
        &self,
        trace: &Trace,
        params: &ReplayParams,
        mut on_span: F,
    ) -> Result<ReplayResult, ReplayError>
    where
        F: FnMut(&ReplayedSpan),
    {
        let caps = self.capabilities();
        let actions = trace
            .depth_first()
            .map(|span| action::resolve(span, params, &caps).map(|a| (span, a)))
            .collect::<Result<Vec<_>, _>>()?;

        let live = actions
            .iter()
            .filter(|(_, a)| matches!(a, ReplayAction::Execute(_)))
            .count();
        info!(live_calls = live, "starting modified replay");

        // Spans whose descendants must not run, with the span that failed
        let mut poisoned: HashMap<SpanId, SpanId> = HashMap::new();
        let mut spans = Vec::with_capacity(actions.len());

        for (span, action) in actions {
            let depth = depth_of(trace, span);
            let inherited = span
                .parent_span_id
                .as_ref()
                .and_then(|parent| poisoned.get(parent))
                .cloned();

            let replayed = match (inherited, action) {
                (Some(failed), _) => {
                    debug!(span_id = %span.span_id, failed = %failed, "skipping descendant of failed span");
                    poisoned.insert(span.span_id.clone(), failed.clone());
                    skipped(span, depth, &failed)
                }
                (None, ReplayAction::Cache) => cached(span, depth),
                (None, ReplayAction::Mock(output)) => mocked(span, depth, output),
                (None, ReplayAction::Execute(target)) => {
                    let replayed = self.execute(span, depth, target).await;
                    if replayed.is_error()
                        && self.config.failure_mode == FailureMode::SkipDescendants
                    {
                        poisoned.insert(span.span_id.clone(), span.span_id.clone());
                    }
                    replayed
                }
            };
            on_span(&replayed);
            spans.push(replayed);
        }

        let result = ReplayResult::new(trace.trace_id().clone(), spans);
        let failed = result.failed().filter(|s| s.action != ActionKind::Cached).count();
        info!(
            failed,
            total_tokens = result.total_tokens,
            total_cost = result.total_cost,
            "modified replay finished"
        );
        Ok(result)
    }

    /// Run independent replays of one trace concurrently, one result per
    /// parameter set, in input order
    pub async fn replay_variants(
        &self,
        trace: &Trace,
        variants: &[ReplayParams],
    ) -> Vec<Result<ReplayResult, ReplayError>> {
        join_all(
            variants
                .iter()
                .map(|params| self.replay_with_modifications(trace, params)),
        )
        .await
    }

    async fn execute(&self, span: &Span, depth: usize, target: ExecutionTarget) -> ReplayedSpan {
        let started = Instant::now();
        let mut attributes = span.attributes.clone();
        let outcome = match target {
            ExecutionTarget::Llm(request) => {
                overlay_request(&mut attributes, &request);
                self.execute_llm(request).await
            }
            ExecutionTarget::Tool { name, input } => self.execute_tool(&name, input).await,
            ExecutionTarget::Retrieval { query, top_k } => {
                self.execute_retrieval(&query, top_k).await
            }
        };
        let duration = started.elapsed();

        match outcome {
            Ok(retried) => {
                debug!(
                    span_id = %span.span_id,
                    retries = retried.retry_count(),
                    duration_ms = duration.as_millis() as u64,
                    "live call succeeded"
                );
                let retry_count = retried.retry_count();
                let live = retried.value;
                ReplayedSpan {
                    span_id: span.span_id.clone(),
                    parent_span_id: span.parent_span_id.clone(),
                    depth,
                    name: span.name.clone(),
                    operation_type: span.operation_type,
                    action: ActionKind::Executed,
                    status: SpanStatus::Success,
                    output: live.output,
                    duration,
                    tokens: live.tokens,
                    cost: live.cost,
                    attributes,
                    error: None,
                    retry_count,
                }
            }
            Err(failure) => {
                warn!(
                    span_id = %span.span_id,
                    name = %span.name,
                    error = %failure.error,
                    attempts = failure.attempts,
                    "live call failed, continuing replay"
                );
                ReplayedSpan {
                    span_id: span.span_id.clone(),
                    parent_span_id: span.parent_span_id.clone(),
                    depth,
                    name: span.name.clone(),
                    operation_type: span.operation_type,
                    action: ActionKind::Executed,
                    status: SpanStatus::Error,
                    output: Value::Null,
                    duration,
                    tokens: None,
                    cost: None,
                    attributes,
                    error: Some(SpanError::from(&failure.error)),
                    retry_count: failure.retry_count(),
                }
            }
        }
    }

    async fn execute_llm(&self, request: LlmRequest) -> Result<Retried<LiveOutput>, RetryExhausted> {
        let Some(provider) = self.llm.as_deref() else {
            return Err(not_attempted("no LLM provider configured"));
        };
        if request.model.is_empty() {
            return Err(not_attempted("no model recorded or requested"));
        }
        debug!(provider = provider.name(), model = %request.model, "calling LLM");

        let retried = self.retry.execute(|| provider.complete(&request)).await?;
        let Retried { value: response, attempts } = retried;
        let tokens = response.usage.map(|u| u.total());
        let cost = response.cost.or_else(|| {
            response.usage.and_then(|u| {
                self.config
                    .price(&request.model, u.prompt_tokens, u.completion_tokens)
            })
        });
        Ok(Retried {
            value: LiveOutput {
                output: Value::String(response.text),
                tokens,
                cost,
            },
            attempts,
        })
    }

    async fn execute_tool(
        &self,
        name: &str,
        input: Value,
    ) -> Result<Retried<LiveOutput>, RetryExhausted> {
        let tool = self
            .tools
            .get(name)
            .map_err(|e| not_attempted(e.to_string()))?;
        debug!(tool = name, "invoking tool");

        let retried = self.retry.execute(|| tool.invoke(&input)).await?;
        Ok(Retried {
            value: LiveOutput {
                output: retried.value,
                tokens: None,
                cost: None,
            },
            attempts: retried.attempts,
        })
    }

    async fn execute_retrieval(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Retried<LiveOutput>, RetryExhausted> {
        let Some(backend) = self.retrieval.as_deref() else {
            return Err(not_attempted("no retrieval backend configured"));
        };
        if query.is_empty() {
            return Err(not_attempted("retrieval span has no recorded query"));
        }
        debug!(query, top_k, "querying retrieval backend");

        let retried = self.retry.execute(|| backend.query(query, top_k)).await?;
        let output = serde_json::to_value(&retried.value).map_err(|e| RetryExhausted {
            error: ExecutionError::permanent(format!("unserializable documents: {}", e)),
            attempts: retried.attempts,
        })?;
        Ok(Retried {
            value: LiveOutput {
                output,
                tokens: None,
                cost: None,
            },
            attempts: retried.attempts,
        })
    }
}

fn not_attempted(message: impl Into<String>) -> RetryExhausted {
    RetryExhausted {
        error: ExecutionError::permanent(message),
        attempts: 0,
    }
}

fn depth_of(trace: &Trace, span: &Span) -> usize {
    trace.depth(&span.span_id).unwrap_or(0)
}

/// Record the request actually sent in place of the original parameters
fn overlay_request(attributes: &mut Map<String, Value>, request: &LlmRequest) {
    let mut set = |keys: &[&str], value: Value| {
        let key = keys
            .iter()
            .find(|k| attributes.contains_key(**k))
            .unwrap_or(&keys[0]);
        attributes.insert((*key).to_string(), value);
    };
    set(attrs::MODEL, Value::String(request.model.clone()));
    if let Some(t) = request.temperature {
        set(attrs::TEMPERATURE, Value::from(t));
    }
    if let Some(p) = &request.system_prompt {
        set(attrs::SYSTEM_PROMPT, Value::String(p.clone()));
    }
    if let Some(n) = request.max_tokens {
        set(attrs::MAX_TOKENS, Value::from(n));
    }
}

fn cached(span: &Span, depth: usize) -> ReplayedSpan {
    ReplayedSpan {
        span_id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone(),
        depth,
        name: span.name.clone(),
        operation_type: span.operation_type,
        action: ActionKind::Cached,
        status: span.status,
        output: span.recorded_output(),
        duration: span.duration(),
        tokens: span.recorded_tokens(),
        cost: span.recorded_cost(),
        attributes: span.attributes.clone(),
        error: span.recorded_error().map(|message| SpanError {
            kind: RECORDED_ERROR_KIND.to_string(),
            message,
        }),
        retry_count: 0,
    }
}

fn mocked(span: &Span, depth: usize, output: Value) -> ReplayedSpan {
    ReplayedSpan {
        span_id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone(),
        depth,
        name: span.name.clone(),
        operation_type: span.operation_type,
        action: ActionKind::Mocked,
        status: SpanStatus::Success,
        output,
        duration: Duration::ZERO,
        tokens: None,
        cost: None,
        attributes: span.attributes.clone(),
        error: None,
        retry_count: 0,
    }
}

fn skipped(span: &Span, depth: usize, failed: &SpanId) -> ReplayedSpan {
    ReplayedSpan {
        span_id: span.span_id.clone(),
        parent_span_id: span.parent_span_id.clone(),
        depth,
        name: span.name.clone(),
        operation_type: span.operation_type,
        action: ActionKind::Skipped,
        status: SpanStatus::Error,
        output: Value::Null,
        duration: Duration::ZERO,
        tokens: None,
        cost: None,
        attributes: span.attributes.clone(),
        error: Some(SpanError::skipped(failed)),
        retry_count: 0,
    }
}
