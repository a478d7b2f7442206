//! Span-by-span comparison of two replay results.

use crate::result::{ReplayResult, ReplayedSpan};
use crate::similarity::{SimilarityEngine, SimilarityMethod};
use indexmap::IndexMap;
use rewind_core::SpanId;
use rewind_core::time::duration_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

const COST_EPSILON: f64 = 1e-12;

/// Comparison settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Duration changes at or below this are not reported
    #[serde(with = "duration_ms")]
    pub duration_tolerance: Duration,
    /// Weight of the edit-distance ratio in fallback similarity
    pub sequence_weight: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            duration_tolerance: Duration::ZERO,
            sequence_weight: 0.5,
        }
    }
}

/// How a span differs between the two results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Present in both, field changed
    Changed,
    /// Only in the modified result
    Added,
    /// Only in the original result
    Removed,
}

/// One changed field of one span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanDifference {
    /// Span id
    pub span_id: SpanId,
    /// Operation name
    pub name: String,
    /// Kind of change
    pub change: ChangeKind,
    /// Field name; `span` for added and removed entries
    pub field: String,
    /// Value in the original result
    pub original_value: Value,
    /// Value in the modified result
    pub new_value: Value,
    /// Textual similarity, only for `output`.
    ///
    /// Outputs are compared as JSON but scored as text, so a change of type
    /// alone (`"3"` to `3`) is a difference with similarity 1.0.
    pub similarity: Option<f64>,
    /// Signed numeric change, only for numeric fields with both sides known
    pub delta: Option<f64>,
}

/// Difference between an original and a modified replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayComparison {
    /// Baseline
    pub original: ReplayResult,
    /// Modified replay
    pub modified: ReplayResult,
    /// Differences ordered by original span order, then added spans
    pub differences: Vec<SpanDifference>,
    /// Output similarity of every paired span
    pub output_similarity: IndexMap<SpanId, f64>,
    /// Spans present on both sides
    pub spans_compared: usize,
    /// Paired spans with no changed field
    pub identical: usize,
    /// Paired spans with at least one changed field
    pub changed: usize,
    /// Spans only in the modified result
    pub added: usize,
    /// Spans only in the original result
    pub removed: usize,
    /// Modified minus original total tokens
    pub token_delta: i64,
    /// Modified minus original total cost
    pub cost_delta: f64,
    /// Modified minus original total duration, in milliseconds
    pub duration_delta_ms: f64,
    /// Whether a semantic backend scored any output
    pub semantic_used: bool,
    /// Whether the fallback scorer scored any output
    pub sequence_used: bool,
}

impl ReplayComparison {
    /// Whether the results are equivalent
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.differences.is_empty()
    }

    /// Mean output similarity over paired spans, 1.0 if none were paired
    #[must_use]
    pub fn average_similarity(&self) -> f64 {
        if self.output_similarity.is_empty() {
            return 1.0;
        }
        self.output_similarity.values().sum::<f64>() / self.output_similarity.len() as f64
    }

    /// Deterministic text report
    #[must_use]
    pub fn generate_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Replay comparison for trace {}", self.original.trace_id);
        let _ = writeln!(
            out,
            "Spans compared: {} (identical: {}, changed: {}, added: {}, removed: {})",
            self.spans_compared, self.identical, self.changed, self.added, self.removed
        );
        let _ = writeln!(
            out,
            "Tokens: {} -> {} ({:+})",
            self.original.total_tokens, self.modified.total_tokens, self.token_delta
        );
        let _ = writeln!(
            out,
            "Cost: ${:.6} -> ${:.6} ({:+.6})",
            self.original.total_cost, self.modified.total_cost, self.cost_delta
        );
        let _ = writeln!(out, "Duration delta: {:+.1}ms", self.duration_delta_ms);
        let method = match (self.semantic_used, self.sequence_used) {
            (true, true) => "semantic, sequence",
            (true, false) => "semantic",
            (false, true) => "sequence",
            (false, false) => "exact",
        };
        let _ = writeln!(
            out,
            "Output similarity: {:.3} ({})",
            self.average_similarity(),
            method
        );

        if self.differences.is_empty() {
            let _ = writeln!(out, "No differences");
            return out;
        }

        let _ = writeln!(out, "Changes:");
        let mut current: Option<&SpanId> = None;
        let mut line = String::new();
        for diff in &self.differences {
            if current != Some(&diff.span_id) {
                if !line.is_empty() {
                    let _ = writeln!(out, "{}", line);
                }
                current = Some(&diff.span_id);
                line = format!("  [{}] {}:", diff.span_id, diff.name);
            } else {
                line.push(';');
            }
            line.push(' ');
            line.push_str(&describe(diff));
        }
        if !line.is_empty() {
            let _ = writeln!(out, "{}", line);
        }
        out
    }
}

fn describe(diff: &SpanDifference) -> String {
    match diff.change {
        ChangeKind::Added => "added".to_string(),
        ChangeKind::Removed => "removed".to_string(),
        ChangeKind::Changed => match (diff.field.as_str(), diff.similarity, diff.delta) {
            ("output", Some(similarity), _) => format!("output changed (similarity {:.3})", similarity),
            ("cost", _, Some(delta)) => format!(
                "cost {} -> {} ({:+.6})",
                diff.original_value, diff.new_value, delta
            ),
            (field, _, Some(delta)) => format!(
                "{} {} -> {} ({:+})",
                field, diff.original_value, diff.new_value, delta
            ),
            (field, _, None) => format!("{} {} -> {}", field, diff.original_value, diff.new_value),
        },
    }
}

/// Output rendered as text for similarity scoring
fn output_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cost_changed(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() > COST_EPSILON,
        (None, None) => false,
        _ => true,
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

/// Pairs replayed spans by id and reports what changed
#[derive(Debug, Clone, Default)]
pub struct ComparisonReporter {
    similarity: SimilarityEngine,
    config: ComparisonConfig,
}

impl ComparisonReporter {
    /// Reporter with the built-in similarity tiers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comparison config
    #[must_use]
    pub fn with_config(mut self, config: ComparisonConfig) -> Self {
        self.similarity = self.similarity.with_sequence_weight(config.sequence_weight);
        self.config = config;
        self
    }

    /// Set the similarity engine
    #[must_use]
    pub fn with_similarity(mut self, engine: SimilarityEngine) -> Self {
        self.similarity = engine.with_sequence_weight(self.config.sequence_weight);
        self
    }

    /// Compare a baseline against a modified replay
    pub async fn compare(&self, original: &ReplayResult, modified: &ReplayResult) -> ReplayComparison {
        let by_id: HashMap<&SpanId, &ReplayedSpan> =
            modified.spans.iter().map(|s| (&s.span_id, s)).collect();

        let mut comparison = ReplayComparison {
            original: original.clone(),
            modified: modified.clone(),
            differences: Vec::new(),
            output_similarity: IndexMap::new(),
            spans_compared: 0,
            identical: 0,
            changed: 0,
            added: 0,
            removed: 0,
            token_delta: modified.total_tokens as i64 - original.total_tokens as i64,
            cost_delta: modified.total_cost - original.total_cost,
            duration_delta_ms: millis(modified.total_duration) - millis(original.total_duration),
            semantic_used: false,
            sequence_used: false,
        };

        for before in &original.spans {
            match by_id.get(&before.span_id) {
                Some(after) => {
                    comparison.spans_compared += 1;
                    let found = comparison.differences.len();
                    self.compare_pair(before, after, &mut comparison).await;
                    if comparison.differences.len() == found {
                        comparison.identical += 1;
                    } else {
                        comparison.changed += 1;
                    }
                }
                None => {
                    comparison.removed += 1;
                    comparison.differences.push(SpanDifference {
                        span_id: before.span_id.clone(),
                        name: before.name.clone(),
                        change: ChangeKind::Removed,
                        field: "span".to_string(),
                        original_value: before.output.clone(),
                        new_value: Value::Null,
                        similarity: None,
                        delta: None,
                    });
                }
            }
        }

        let originals: HashSet<&SpanId> =
            original.spans.iter().map(|s| &s.span_id).collect();
        for after in modified.spans.iter().filter(|s| !originals.contains(&s.span_id)) {
            comparison.added += 1;
            comparison.differences.push(SpanDifference {
                span_id: after.span_id.clone(),
                name: after.name.clone(),
                change: ChangeKind::Added,
                field: "span".to_string(),
                original_value: Value::Null,
                new_value: after.output.clone(),
                similarity: None,
                delta: None,
            });
        }

        debug!(
            compared = comparison.spans_compared,
            differences = comparison.differences.len(),
            "comparison finished"
        );
        comparison
    }

    async fn compare_pair(
        &self,
        before: &ReplayedSpan,
        after: &ReplayedSpan,
        comparison: &mut ReplayComparison,
    ) {
        let mut push = |field: &str, original_value: Value, new_value: Value, similarity, delta| {
            comparison.differences.push(SpanDifference {
                span_id: before.span_id.clone(),
                name: before.name.clone(),
                change: ChangeKind::Changed,
                field: field.to_string(),
                original_value,
                new_value,
                similarity,
                delta,
            });
        };

        if before.status != after.status {
            push(
                "status",
                Value::String(before.status.to_string()),
                Value::String(after.status.to_string()),
                None,
                None,
            );
        }

        let similarity = if before.output == after.output {
            1.0
        } else {
            let score = self
                .similarity
                .compare(&output_text(&before.output), &output_text(&after.output))
                .await;
            match score.method {
                SimilarityMethod::Semantic => comparison.semantic_used = true,
                SimilarityMethod::Sequence => comparison.sequence_used = true,
                SimilarityMethod::Exact => {}
            }
            push(
                "output",
                before.output.clone(),
                after.output.clone(),
                Some(score.score),
                None,
            );
            score.score
        };
        comparison
            .output_similarity
            .insert(before.span_id.clone(), similarity);

        if before.tokens != after.tokens {
            let delta = before
                .tokens
                .zip(after.tokens)
                .map(|(a, b)| b as f64 - a as f64);
            push("tokens", Value::from(before.tokens), Value::from(after.tokens), None, delta);
        }

        if cost_changed(before.cost, after.cost) {
            let delta = before.cost.zip(after.cost).map(|(a, b)| b - a);
            push("cost", Value::from(before.cost), Value::from(after.cost), None, delta);
        }

        let delta_ms = millis(after.duration) - millis(before.duration);
        if after.duration.abs_diff(before.duration) > self.config.duration_tolerance {
            push(
                "duration",
                Value::from(millis(before.duration)),
                Value::from(millis(after.duration)),
                None,
                Some(delta_ms),
            );
        }

        let before_error = before.error.as_ref().map(ToString::to_string);
        let after_error = after.error.as_ref().map(ToString::to_string);
        if before_error != after_error {
            push("error", Value::from(before_error), Value::from(after_error), None, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::result::SpanError;
    use crate::similarity::SemanticBackend;
    use async_trait::async_trait;
    use rewind_core::{OperationType, SpanStatus, TraceId};
    use rewind_tool::ExecutionError;
    use serde_json::{Map, json};
    use std::sync::Arc;

    fn span(id: &str, output: Value, tokens: Option<u64>, cost: Option<f64>) -> ReplayedSpan {
        ReplayedSpan {
            span_id: SpanId::new(id),
            parent_span_id: None,
            depth: 0,
            name: format!("op-{id}"),
            operation_type: OperationType::Llm,
            action: ActionKind::Cached,
            status: SpanStatus::Success,
            output,
            duration: Duration::from_millis(100),
            tokens,
            cost,
            attributes: Map::new(),
            error: None,
            retry_count: 0,
        }
    }

    fn result(spans: Vec<ReplayedSpan>) -> ReplayResult {
        ReplayResult::new(TraceId::new("t1"), spans)
    }

    fn baseline() -> ReplayResult {
        result(vec![
            span("1", json!("the cat sat"), Some(10), Some(0.01)),
            span("2", json!({"rows": 3}), None, None),
            span("3", json!("done"), Some(5), Some(0.005)),
        ])
    }

    struct Constant;

    #[async_trait]
    impl SemanticBackend for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        async fn similarity(&self, _a: &str, _b: &str) -> Result<f64, ExecutionError> {
            Ok(0.9)
        }
    }

    #[tokio::test]
    async fn test_type_only_output_change() {
        let before = result(vec![span("1", json!("3"), None, None)]);
        let after = result(vec![span("1", json!(3), None, None)]);
        let comparison = ComparisonReporter::new().compare(&before, &after).await;

        assert!(!comparison.is_identical());
        assert_eq!(comparison.changed, 1);
        assert_eq!(comparison.differences.len(), 1);
        let diff = &comparison.differences[0];
        assert_eq!(diff.field, "output");
        assert_eq!(diff.similarity, Some(1.0));
        assert!(!comparison.sequence_used);
    }

    #[tokio::test]
    async fn test_compare_identical() {
        let reporter = ComparisonReporter::new();
        let r = baseline();
        let comparison = reporter.compare(&r, &r).await;

        assert!(comparison.is_identical());
        assert_eq!(comparison.spans_compared, 3);
        assert_eq!(comparison.identical, 3);
        assert_eq!(comparison.changed, 0);
        assert!(comparison.output_similarity.values().all(|s| *s == 1.0));
        assert_eq!(comparison.token_delta, 0);
        assert_eq!(comparison.cost_delta, 0.0);
        assert!(!comparison.semantic_used);
        assert!(comparison.generate_summary().contains("No differences"));
    }

    #[tokio::test]
    async fn test_compare_changed_fields_in_order() {
        let mut modified = baseline();
        let s = &mut modified.spans[0];
        s.output = json!("the cat sat down");
        s.tokens = Some(25);
        s.cost = Some(0.02);
        s.action = ActionKind::Executed;
        let modified = result(modified.spans);

        let comparison = ComparisonReporter::new().compare(&baseline(), &modified).await;
        let fields: Vec<&str> = comparison.differences.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["output", "tokens", "cost"]);
        assert_eq!(comparison.changed, 1);
        assert_eq!(comparison.identical, 2);
        assert_eq!(comparison.token_delta, 15);
        assert!((comparison.cost_delta - 0.01).abs() < 1e-12);

        let output = &comparison.differences[0];
        let similarity = output.similarity.unwrap();
        assert!(similarity > 0.5 && similarity < 1.0);
        assert_eq!(comparison.differences[1].delta, Some(15.0));
        assert!(comparison.sequence_used);
    }

    #[tokio::test]
    async fn test_compare_status_and_error() {
        let mut spans = baseline().spans;
        spans[1].status = SpanStatus::Error;
        spans[1].output = Value::Null;
        spans[1].error = Some(SpanError::from(&ExecutionError::status(401, "unauthorized")));
        let comparison = ComparisonReporter::new().compare(&baseline(), &result(spans)).await;

        let fields: Vec<&str> = comparison.differences.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "output", "error"]);
        assert_eq!(comparison.differences[0].original_value, json!("SUCCESS"));
        assert_eq!(comparison.differences[0].new_value, json!("ERROR"));
        assert_eq!(comparison.differences[2].new_value, json!("status_401: unauthorized"));
    }

    #[tokio::test]
    async fn test_added_and_removed_are_reported() {
        let mut spans = baseline().spans;
        spans.remove(1);
        spans.push(span("4", json!("extra"), None, None));
        let comparison = ComparisonReporter::new().compare(&baseline(), &result(spans)).await;

        assert_eq!(comparison.removed, 1);
        assert_eq!(comparison.added, 1);
        assert_eq!(comparison.spans_compared, 2);
        let kinds: Vec<(&str, ChangeKind)> = comparison
            .differences
            .iter()
            .map(|d| (d.span_id.as_str(), d.change))
            .collect();
        assert_eq!(kinds, vec![("2", ChangeKind::Removed), ("4", ChangeKind::Added)]);
    }

    #[tokio::test]
    async fn test_duration_tolerance() {
        let mut spans = baseline().spans;
        spans[2].duration = Duration::from_millis(140);

        let strict = ComparisonReporter::new().compare(&baseline(), &result(spans.clone())).await;
        assert_eq!(strict.differences.len(), 1);
        assert_eq!(strict.differences[0].field, "duration");
        assert!((strict.differences[0].delta.unwrap() - 40.0).abs() < 1e-6);

        let lenient = ComparisonReporter::new()
            .with_config(ComparisonConfig {
                duration_tolerance: Duration::from_millis(50),
                ..ComparisonConfig::default()
            })
            .compare(&baseline(), &result(spans))
            .await;
        assert!(lenient.is_identical());
    }

    #[tokio::test]
    async fn test_semantic_backend_flag() {
        let reporter = ComparisonReporter::new()
            .with_similarity(SimilarityEngine::new().with_backend(Arc::new(Constant)));
        let mut spans = baseline().spans;
        spans[2].output = json!("finished");
        let comparison = reporter.compare(&baseline(), &result(spans)).await;

        assert!(comparison.semantic_used);
        assert!(!comparison.sequence_used);
        assert_eq!(comparison.differences[0].similarity, Some(0.9));
    }

    #[tokio::test]
    async fn test_summary_is_deterministic() {
        let mut spans = baseline().spans;
        spans[0].tokens = Some(12);
        spans.push(span("4", json!("extra"), None, None));
        let modified = result(spans);
        let reporter = ComparisonReporter::new();

        let first = reporter.compare(&baseline(), &modified).await.generate_summary();
        let second = reporter.compare(&baseline(), &modified).await.generate_summary();
        assert_eq!(first, second);
        assert!(first.contains("Spans compared: 3 (identical: 2, changed: 1, added: 1, removed: 0)"));
        assert!(first.contains("  [1] op-1: tokens 10 -> 12 (+2)"));
        assert!(first.contains("  [4] op-4: added"));
    }
}
