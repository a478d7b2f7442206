//! Terminal output for replay results.

use console::style;
use rewind_replay::{ActionKind, PlannedAction, ReplayResult, ReplayedSpan};
use serde_json::Value;

const PREVIEW_WIDTH: usize = 60;

fn action_label(action: ActionKind) -> String {
    let label = format!("{:<8}", action.to_string());
    match action {
        ActionKind::Cached => style(label).dim().to_string(),
        ActionKind::Mocked => style(label).cyan().to_string(),
        ActionKind::Executed => style(label).green().to_string(),
        ActionKind::Skipped => style(label).yellow().to_string(),
    }
}

fn preview(output: &Value) -> String {
    let text = match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let flat = text.replace('\n', " ");
    console::truncate_str(&flat, PREVIEW_WIDTH, "...").into_owned()
}

/// One line per replayed span, indented by depth
#[must_use]
pub fn span_line(span: &ReplayedSpan) -> String {
    let indent = "  ".repeat(span.depth);
    let detail = match &span.error {
        Some(err) => style(err.to_string()).red().to_string(),
        None => preview(&span.output),
    };
    let mut line = format!(
        "{}{} {} [{}] {}",
        indent,
        action_label(span.action),
        style(&span.name).bold(),
        span.operation_type,
        detail
    );
    if span.retry_count > 0 {
        line.push_str(&format!(" (retries: {})", span.retry_count));
    }
    line
}

/// One line per planned span
#[must_use]
pub fn plan_line(planned: &PlannedAction) -> String {
    format!(
        "{}{} {} [{}]",
        "  ".repeat(planned.depth),
        action_label(planned.action),
        style(&planned.name).bold(),
        planned.operation_type
    )
}

/// Closing totals for a replay
#[must_use]
pub fn result_summary(result: &ReplayResult) -> String {
    let counts = result
        .count_by_action()
        .iter()
        .map(|(action, n)| format!("{}={}", action, n))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "Trace {}: {} spans ({}), {} failed, {:.1}ms, {} tokens, ${:.4}",
        result.trace_id,
        result.len(),
        counts,
        result.failed().count(),
        result.total_duration.as_secs_f64() * 1000.0,
        result.total_tokens,
        result.total_cost
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::{OperationType, SpanId, SpanStatus, TraceId};
    use rewind_replay::SpanError;
    use serde_json::{Map, json};
    use std::time::Duration;

    fn replayed(action: ActionKind, output: Value, error: Option<SpanError>) -> ReplayedSpan {
        ReplayedSpan {
            span_id: SpanId::new("b"),
            parent_span_id: Some(SpanId::new("a")),
            depth: 1,
            name: "fetch".to_string(),
            operation_type: OperationType::Tool,
            action,
            status: if error.is_some() {
                SpanStatus::Error
            } else {
                SpanStatus::Success
            },
            output,
            duration: Duration::from_millis(250),
            tokens: Some(10),
            cost: Some(0.002),
            attributes: Map::new(),
            error,
            retry_count: 0,
        }
    }

    #[test]
    fn test_span_line() {
        let line = span_line(&replayed(ActionKind::Executed, json!("page body"), None));
        let plain = console::strip_ansi_codes(&line);
        assert!(plain.starts_with("  executed"));
        assert!(plain.contains("fetch [tool] page body"));
    }

    #[test]
    fn test_span_line_error() {
        let err = SpanError {
            kind: "status_503".to_string(),
            message: "unavailable".to_string(),
        };
        let mut span = replayed(ActionKind::Executed, Value::Null, Some(err));
        span.retry_count = 3;
        let plain = console::strip_ansi_codes(&span_line(&span)).into_owned();
        assert!(plain.ends_with("status_503: unavailable (retries: 3)"));
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        assert!(preview(&json!(long)).chars().count() <= PREVIEW_WIDTH);
        assert_eq!(preview(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[test]
    fn test_result_summary() {
        let result = ReplayResult::new(
            TraceId::new("t1"),
            vec![replayed(ActionKind::Cached, json!("x"), None)],
        );
        let summary = result_summary(&result);
        assert!(summary.starts_with("Trace t1: 1 spans (cached=1), 0 failed"));
        assert!(summary.contains("10 tokens"));
    }
}
