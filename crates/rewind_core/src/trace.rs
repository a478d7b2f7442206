//! Trace arena.
//!
//! Spans are stored flat in insertion order and linked by index through
//! `parent_span_id` lookups, so the tree carries no owning child pointers.

use crate::error::{CoreError, CoreResult};
use crate::id::{SpanId, TraceId};
use crate::span::{OperationType, Span};
use std::collections::{BTreeMap, HashMap};

/// All spans sharing one trace id, forming a forest. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    trace_id: TraceId,
    spans: Vec<Span>,
    index: HashMap<SpanId, usize>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    depths: Vec<usize>,
    roots: Vec<usize>,
}

impl Trace {
    /// Build and validate a trace from spans in insertion order
    ///
    /// # Errors
    ///
    /// Returns a validation error if a span belongs to another trace, a
    /// span id repeats, a parent is missing, or parents form a cycle
    pub fn new(trace_id: TraceId, spans: Vec<Span>) -> CoreResult<Self> {
        let mut index = HashMap::with_capacity(spans.len());
        for (i, span) in spans.iter().enumerate() {
            if span.trace_id != trace_id {
                return Err(CoreError::validation(
                    "trace_id",
                    format!(
                        "span {} belongs to trace {}, expected {}",
                        span.span_id, span.trace_id, trace_id
                    ),
                ));
            }
            if index.insert(span.span_id.clone(), i).is_some() {
                return Err(CoreError::validation(
                    "span_id",
                    format!("duplicate span id {}", span.span_id),
                ));
            }
        }

        let mut parents = vec![None; spans.len()];
        let mut children = vec![Vec::new(); spans.len()];
        let mut roots = Vec::new();
        for (i, span) in spans.iter().enumerate() {
            match &span.parent_span_id {
                None => roots.push(i),
                Some(parent_id) => {
                    let parent = *index.get(parent_id).ok_or_else(|| {
                        CoreError::validation(
                            "parent_span_id",
                            format!(
                                "span {} references missing parent {}",
                                span.span_id, parent_id
                            ),
                        )
                    })?;
                    parents[i] = Some(parent);
                    children[parent].push(i);
                }
            }
        }

        // Depths double as the reachability check: anything left unvisited
        // hangs off a parent cycle.
        let mut depths = vec![usize::MAX; spans.len()];
        let mut stack: Vec<(usize, usize)> = roots.iter().map(|&r| (r, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            depths[node] = depth;
            stack.extend(children[node].iter().map(|&c| (c, depth + 1)));
        }
        if let Some(orphan) = depths.iter().position(|&d| d == usize::MAX) {
            return Err(CoreError::validation(
                "parent_span_id",
                format!("span {} is part of a parent cycle", spans[orphan].span_id),
            ));
        }

        Ok(Self {
            trace_id,
            spans,
            index,
            parents,
            children,
            depths,
            roots,
        })
    }

    /// Trace id
    #[must_use]
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Number of spans
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the trace has no spans
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans in insertion order
    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Look up a span
    #[must_use]
    pub fn get(&self, id: &SpanId) -> Option<&Span> {
        self.index.get(id).map(|&i| &self.spans[i])
    }

    /// Root spans in insertion order
    pub fn roots(&self) -> impl Iterator<Item = &Span> {
        self.roots.iter().map(|&i| &self.spans[i])
    }

    /// Direct children of a span in insertion order
    pub fn children<'a>(&'a self, id: &SpanId) -> impl Iterator<Item = &'a Span> + use<'a> {
        self.index
            .get(id)
            .map(|&i| self.children[i].as_slice())
            .unwrap_or(&[])
            .iter()
            .map(|&c| &self.spans[c])
    }

    /// Parent of a span
    #[must_use]
    pub fn parent(&self, id: &SpanId) -> Option<&Span> {
        let i = *self.index.get(id)?;
        self.parents[i].map(|p| &self.spans[p])
    }

    /// Distance from the span's root, roots are at depth 0
    #[must_use]
    pub fn depth(&self, id: &SpanId) -> Option<usize> {
        self.index.get(id).map(|&i| self.depths[i])
    }

    /// Span counts per operation type
    #[must_use]
    pub fn count_by_type(&self) -> BTreeMap<OperationType, usize> {
        let mut counts = BTreeMap::new();
        for span in &self.spans {
            *counts.entry(span.operation_type).or_insert(0) += 1;
        }
        counts
    }

    /// Depth-first traversal in causal order.
    ///
    /// Each root is emitted (in insertion order) followed by its full subtree
    /// before the next root; siblings keep insertion order. Every call starts
    /// a fresh traversal.
    #[must_use]
    pub fn depth_first(&self) -> DepthFirst<'_> {
        DepthFirst {
            trace: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }
}

/// Lazy depth-first iterator over a trace
#[derive(Debug, Clone)]
pub struct DepthFirst<'a> {
    trace: &'a Trace,
    stack: Vec<usize>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a Span;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack
            .extend(self.trace.children[node].iter().rev().copied());
        Some(&self.trace.spans[node])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.stack.len(), Some(self.trace.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanRecord;
    use serde_json::json;

    fn span(id: &str, parent: Option<&str>) -> Span {
        let rec = SpanRecord::from_value(
            json!({
                "span_id": id,
                "trace_id": "t1",
                "parent_span_id": parent,
                "name": format!("op-{}", id),
                "span_type": "tool",
                "started_at": 1714564800
            }),
            0,
        )
        .unwrap();
        Span::from_record(rec, None).unwrap()
    }

    fn ids<'a>(iter: impl Iterator<Item = &'a Span>) -> Vec<&'a str> {
        iter.map(|s| s.span_id.as_str()).collect()
    }

    #[test]
    fn test_depth_first_order() {
        // a -> (b -> d, c), e
        let trace = Trace::new(
            TraceId::from("t1"),
            vec![
                span("a", None),
                span("b", Some("a")),
                span("c", Some("a")),
                span("d", Some("b")),
                span("e", None),
            ],
        )
        .unwrap();

        assert_eq!(ids(trace.depth_first()), vec!["a", "b", "d", "c", "e"]);
    }

    #[test]
    fn test_depth_first_is_restartable() {
        let trace = Trace::new(
            TraceId::from("t1"),
            vec![span("a", None), span("b", Some("a"))],
        )
        .unwrap();
        let first = ids(trace.depth_first());
        let second = ids(trace.depth_first());
        assert_eq!(first, second);
    }

    #[test]
    fn test_child_listed_before_parent() {
        // Exporters that flush on span end write children first.
        let trace = Trace::new(
            TraceId::from("t1"),
            vec![span("child", Some("root")), span("root", None)],
        )
        .unwrap();
        assert_eq!(ids(trace.depth_first()), vec!["root", "child"]);
        assert_eq!(trace.depth(&SpanId::from("child")), Some(1));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let err = Trace::new(TraceId::from("t1"), vec![span("a", Some("ghost"))]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_duplicate_span_rejected() {
        let err = Trace::new(TraceId::from("t1"), vec![span("a", None), span("a", None)])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = Trace::new(
            TraceId::from("t1"),
            vec![span("root", None), span("x", Some("y")), span("y", Some("x"))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_foreign_trace_rejected() {
        let err = Trace::new(TraceId::from("other"), vec![span("a", None)]).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_navigation() {
        let trace = Trace::new(
            TraceId::from("t1"),
            vec![span("a", None), span("b", Some("a")), span("c", Some("a"))],
        )
        .unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(ids(trace.roots()), vec!["a"]);
        assert_eq!(ids(trace.children(&SpanId::from("a"))), vec!["b", "c"]);
        assert_eq!(
            trace.parent(&SpanId::from("c")).map(|s| s.span_id.as_str()),
            Some("a")
        );
        assert!(trace.children(&SpanId::from("missing")).next().is_none());
        assert_eq!(trace.count_by_type().get(&OperationType::Tool), Some(&3));
    }

    #[test]
    fn test_empty_trace() {
        let trace = Trace::new(TraceId::from("t1"), Vec::new()).unwrap();
        assert!(trace.is_empty());
        assert_eq!(trace.depth_first().count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_depth_first_visits_parents_first(
            parents in proptest::collection::vec(proptest::option::of(0usize..64), 0..40)
        ) {
            let spans: Vec<Span> = parents
                .iter()
                .enumerate()
                .map(|(i, &parent)| {
                    let parent = parent.filter(|_| i > 0).map(|p| format!("s{}", p % i));
                    span(&format!("s{}", i), parent.as_deref())
                })
                .collect();
            let trace = Trace::new(TraceId::from("t1"), spans).unwrap();

            let order = ids(trace.depth_first());
            proptest::prop_assert_eq!(order.len(), trace.len());
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
            proptest::prop_assert_eq!(position.len(), trace.len());
            for span in trace.spans() {
                if let Some(parent) = &span.parent_span_id {
                    proptest::prop_assert!(position[parent.as_str()] < position[span.span_id.as_str()]);
                }
            }
        }
    }
}
