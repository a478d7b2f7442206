//! Rewind Replay Engine
//!
//! Loads captured traces, replays them from cache or selectively against
//! live capabilities, and compares the results span by span.
//!
//! Typical flow: [`TraceLoader`] builds a [`rewind_core::Trace`],
//! [`ReplayEngine`] produces a [`ReplayResult`] for a baseline and for a
//! modified run, and [`ComparisonReporter`] diffs the two.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod action;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod params;
pub mod result;
pub mod retry;
pub mod similarity;
pub mod trace;

pub use action::{ActionKind, ExecutionTarget, PlannedAction, ReplayAction};
pub use config::{FailureMode, ModelPrice, ReplayConfig};
pub use diff::{ChangeKind, ComparisonConfig, ComparisonReporter, ReplayComparison, SpanDifference};
pub use engine::ReplayEngine;
pub use error::ReplayError;
pub use params::ReplayParams;
pub use result::{ReplayResult, ReplayedSpan, SpanError};
pub use retry::{Retried, RetryClass, RetryExecutor, RetryExhausted, RetryPolicy};
pub use similarity::{
    Embedder, EmbeddingSimilarity, SemanticBackend, SimilarityEngine, SimilarityMethod,
    SimilarityScore,
};
pub use trace::TraceLoader;
