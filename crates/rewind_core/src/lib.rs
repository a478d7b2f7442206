//! Rewind Core Types
//!
//! The captured-trace data model: spans, the trace arena, ids, and time.
//! This crate contains pure types and logic with no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod span;
pub mod time;
pub mod trace;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{SpanId, TraceId};
pub use span::{OperationType, Span, SpanEvent, SpanRecord, SpanStatus};
pub use time::Timestamp;
pub use trace::{DepthFirst, Trace};
