//! Rewind Capability Seams
//!
//! Interfaces to the live world a replay may call back into: a registry of
//! named tools, an LLM provider, and a retrieval backend. All of them are
//! supplied by the embedding application; rewind only invokes them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod error;
pub mod llm;
pub mod registry;
pub mod retrieval;
pub mod trait_;

pub use adapter::FnTool;
pub use error::{ExecutionError, ExecutionErrorKind, RegistryError};
pub use llm::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use registry::{ToolEntry, ToolRegistry};
pub use retrieval::{RetrievalBackend, RetrievedDocument};
pub use trait_::Tool;
