//! Retrieval backend seam.

use crate::error::ExecutionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One ranked retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Document id
    pub id: String,
    /// Document text
    pub content: String,
    /// Relevance score, higher is better
    pub score: f64,
    /// Extra metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Something that answers retrieval queries
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Return up to `top_k` documents, best first
    async fn query(&self, text: &str, top_k: usize)
    -> Result<Vec<RetrievedDocument>, ExecutionError>;
}
