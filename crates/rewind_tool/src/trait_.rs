//! Tool trait

use crate::error::ExecutionError;
use async_trait::async_trait;
use serde_json::Value;

/// A named capability that can be re-invoked during replay.
///
/// Tools may have real-world side effects; nothing is undone if a retried
/// call partially succeeded.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Operation name as recorded on spans
    fn name(&self) -> &str;

    /// Invoke with the recorded arguments
    async fn invoke(&self, input: &Value) -> Result<Value, ExecutionError>;
}
