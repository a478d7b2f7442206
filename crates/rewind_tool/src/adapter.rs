//! Adapters turning plain async closures into tools.

use crate::error::ExecutionError;
use crate::trait_::Tool;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Tool backed by an async closure.
///
/// The closure receives an owned copy of the recorded arguments.
pub struct FnTool<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send,
{
    /// Wrap `func` under `name`
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: &Value) -> Result<Value, ExecutionError> {
        (self.func)(input.clone()).await
    }
}

impl<F> std::fmt::Debug for FnTool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_tool_echo() {
        let tool = FnTool::new("echo", |input| async move { Ok(input) });
        assert_eq!(tool.name(), "echo");
        let out = tool.invoke(&json!({"q": 1})).await.unwrap();
        assert_eq!(out, json!({"q": 1}));
    }

    #[tokio::test]
    async fn test_fn_tool_error() {
        let tool = FnTool::new("broken", |_input| async {
            Err(ExecutionError::permanent("bad arguments"))
        });
        let err = tool.invoke(&Value::Null).await.unwrap_err();
        assert_eq!(err, ExecutionError::permanent("bad arguments"));
    }
}
