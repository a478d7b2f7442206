//! LLM provider seam.

use crate::error::ExecutionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request-shaping parameters and prompt for one LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Model to call
    pub model: String,
    /// Recorded prompt: either a string or a chat message list
    pub prompt: Value,
    /// System prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output length limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
}

impl TokenUsage {
    /// Prompt plus completion
    #[must_use]
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Completion returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Completion text
    pub text: String,
    /// Token usage, if reported
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    /// Cost in USD, if the provider prices its own calls
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Something that can answer an `LlmRequest`
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Run one completion
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 12,
            completion_tokens: 30,
        };
        assert_eq!(usage.total(), 42);
    }

    #[test]
    fn test_request_skips_unset_fields() {
        let request = LlmRequest {
            model: "gpt-4o".to_string(),
            prompt: json!("hi"),
            system_prompt: None,
            temperature: Some(0.0),
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"model": "gpt-4o", "prompt": "hi", "temperature": 0.0}));
    }
}
