//! OpenAI-compatible chat-completions provider.

use async_trait::async_trait;
use reqwest::Client;
use rewind_tool::{ExecutionError, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default endpoint when `OPENAI_BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat-completions client for live LLM spans
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider for `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create a provider from `OPENAI_BASE_URL` and `OPENAI_API_KEY`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn from_env() -> Result<Self, reqwest::Error> {
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(base_url, api_key)
    }

    /// Whether an API key is configured
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip_all, fields(model = %request.model), level = "debug")]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, ExecutionError> {
        let mut http = self.client.post(self.endpoint()).json(&request_body(request));
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExecutionError::status(
                status.as_u16(),
                format!("chat completion failed: {}", text),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            ExecutionError::permanent(format!("invalid chat completion body: {}", e))
        })?;
        debug!("chat completion received");
        parse_response(&body)
    }
}

/// Request body for a chat completion
#[must_use]
pub fn request_body(request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": messages(request),
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Chat messages for `request`.
///
/// A string prompt becomes one user message. A message list is used as is,
/// except that a set system prompt replaces any recorded system message.
fn messages(request: &LlmRequest) -> Vec<Value> {
    let mut messages = match &request.prompt {
        Value::Array(list) => list.clone(),
        Value::String(text) => vec![json!({"role": "user", "content": text})],
        Value::Null => Vec::new(),
        other => vec![json!({"role": "user", "content": other.to_string()})],
    };
    if let Some(system) = &request.system_prompt {
        messages.retain(|m| m.get("role").and_then(Value::as_str) != Some("system"));
        messages.insert(0, json!({"role": "system", "content": system}));
    }
    messages
}

/// Extract the completion text and usage from a response body
///
/// # Errors
///
/// Returns a permanent error if the body has no message content
pub fn parse_response(body: &Value) -> Result<LlmResponse, ExecutionError> {
    let text = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ExecutionError::permanent("chat completion has no message content"))?;

    let usage = body.get("usage").map(|usage| TokenUsage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        completion_tokens: usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    });

    Ok(LlmResponse {
        text: text.to_string(),
        usage,
        cost: None,
    })
}

fn transport_error(err: reqwest::Error) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::timeout(err.to_string())
    } else if err.is_connect() {
        ExecutionError::connection(err.to_string())
    } else if let Some(status) = err.status() {
        ExecutionError::status(status.as_u16(), err.to_string())
    } else {
        ExecutionError::transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_tool::ExecutionErrorKind;

    fn request(prompt: Value) -> LlmRequest {
        LlmRequest {
            model: "gpt-4o".to_string(),
            prompt,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_string_prompt_body() {
        let mut req = request(json!("hello"));
        req.temperature = Some(0.2);
        req.max_tokens = Some(64);
        let body = request_body(&req);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"], json!([{"role": "user", "content": "hello"}]));
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn test_system_prompt_replaces_recorded() {
        let mut req = request(json!([
            {"role": "system", "content": "old"},
            {"role": "user", "content": "hi"}
        ]));
        req.system_prompt = Some("be brief".to_string());
        let body = request_body(&req);
        assert_eq!(
            body["messages"],
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ])
        );
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 30, "total_tokens": 42}
        });
        let response = parse_response(&body).unwrap();
        assert_eq!(response.text, "hi there");
        assert_eq!(response.usage.map(|u| u.total()), Some(42));
        assert!(response.cost.is_none());
    }

    #[test]
    fn test_parse_response_without_content() {
        let err = parse_response(&json!({"choices": []})).unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Permanent);
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let provider = OpenAiProvider::new("http://localhost:8000/v1/", None).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
        assert!(!provider.has_api_key());
    }
}
