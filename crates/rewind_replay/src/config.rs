//! Engine configuration.

use crate::retry::RetryPolicy;
use indexmap::IndexMap;
use rewind_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What happens to the descendants of a span whose live call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Descendants replay independently
    #[default]
    Continue,
    /// Descendants are recorded as skipped without running
    SkipDescendants,
}

/// USD price of a model per 1k tokens
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelPrice {
    /// Price per 1k prompt tokens
    pub prompt_per_1k: f64,
    /// Price per 1k completion tokens
    pub completion_per_1k: f64,
}

impl ModelPrice {
    /// Cost of a call
    #[must_use]
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.prompt_per_1k + completion_tokens as f64 * self.completion_per_1k)
            / 1_000.0
    }
}

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Retry policy for live calls
    pub retry: RetryPolicy,
    /// Handling of descendants of failed spans
    pub failure_mode: FailureMode,
    /// Per-model pricing for executed LLM spans
    pub pricing: IndexMap<String, ModelPrice>,
    /// Result count for retrieval spans that did not record one
    pub default_top_k: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            failure_mode: FailureMode::default(),
            pricing: IndexMap::new(),
            default_top_k: 5,
        }
    }
}

impl ReplayConfig {
    /// Load from a JSON file; absent keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| CoreError::validation("config", e.to_string()))
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the failure mode
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Add a model price
    #[must_use]
    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.pricing.insert(model.into(), price);
        self
    }

    /// Price a call, `None` if the model has no entry
    #[must_use]
    pub fn price(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> Option<f64> {
        self.pricing
            .get(model)
            .map(|p| p.cost(prompt_tokens, completion_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_config_default() {
        let config = ReplayConfig::default();
        assert_eq!(config.failure_mode, FailureMode::Continue);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.default_top_k, 5);
        assert!(config.pricing.is_empty());
    }

    #[test]
    fn test_price() {
        let config = ReplayConfig::default().with_price(
            "gpt-4o",
            ModelPrice {
                prompt_per_1k: 0.005,
                completion_per_1k: 0.015,
            },
        );
        let cost = config.price("gpt-4o", 1000, 2000).unwrap();
        assert!((cost - 0.035).abs() < 1e-12);
        assert_eq!(config.price("unknown", 10, 10), None);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"failure_mode": "skip_descendants", "retry": {{"max_retries": 1, "max_delay": 250}}}}"#
        )
        .unwrap();

        let config = ReplayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.failure_mode, FailureMode::SkipDescendants);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.max_delay, Duration::from_millis(250));
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.default_top_k, 5);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ReplayConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.is_format());
    }
}
