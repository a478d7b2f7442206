//! Per-invocation replay parameters.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a modified replay may change and execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayParams {
    /// Replacement model for LLM spans
    pub model: Option<String>,
    /// Replacement sampling temperature
    pub temperature: Option<f64>,
    /// Replacement system prompt
    pub system_prompt: Option<String>,
    /// Replacement output length limit
    pub max_tokens: Option<u64>,
    /// Allow live LLM calls when a request parameter changed
    pub enable_llm: bool,
    /// Allow live tool calls
    pub enable_tools: bool,
    /// Allow live retrieval queries
    pub enable_retrieval: bool,
    /// When set, only these tool and retrieval names may execute
    pub allowlist: Option<IndexSet<String>>,
    /// Tool and retrieval names that never execute
    pub blocklist: IndexSet<String>,
    /// Names that must execute; a missing capability is an error
    pub force_execute: IndexSet<String>,
    /// Output overrides keyed by operation name
    pub mocks: IndexMap<String, Value>,
}

impl Default for ReplayParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: None,
            system_prompt: None,
            max_tokens: None,
            enable_llm: true,
            enable_tools: false,
            enable_retrieval: false,
            allowlist: None,
            blocklist: IndexSet::new(),
            force_execute: IndexSet::new(),
            mocks: IndexMap::new(),
        }
    }
}

impl ReplayParams {
    /// Parameters that change nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the output length limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Toggle live LLM calls
    #[must_use]
    pub fn with_llm(mut self, enabled: bool) -> Self {
        self.enable_llm = enabled;
        self
    }

    /// Toggle live tool calls
    #[must_use]
    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.enable_tools = enabled;
        self
    }

    /// Toggle live retrieval queries
    #[must_use]
    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.enable_retrieval = enabled;
        self
    }

    /// Add a name to the allowlist, creating it if needed
    #[must_use]
    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.allowlist
            .get_or_insert_with(IndexSet::new)
            .insert(name.into());
        self
    }

    /// Add a name to the blocklist
    #[must_use]
    pub fn block(mut self, name: impl Into<String>) -> Self {
        self.blocklist.insert(name.into());
        self
    }

    /// Require execution for a name
    #[must_use]
    pub fn force(mut self, name: impl Into<String>) -> Self {
        self.force_execute.insert(name.into());
        self
    }

    /// Override the output of every span named `name`
    #[must_use]
    pub fn with_mock(mut self, name: impl Into<String>, output: Value) -> Self {
        self.mocks.insert(name.into(), output);
        self
    }

    /// Whether any LLM request parameter is set
    #[must_use]
    pub fn changes_llm_request(&self) -> bool {
        self.model.is_some()
            || self.temperature.is_some()
            || self.system_prompt.is_some()
            || self.max_tokens.is_some()
    }

    /// Whether these parameters can change anything compared to a cached replay
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.changes_llm_request()
            && !self.enable_tools
            && !self.enable_retrieval
            && self.force_execute.is_empty()
            && self.mocks.is_empty()
    }

    /// Whether `name` passes the block and allow lists
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        if self.blocklist.contains(name) {
            return false;
        }
        self.allowlist.as_ref().is_none_or(|allow| allow.contains(name))
    }
}
