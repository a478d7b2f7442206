//! Tool registry mapping operation names to invocable tools.

use crate::error::RegistryError;
use crate::trait_::Tool;
use indexmap::IndexMap;
use std::sync::Arc;

/// Entry for a registered tool
#[derive(Clone)]
pub struct ToolEntry {
    /// Tool name
    pub name: String,
    /// The tool itself
    pub tool: Arc<dyn Tool>,
    /// Whether tool is enabled
    pub enabled: bool,
}

impl ToolEntry {
    /// Create a new tool entry
    #[must_use]
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            tool,
            enabled: true,
        }
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Registry for tools
///
/// Built once before a replay and shared read-only across invocations.
/// Registration order is preserved for listing.
#[derive(Default, Clone, Debug)]
pub struct ToolRegistry {
    /// Registered tools by name
    tools: IndexMap<String, ToolEntry>,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: IndexMap::new(),
        }
    }

    /// Register a tool
    ///
    /// # Errors
    ///
    /// Returns error if a tool with the same name is already registered
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered { name });
        }
        tracing::debug!(tool = %name, "registered tool");
        self.tools.insert(name, ToolEntry::new(tool));
        Ok(())
    }

    /// Register a tool, builder style
    ///
    /// # Errors
    ///
    /// Returns error if a tool with the same name is already registered
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, RegistryError> {
        self.register(tool)?;
        Ok(self)
    }

    /// Get an enabled tool by name
    ///
    /// # Errors
    ///
    /// Returns error if tool not found or disabled
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .get(name)
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.tool))
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })
    }

    /// List all enabled tool names
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, e)| e.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Check if an enabled tool is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|e| e.enabled)
    }

    /// Enable a tool
    ///
    /// # Errors
    ///
    /// Returns error if tool not found
    pub fn enable(&mut self, name: &str) -> Result<(), RegistryError> {
        self.set_enabled(name, true)
    }

    /// Disable a tool without removing it
    ///
    /// # Errors
    ///
    /// Returns error if tool not found
    pub fn disable(&mut self, name: &str) -> Result<(), RegistryError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        self.tools
            .get_mut(name)
            .map(|e| e.enabled = enabled)
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })
    }

    /// Unregister a tool
    ///
    /// # Errors
    ///
    /// Returns error if tool not found
    pub fn unregister(&mut self, name: &str) -> Result<(), RegistryError> {
        self.tools
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })
    }

    /// Get the count of enabled tools
    #[must_use]
    pub fn count(&self) -> usize {
        self.tools.values().filter(|e| e.enabled).count()
    }

    /// Check if registry has no enabled tools
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FnTool;
    use serde_json::json;

    fn make_tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, |_input| async { Ok(json!("ok")) }))
    }

    #[test]
    fn test_registry_new() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_registry_register() {
        let mut registry = ToolRegistry::new();
        registry.register(make_tool("search")).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.contains("search"));
    }

    #[test]
    fn test_registry_register_duplicate() {
        let mut registry = ToolRegistry::new();
        registry.register(make_tool("search")).unwrap();
        let result = registry.register(make_tool("search"));
        assert_eq!(
            result.unwrap_err(),
            RegistryError::AlreadyRegistered {
                name: "search".to_string()
            }
        );
    }

    #[test]
    fn test_registry_get_not_found() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.get("nonexistent"),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_registry_disable_enable() {
        let mut registry = ToolRegistry::new().with_tool(make_tool("search")).unwrap();

        registry.disable("search").unwrap();
        assert!(!registry.contains("search"));
        assert!(registry.get("search").is_err());

        registry.enable("search").unwrap();
        assert!(registry.contains("search"));
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry = ToolRegistry::new().with_tool(make_tool("search")).unwrap();
        registry.unregister("search").unwrap();
        assert!(!registry.contains("search"));
        assert!(registry.unregister("search").is_err());
    }

    #[test]
    fn test_registry_list_preserves_order() {
        let registry = ToolRegistry::new()
            .with_tool(make_tool("b"))
            .unwrap()
            .with_tool(make_tool("a"))
            .unwrap();
        assert_eq!(registry.list(), vec!["b".to_string(), "a".to_string()]);
    }
}
