//! Tool registry implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use codepod_core::{
    traits::{Tool, ToolRegistry},
    types::{ToolDefinition, ToolOutput},
    Error, Result,
};

/// Default tool registry using DashMap.
pub struct DefaultToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl DefaultToolRegistry {
    /// Create a new tool registry.
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for DefaultToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for DefaultToolRegistry {
    async fn register(&self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        tracing::info!(tool = %name, "Registering tool");

        if self.tools.contains_key(&name) {
            return Err(Error::internal(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        self.tools.insert(name, Arc::from(tool));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ToolDefinition>> {
        let definitions: Vec<_> = self
            .tools
            .iter()
            .map(|entry| ToolDefinition {
                name: entry.name().to_string(),
                description: entry.description().to_string(),
                parameters: entry.parameters(),
            })
            .collect();

        Ok(definitions)
    }

    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::tool_not_found(name))?;

        tracing::debug!(tool = %name, "Executing tool");

        tool.execute(args).await
    }
}
