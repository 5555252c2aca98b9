//! Tool registry used by the runtime to list and execute tools.

use std::collections::HashMap;
use std::sync::Arc;

use proto::ToolDefinition;
use tools::{ActionExecutor, ComputerTool, GoToUrlTool, SaveToMemoryTool, Tool};
use tracing::debug;

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the browser tool set: `computer`, `go_to_url`, `save_to_memory`.
    pub fn browser(executor: Arc<ActionExecutor>, display_width_px: u32, display_height_px: u32) -> Self {
        let mut registry = Self::new();
        registry.register(ComputerTool::new(
            executor.clone(),
            display_width_px,
            display_height_px,
        ));
        registry.register(GoToUrlTool::new(executor));
        registry.register(SaveToMemoryTool::new());
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        debug!("Registering tool: {name}");
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get tool definitions for the LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns the list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
