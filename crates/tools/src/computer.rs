//! Tools offered to the model: screen control, navigation and a memory note.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proto::{ActionError, ToolDefinition};
use serde_json::Value;
use tracing::info;

use crate::Tool;
use crate::action::ActionRequest;
use crate::executor::{ActionExecutor, ActionResult};
use crate::page::PageHandle;

/// Native computer-use tool: mouse, keyboard and screenshots.
pub struct ComputerTool {
    executor: Arc<ActionExecutor>,
    display_width_px: u32,
    display_height_px: u32,
}

impl ComputerTool {
    pub fn new(executor: Arc<ActionExecutor>, display_width_px: u32, display_height_px: u32) -> Self {
        Self {
            executor,
            display_width_px,
            display_height_px,
        }
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &str {
        "computer"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::Computer {
            name: self.name().to_string(),
            display_width_px: self.display_width_px,
            display_height_px: self.display_height_px,
        }
    }

    async fn execute(
        &self,
        args: Value,
        page: PageHandle,
        settle: Duration,
    ) -> Result<ActionResult, ActionError> {
        let request = ActionRequest::from_computer_input(&args)?;
        self.executor.execute(request, page, settle).await
    }
}

/// Navigates the current page to a URL.
pub struct GoToUrlTool {
    executor: Arc<ActionExecutor>,
}

impl GoToUrlTool {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Tool for GoToUrlTool {
    fn name(&self) -> &str {
        "go_to_url"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Navigate the browser to a URL and return a screenshot of the loaded page",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to navigate to"
                    }
                },
                "required": ["url"]
            }),
        )
    }

    async fn execute(
        &self,
        args: Value,
        page: PageHandle,
        settle: Duration,
    ) -> Result<ActionResult, ActionError> {
        let request = ActionRequest::navigate(&args)?;
        self.executor.execute(request, page, settle).await
    }
}

/// Acknowledges a note the model wants to keep; the note lives in history only.
#[derive(Default)]
pub struct SaveToMemoryTool;

impl SaveToMemoryTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for SaveToMemoryTool {
    fn name(&self) -> &str {
        "save_to_memory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            self.name(),
            "Save a piece of information for later steps of this task",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "information": {
                        "type": "string",
                        "description": "The information to remember"
                    }
                },
                "required": ["information"]
            }),
        )
    }

    async fn execute(
        &self,
        args: Value,
        page: PageHandle,
        _settle: Duration,
    ) -> Result<ActionResult, ActionError> {
        let information = args
            .get("information")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::Validation("information is required".to_string()))?;
        info!(chars = information.chars().count(), "saved information to memory");
        Ok(ActionResult::text(page, "successfully saved to memory"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::executor::test_page::FakePage;

    fn executor() -> Arc<ActionExecutor> {
        Arc::new(ActionExecutor::default())
    }

    #[test]
    fn computer_tool_advertises_display_size() {
        let tool = ComputerTool::new(executor(), 1366, 768);
        assert_eq!(
            tool.definition(),
            ToolDefinition::Computer {
                name: "computer".to_string(),
                display_width_px: 1366,
                display_height_px: 768,
            }
        );
    }

    #[test]
    fn go_to_url_schema_requires_url() {
        let tool = GoToUrlTool::new(executor());
        let ToolDefinition::Function { input_schema, .. } = tool.definition() else {
            panic!("expected function tool");
        };
        assert_eq!(input_schema["required"][0], "url");
    }

    #[tokio::test]
    async fn computer_tool_validates_before_touching_page() {
        let page = Arc::new(FakePage::new());
        let tool = ComputerTool::new(executor(), 1366, 768);
        let err = tool
            .execute(
                json!({"action": "mouse_move", "coordinate": [1, 1], "text": "x"}),
                PageHandle::from_arc(page.clone()),
                Duration::ZERO,
            )
            .await
            .expect_err("invalid input");
        assert!(matches!(err, ActionError::Validation(_)));
        assert!(page.calls().is_empty());
    }

    #[tokio::test]
    async fn go_to_url_navigates_then_screenshots() {
        let page = Arc::new(FakePage::new());
        let tool = GoToUrlTool::new(executor());
        let result = tool
            .execute(
                json!({"url": "https://example.com"}),
                PageHandle::from_arc(page.clone()),
                Duration::ZERO,
            )
            .await
            .expect("navigate");
        assert!(result.screenshot.is_some());
        assert_eq!(page.calls(), vec!["goto https://example.com", "screenshot"]);
    }

    #[tokio::test]
    async fn save_to_memory_returns_acknowledgement_only() {
        let page = Arc::new(FakePage::new());
        let result = SaveToMemoryTool::new()
            .execute(
                json!({"information": "order id 42"}),
                PageHandle::from_arc(page.clone()),
                Duration::ZERO,
            )
            .await
            .expect("save");
        assert!(result.screenshot.is_none());
        assert_eq!(result.text.as_deref(), Some("successfully saved to memory"));
        assert!(page.calls().is_empty());
    }
}
