//! Tool trait and the browser actions behind it.
//!
//! The agent runtime uses this crate to turn completed tool invocations
//! into page operations on a remote Chromium browser.

pub mod action;
pub mod browser;
pub mod computer;
pub mod executor;
pub mod keys;
pub mod marker;
pub mod page;

pub use action::{ActionRequest, ClickKind};
pub use browser::{BrowserSession, CdpPage, Viewport};
pub use computer::{ComputerTool, GoToUrlTool, SaveToMemoryTool};
pub use executor::{ActionExecutor, ActionResult};
pub use page::{MouseButton, NavigationError, PageControl, PageHandle};

use std::time::Duration;

use async_trait::async_trait;
use proto::{ActionError, ToolDefinition};

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name exposed to the LLM.
    fn name(&self) -> &str;
    /// Declaration sent to the model.
    fn definition(&self) -> ToolDefinition;
    /// Executes the tool against `page`, waiting `settle` before any screenshot.
    async fn execute(
        &self,
        args: serde_json::Value,
        page: PageHandle,
        settle: Duration,
    ) -> Result<ActionResult, ActionError>;
}
