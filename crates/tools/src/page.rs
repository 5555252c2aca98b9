//! Page capability boundary used by the action executor.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proto::ActionError;
use thiserror::Error;

/// Pointer button used by press/release operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Outcome of a failed navigation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// The page did not reach DOM-content-loaded within the timeout.
    #[error("navigation timed out")]
    Timeout,
    /// Any other navigation failure.
    #[error("navigation failed: {0}")]
    Failed(String),
}

/// Page-level operations of a controllable browser page.
///
/// Pointer operations act at absolute viewport coordinates; presses and
/// releases happen at the last position the pointer was moved to.
#[async_trait]
pub trait PageControl: Send + Sync {
    /// Navigates to `url` and waits for the document to load.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), NavigationError>;
    /// Moves the pointer to `(x, y)` through `steps` intermediate positions.
    async fn mouse_move(&self, x: f64, y: f64, steps: u32) -> Result<(), ActionError>;
    async fn mouse_down(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError>;
    async fn mouse_up(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError>;
    async fn key_down(&self, key: &str) -> Result<(), ActionError>;
    async fn key_up(&self, key: &str) -> Result<(), ActionError>;
    /// Presses and releases a single key.
    async fn key_press(&self, key: &str) -> Result<(), ActionError>;
    /// Sends a literal string as keystrokes.
    async fn type_text(&self, text: &str) -> Result<(), ActionError>;
    /// Captures the current viewport as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, ActionError>;
    /// Current page URL when known.
    async fn url(&self) -> Option<String>;
}

/// Shared handle to the page a session is currently driving.
///
/// Handles are replaced, never mutated, after each action.
#[derive(Clone)]
pub struct PageHandle(Arc<dyn PageControl>);

impl PageHandle {
    /// Wraps a page implementation.
    pub fn new(page: impl PageControl + 'static) -> Self {
        Self(Arc::new(page))
    }

    /// Wraps an already shared page implementation.
    pub fn from_arc(page: Arc<dyn PageControl>) -> Self {
        Self(page)
    }

    /// Borrowed access to the page operations.
    pub fn control(&self) -> &dyn PageControl {
        self.0.as_ref()
    }

    /// Returns `true` when both handles point at the same page.
    pub fn same_page(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle").finish_non_exhaustive()
    }
}
