//! Turns validated actions into page operations.

use std::time::Duration;

use proto::{ActionError, ImageData, ResultPart};
use tracing::{debug, error, warn};

use crate::action::ActionRequest;
use crate::keys::{KeyStroke, chord_plan};
use crate::marker::{mark_point, placeholder_png};
use crate::page::{MouseButton, NavigationError, PageControl, PageHandle};

const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;
const DRAG_OFFSET: f64 = 100.0;
const DRAG_STEPS: u32 = 10;

/// Outcome of one executed action.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Page to use for the next action.
    pub page: PageHandle,
    pub screenshot: Option<ImageData>,
    pub text: Option<String>,
    /// Set when navigation timed out and the screenshot shows whatever loaded.
    pub navigation_timeout: bool,
}

impl ActionResult {
    fn screenshot(page: PageHandle, png: Vec<u8>) -> Self {
        Self {
            page,
            screenshot: Some(ImageData::png(png)),
            text: None,
            navigation_timeout: false,
        }
    }

    /// Result carrying only a text payload.
    pub fn text(page: PageHandle, text: impl Into<String>) -> Self {
        Self {
            page,
            screenshot: None,
            text: Some(text.into()),
            navigation_timeout: false,
        }
    }

    /// Tool-result parts: the image first, then the text.
    pub fn into_parts(self) -> (PageHandle, Vec<ResultPart>) {
        let mut parts = Vec::with_capacity(2);
        if let Some(image) = self.screenshot {
            parts.push(ResultPart::Image { image });
        }
        if let Some(text) = self.text {
            parts.push(ResultPart::Text { text });
        }
        (self.page, parts)
    }
}

/// Executes actions against a page, then settles and captures a screenshot.
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    navigation_timeout: Duration,
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_NAVIGATION_TIMEOUT_SECS))
    }
}

impl ActionExecutor {
    pub fn new(navigation_timeout: Duration) -> Self {
        Self { navigation_timeout }
    }

    /// Runs one action and returns the page to thread into the next one.
    pub async fn execute(
        &self,
        request: ActionRequest,
        page: PageHandle,
        settle: Duration,
    ) -> Result<ActionResult, ActionError> {
        debug!(action = request.kind(), "executing browser action");
        let control = page.control();

        match request {
            ActionRequest::Navigate { url } => {
                match control.goto(&url, self.navigation_timeout).await {
                    Ok(()) => {}
                    Err(NavigationError::Timeout) => {
                        warn!(url = %url, "navigation timed out, returning current view");
                        let png = control.screenshot().await?;
                        let mut result = ActionResult::screenshot(page, png);
                        result.navigation_timeout = true;
                        return Ok(result);
                    }
                    Err(NavigationError::Failed(reason)) => {
                        error!(url = %url, "navigation failed: {reason}");
                        return Ok(ActionResult::screenshot(page, placeholder_png().to_vec()));
                    }
                }
            }
            ActionRequest::MouseMove { x, y } => {
                control.mouse_move(x, y, 1).await?;
                return self.marked_screenshot(page, settle, x, y).await;
            }
            ActionRequest::LeftClickDrag { x, y } => {
                control.mouse_move(x, y, 1).await?;
                control.mouse_down(MouseButton::Left, 1).await?;
                control
                    .mouse_move(x + DRAG_OFFSET, y + DRAG_OFFSET, DRAG_STEPS)
                    .await?;
                control.mouse_up(MouseButton::Left, 1).await?;
                return self.marked_screenshot(page, settle, x, y).await;
            }
            ActionRequest::Click(kind) => {
                let (button, count) = kind.button_and_count();
                control.mouse_down(button, count).await?;
                control.mouse_up(button, count).await?;
            }
            ActionRequest::Key { chord } => press_chord(control, &chord).await?,
            ActionRequest::Type { text } => control.type_text(&text).await?,
            ActionRequest::Screenshot => {}
            ActionRequest::CursorPosition => {
                return Err(ActionError::Unsupported("cursor_position".to_string()));
            }
        }

        tokio::time::sleep(settle).await;
        let png = page.control().screenshot().await?;
        Ok(ActionResult::screenshot(page, png))
    }

    async fn marked_screenshot(
        &self,
        page: PageHandle,
        settle: Duration,
        x: f64,
        y: f64,
    ) -> Result<ActionResult, ActionError> {
        tokio::time::sleep(settle).await;
        let png = page.control().screenshot().await?;
        let marked = mark_point(&png, x, y)?;
        Ok(ActionResult::screenshot(page, marked))
    }
}

/// Runs a chord plan. On failure every key still held is released in reverse
/// order before the error is returned, so no modifier stays down on the page.
async fn press_chord(control: &dyn PageControl, chord: &str) -> Result<(), ActionError> {
    let mut held: Vec<String> = Vec::new();
    for stroke in chord_plan(chord) {
        let outcome = match stroke {
            KeyStroke::Down(key) => {
                let outcome = control.key_down(&key).await;
                if outcome.is_ok() {
                    held.push(key);
                }
                outcome
            }
            KeyStroke::Press(key) => control.key_press(&key).await,
            KeyStroke::Up(key) => {
                let outcome = control.key_up(&key).await;
                if outcome.is_ok() {
                    held.retain(|k| *k != key);
                }
                outcome
            }
        };
        if let Err(e) = outcome {
            for key in held.iter().rev() {
                if let Err(release) = control.key_up(key).await {
                    warn!(key = %key, "failed to release key after chord error: {release}");
                }
            }
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_page {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proto::ActionError;

    use crate::marker::blank_png;
    use crate::page::{MouseButton, NavigationError, PageControl};

    /// Page double that records every operation.
    pub struct FakePage {
        pub calls: Mutex<Vec<String>>,
        pub goto_outcome: Mutex<Option<NavigationError>>,
        pub url: Mutex<Option<String>>,
        pub fail_key_press: Mutex<bool>,
    }

    impl FakePage {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                goto_outcome: Mutex::new(None),
                url: Mutex::new(Some("about:blank".to_string())),
                fail_key_press: Mutex::new(false),
            }
        }

        pub fn failing_key_press() -> Self {
            let page = Self::new();
            *page.fail_key_press.lock() = true;
            page
        }

        pub fn failing_navigation(err: NavigationError) -> Self {
            let page = Self::new();
            *page.goto_outcome.lock() = Some(err);
            page
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }
    }

    #[async_trait]
    impl PageControl for FakePage {
        async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), NavigationError> {
            self.record(format!("goto {url}"));
            match self.goto_outcome.lock().take() {
                Some(err) => Err(err),
                None => {
                    *self.url.lock() = Some(url.to_string());
                    Ok(())
                }
            }
        }

        async fn mouse_move(&self, x: f64, y: f64, steps: u32) -> Result<(), ActionError> {
            self.record(format!("move {x},{y} steps={steps}"));
            Ok(())
        }

        async fn mouse_down(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError> {
            self.record(format!("down {button:?} x{click_count}"));
            Ok(())
        }

        async fn mouse_up(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError> {
            self.record(format!("up {button:?} x{click_count}"));
            Ok(())
        }

        async fn key_down(&self, key: &str) -> Result<(), ActionError> {
            self.record(format!("keydown {key}"));
            Ok(())
        }

        async fn key_up(&self, key: &str) -> Result<(), ActionError> {
            self.record(format!("keyup {key}"));
            Ok(())
        }

        async fn key_press(&self, key: &str) -> Result<(), ActionError> {
            self.record(format!("keypress {key}"));
            if *self.fail_key_press.lock() {
                return Err(ActionError::Page("Key event failed: target closed".to_string()));
            }
            Ok(())
        }

        async fn type_text(&self, text: &str) -> Result<(), ActionError> {
            self.record(format!("type {text}"));
            Ok(())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, ActionError> {
            self.record("screenshot".to_string());
            Ok(blank_png(64, 48))
        }

        async fn url(&self) -> Option<String> {
            self.url.lock().clone()
        }
    }
}
