//! Remote Chromium page driven over CDP.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use parking_lot::Mutex;
use proto::{ActionError, ProviderError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::keys::key_definition;
use crate::page::{MouseButton, NavigationError, PageControl, PageHandle};

/// Viewport size applied to the remote page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// CDP-backed page that remembers where the pointer last moved and which
/// modifiers are held. CDP does not carry modifier state between synthetic
/// key events, so every event is sent with the current mask.
pub struct CdpPage {
    page: Page,
    pointer: Mutex<(f64, f64)>,
    modifiers: Mutex<i64>,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            pointer: Mutex::new((0.0, 0.0)),
            modifiers: Mutex::new(0),
        }
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
        button: Option<MouseButton>,
        click_count: u32,
    ) -> Result<(), ActionError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if let Some(button) = button {
            builder = builder
                .button(cdp_button(button))
                .click_count(i64::from(click_count));
        }
        let params = builder.build().map_err(ActionError::Page)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| ActionError::Page(format!("Mouse event failed: {e}")))?;
        Ok(())
    }

    async fn dispatch_key(&self, kind: DispatchKeyEventType, key: &str) -> Result<(), ActionError> {
        let def = key_definition(key);
        let down = matches!(kind, DispatchKeyEventType::KeyDown);
        let mask = {
            let mut held = self.modifiers.lock();
            *held = def.apply_to(*held, down);
            *held
        };
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind)
            .modifiers(mask)
            .key(def.key.clone())
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code);
        if !def.code.is_empty() {
            builder = builder.code(def.code.clone());
        }
        if down && let Some(text) = def.text_under(mask) {
            builder = builder.text(text);
        }
        let params = builder.build().map_err(ActionError::Page)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| ActionError::Page(format!("Key event failed: {e}")))?;
        Ok(())
    }

    /// Navigates and returns once the new document reaches DOMContentLoaded.
    async fn navigate(&self, url: &str) -> Result<(), NavigationError> {
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| NavigationError::Failed(e.to_string()))?;
        if let Some(reason) = response.result.error_text.clone() {
            return Err(NavigationError::Failed(reason));
        }

        loop {
            // Evaluation fails while the old context is torn down; keep polling.
            let state = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|result| result.into_value::<String>().ok());
            if state.as_deref().is_some_and(dom_content_loaded) {
                return Ok(());
            }
            tokio::time::sleep(READY_STATE_POLL).await;
        }
    }
}

const READY_STATE_POLL: Duration = Duration::from_millis(100);

fn dom_content_loaded(ready_state: &str) -> bool {
    matches!(ready_state, "interactive" | "complete")
}

fn cdp_button(button: MouseButton) -> CdpMouseButton {
    match button {
        MouseButton::Left => CdpMouseButton::Left,
        MouseButton::Right => CdpMouseButton::Right,
        MouseButton::Middle => CdpMouseButton::Middle,
    }
}

#[async_trait]
impl PageControl for CdpPage {
    async fn goto(&self, url: &str, limit: Duration) -> Result<(), NavigationError> {
        match timeout(limit, self.navigate(url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(NavigationError::Timeout),
        }
    }

    async fn mouse_move(&self, x: f64, y: f64, steps: u32) -> Result<(), ActionError> {
        let (from_x, from_y) = *self.pointer.lock();
        let steps = steps.max(1);
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let (px, py) = (from_x + (x - from_x) * t, from_y + (y - from_y) * t);
            self.dispatch_mouse(DispatchMouseEventType::MouseMoved, px, py, None, 0)
                .await?;
        }
        *self.pointer.lock() = (x, y);
        Ok(())
    }

    async fn mouse_down(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError> {
        let (x, y) = *self.pointer.lock();
        self.dispatch_mouse(
            DispatchMouseEventType::MousePressed,
            x,
            y,
            Some(button),
            click_count,
        )
        .await
    }

    async fn mouse_up(&self, button: MouseButton, click_count: u32) -> Result<(), ActionError> {
        let (x, y) = *self.pointer.lock();
        self.dispatch_mouse(
            DispatchMouseEventType::MouseReleased,
            x,
            y,
            Some(button),
            click_count,
        )
        .await
    }

    async fn key_down(&self, key: &str) -> Result<(), ActionError> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await
    }

    async fn key_up(&self, key: &str) -> Result<(), ActionError> {
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn key_press(&self, key: &str) -> Result<(), ActionError> {
        self.key_down(key).await?;
        self.key_up(key).await
    }

    async fn type_text(&self, text: &str) -> Result<(), ActionError> {
        let mut buf = [0_u8; 4];
        for c in text.chars() {
            self.key_press(c.encode_utf8(&mut buf)).await?;
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ActionError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| ActionError::Page(format!("Failed to capture screenshot: {e}")))
    }

    async fn url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }
}

/// Connection to a remote browser plus the page the agent drives.
pub struct BrowserSession {
    _browser: Browser,
    handler_task: JoinHandle<()>,
    page: PageHandle,
}

impl BrowserSession {
    /// Connects to a browser WebSocket endpoint and prepares its first page.
    pub async fn connect(ws_url: &str, viewport: Viewport) -> Result<Self, ProviderError> {
        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let existing = browser
            .pages()
            .await
            .map_err(|e| ProviderError::Connect(format!("Failed to list pages: {e}")))?;
        let page = match existing.into_iter().next() {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .map_err(|e| ProviderError::Connect(format!("Failed to create page: {e}")))?,
        };

        let metrics = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        page.execute(metrics)
            .await
            .map_err(|e| ProviderError::Connect(format!("Failed to set viewport: {e}")))?;

        info!(
            width = viewport.width,
            height = viewport.height,
            "connected to remote browser"
        );

        Ok(Self {
            _browser: browser,
            handler_task,
            page: PageHandle::new(CdpPage::new(page)),
        })
    }

    /// Handle to the page the agent drives.
    pub fn page(&self) -> PageHandle {
        self.page.clone()
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("closing remote browser connection");
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_viewport_matches_agent_display() {
        assert_eq!(
            Viewport::default(),
            Viewport {
                width: 1280,
                height: 800
            }
        );
    }

    #[test]
    fn navigation_completes_at_dom_content_loaded() {
        assert!(!dom_content_loaded("loading"));
        assert!(dom_content_loaded("interactive"));
        assert!(dom_content_loaded("complete"));
    }

    #[test]
    fn maps_buttons_to_cdp() {
        assert!(matches!(cdp_button(MouseButton::Left), CdpMouseButton::Left));
        assert!(matches!(cdp_button(MouseButton::Right), CdpMouseButton::Right));
        assert!(matches!(cdp_button(MouseButton::Middle), CdpMouseButton::Middle));
    }
}
