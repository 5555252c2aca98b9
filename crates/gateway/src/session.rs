//! Hosted browser sessions: lifecycle calls and CDP attachment.

use async_trait::async_trait;
use proto::{ProviderError, SessionId};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tools::{BrowserSession, PageHandle, Viewport};
use tracing::{debug, info, warn};

/// A page the agent can drive, plus whatever keeps its browser connection open.
pub struct ConnectedPage {
    pub page: PageHandle,
    _session: Option<BrowserSession>,
}

impl ConnectedPage {
    /// Wraps a page whose lifetime is owned elsewhere.
    pub fn detached(page: PageHandle) -> Self {
        Self {
            page,
            _session: None,
        }
    }
}

impl From<BrowserSession> for ConnectedPage {
    fn from(session: BrowserSession) -> Self {
        Self {
            page: session.page(),
            _session: Some(session),
        }
    }
}

/// Remote browser host: creates, releases and attaches to sessions.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// Creates a session and returns the provider's session record.
    async fn create_session(&self, timeout_ms: u64) -> Result<Value, ProviderError>;

    /// Releases a session. Releasing twice is not an error.
    async fn release_session(&self, id: &str) -> Result<Value, ProviderError>;

    /// Attaches to the browser of an existing session.
    async fn connect(&self, session_id: &SessionId) -> Result<ConnectedPage, ProviderError>;
}

/// Steel session API client.
pub struct SteelClient {
    client: reqwest::Client,
    api_url: String,
    websocket_url: String,
    api_key: String,
    viewport: Viewport,
}

impl SteelClient {
    pub fn new(
        api_url: impl Into<String>,
        websocket_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            websocket_url: websocket_url.into(),
            api_key: api_key.into(),
            viewport: Viewport::default(),
        }
    }

    /// Viewport applied after attaching to a page.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// CDP endpoint for a session.
    pub fn websocket_url(&self, session_id: &str) -> String {
        format!(
            "{}?apiKey={}&sessionId={}",
            self.websocket_url, self.api_key, session_id
        )
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        Ok(&self.api_key)
    }
}

#[async_trait]
impl BrowserProvider for SteelClient {
    async fn create_session(&self, timeout_ms: u64) -> Result<Value, ProviderError> {
        let key = self.require_key()?;
        let resp = self
            .client
            .post(format!("{}/v1/sessions", self.api_url))
            .header("Steel-Api-Key", key)
            .json(&json!({ "sessionTimeout": timeout_ms }))
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let session: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        info!(id = %session["id"].as_str().unwrap_or("?"), "browser session created");
        Ok(session)
    }

    async fn release_session(&self, id: &str) -> Result<Value, ProviderError> {
        let key = self.require_key()?;
        let resp = self
            .client
            .post(format!("{}/v1/sessions/{id}/release", self.api_url))
            .header("Steel-Api-Key", key)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        release_outcome(status, &body)
    }

    async fn connect(&self, session_id: &SessionId) -> Result<ConnectedPage, ProviderError> {
        let url = self.websocket_url(session_id.as_str());
        debug!(session = %session_id, "attaching to remote browser");
        BrowserSession::connect(&url, self.viewport)
            .await
            .map(ConnectedPage::from)
    }
}

/// Maps a release response; `400` means the session is already gone.
fn release_outcome(status: StatusCode, body: &str) -> Result<Value, ProviderError> {
    if status == StatusCode::BAD_REQUEST {
        warn!("release requested for a session that is already released");
        return Ok(json!({ "success": true, "message": "Session already released" }));
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        });
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| json!({ "success": true })))
}
