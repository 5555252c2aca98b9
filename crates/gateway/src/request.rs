//! Chat request body and its mapping onto session settings.

use std::time::Duration;

use agent::{RetentionBudget, SessionConfig};
use proto::{ConversationHistory, GatewayError, SessionId};
use serde::Deserialize;

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: ConversationHistory,
    pub id: SessionId,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Retention target; also the removal batch size.
    #[serde(default)]
    pub num_images_to_keep: Option<usize>,
    /// Settle delay in milliseconds.
    #[serde(default)]
    pub wait_time: Option<u64>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ChatRequest {
    /// Session settings: request overrides on top of the server defaults.
    pub fn session_config(&self, defaults: &SessionConfig) -> Result<SessionConfig, GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::BadRequest("messages must not be empty".to_string()));
        }
        if let Some(t) = self.temperature
            && !(0.0..=1.0).contains(&t)
        {
            return Err(GatewayError::BadRequest(format!(
                "temperature must be between 0 and 1, got {t}"
            )));
        }

        let mut config = defaults.clone();
        if let Some(prompt) = self.system_prompt.as_ref().filter(|p| !p.trim().is_empty()) {
            config.system_prompt = prompt.clone();
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(keep) = self.num_images_to_keep.filter(|k| *k > 0) {
            config.retention = RetentionBudget {
                keep,
                granularity: keep,
            };
        }
        if let Some(ms) = self.wait_time {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            config.api_key = Some(key.clone());
        }
        Ok(config)
    }
}
