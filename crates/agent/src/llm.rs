//! Streaming model provider abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use proto::{ConversationHistory, LlmError, StreamEvent, ToolDefinition};

/// Stream of typed model events for one assistant turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Request for one streamed completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Target model id.
    pub model: String,
    pub system_prompt: String,
    /// Full (already trimmed) conversation history.
    pub history: ConversationHistory,
    /// Available tools.
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-session credential overriding the provider default.
    pub api_key: Option<String>,
}

/// LLM provider trait
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Opens a streamed completion and returns its events in arrival order.
    async fn stream(&self, req: CompletionRequest) -> Result<EventStream, LlmError>;
}
