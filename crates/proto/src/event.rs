use serde::{Deserialize, Serialize};

use crate::content::Turn;

/// Metadata carried by a block start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockMeta {
    /// A text span.
    Text,
    /// A tool invocation whose arguments arrive as JSON fragments.
    ToolInvocation { id: String, name: String },
}

/// Incremental payload for an open block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment for a text block.
    Text { text: String },
    /// Raw JSON fragment for a tool-invocation block.
    Json { partial_json: String },
}

/// One incremental fragment of a streamed model response.
///
/// Within a single assistant turn, a `BlockStart` for index *i* precedes every
/// delta and stop for *i*, and an index is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    BlockStart { index: usize, block: BlockMeta },
    BlockDelta { index: usize, delta: BlockDelta },
    BlockStop { index: usize },
    MessageStop,
}

impl StreamEvent {
    /// Wire name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::BlockStart { .. } => "block_start",
            StreamEvent::BlockDelta { .. } => "block_delta",
            StreamEvent::BlockStop { .. } => "block_stop",
            StreamEvent::MessageStop => "message_stop",
        }
    }
}

/// Event delivered to session observers through the event sink.
///
/// Delivery is fire-and-forget and at most once per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A raw model stream event, forwarded verbatim as it arrives.
    Stream { event: StreamEvent },
    /// Incremental text of an open text block, for live display.
    TextDelta { index: usize, text: String },
    /// A user turn holding exactly one freshly produced tool result.
    ToolResult { turn: Turn },
    /// The page URL after a tool dispatch.
    UrlChanged { url: String },
    /// The session reached a final answer.
    Finished,
    /// The session ended with an unrecoverable error.
    Failed { error: String },
}

impl AgentEvent {
    /// Event name used by SSE framing.
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Stream { event } => event.name(),
            AgentEvent::TextDelta { .. } => "text_delta",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::UrlChanged { .. } => "url_changed",
            AgentEvent::Finished => "finished",
            AgentEvent::Failed { .. } => "error",
        }
    }

    /// Returns `true` for the single event that closes a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Finished | AgentEvent::Failed { .. })
    }
}

impl From<StreamEvent> for AgentEvent {
    fn from(event: StreamEvent) -> Self {
        AgentEvent::Stream { event }
    }
}
