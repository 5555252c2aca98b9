//! Shared protocol types for the browser agent workspace.
//!
//! This crate defines the conversation model (turns and content units),
//! the model stream events, the observer-facing agent events, tool
//! declarations, and the strongly-typed error enums shared by every crate.

pub mod content;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

/// Re-export of conversation content types.
pub use content::{ContentUnit, ConversationHistory, ImageData, ResultPart, Turn};
/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of stream and observer event types.
pub use event::{AgentEvent, BlockDelta, BlockMeta, StreamEvent};
/// Re-export of identity types.
pub use message::{Role, SessionId};
/// Re-export of tool declaration types.
pub use tool::ToolDefinition;

/// Returns `true` when the key looks like an Anthropic OAuth access token
/// (`sk-ant-oat*`) rather than a permanent API key (`sk-ant-api*`).
///
/// When this returns `true`, callers should use `Authorization: Bearer`
/// instead of `x-api-key` for Anthropic API requests.
pub fn is_anthropic_oauth_token(key: &str) -> bool {
    key.starts_with("sk-ant-oat")
}
