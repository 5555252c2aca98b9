//! Agent runtime, stream reassembly, screenshot retention, and LLM adapter interfaces.

pub mod anthropic;
pub mod llm;
pub mod reassembler;
pub mod retention;
pub mod runtime;
pub mod sink;
pub mod tool_registry;

/// Anthropic Messages API provider (streaming).
pub use anthropic::AnthropicProvider;
/// Completion request and provider interface.
pub use llm::{CompletionRequest, EventStream, LlmProvider};
/// Turn reassembly from streamed block events.
pub use reassembler::StreamReassembler;
/// Screenshot budget applied before every model call.
pub use retention::{RetentionBudget, trim_images};
/// Main session orchestration loop.
pub use runtime::{AgentRuntime, DEFAULT_SYSTEM_PROMPT, SessionConfig, SessionError};
/// Per-session event delivery.
pub use sink::{EventSink, SessionEventHub, Subscription};
/// Runtime tool registry.
pub use tool_registry::ToolRegistry;
