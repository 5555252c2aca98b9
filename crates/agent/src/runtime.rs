//! Session loop: model call, stream reassembly, tool dispatch, retention.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use proto::{
    ActionError, AgentEvent, ContentUnit, ConversationHistory, ImageData, LlmError, ResultPart,
    Role, SessionId, Turn,
};
use serde_json::Value;
use thiserror::Error;
use tools::PageHandle;
use tools::marker::placeholder_png;
use tracing::{debug, error, info, warn};

use crate::{
    llm::{CompletionRequest, EventStream, LlmProvider},
    reassembler::StreamReassembler,
    retention::{RetentionBudget, trim_images},
    sink::EventSink,
    tool_registry::ToolRegistry,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that completes tasks by \
controlling a web browser with the provided tools. The browser window is already open on a \
blank page and you can only see the current page. Always start with the go_to_url tool to \
navigate to the right website. Take a screenshot whenever you need to check the result of \
an action.";
const DEFAULT_SETTLE_MS: u64 = 1000;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-session knobs accepted by [`AgentRuntime::run_session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub temperature: f32,
    pub retention: RetentionBudget,
    /// Wait between an action and its screenshot.
    pub settle_delay: Duration,
    /// Model credential overriding the provider default.
    pub api_key: Option<String>,
    /// Upper bound on tool-dispatching rounds; unbounded when `None`.
    pub max_rounds: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 1.0,
            retention: RetentionBudget::default(),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            api_key: None,
            max_rounds: None,
        }
    }
}

/// Session failure with the history as it stood when the error happened.
#[derive(Debug, Error)]
#[error("session failed: {source}")]
pub struct SessionError {
    pub history: ConversationHistory,
    pub source: proto::Error,
}

/// The main agent runtime: drives one browser session per call
pub struct AgentRuntime {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn EventSink>,
    model: String,
    max_tokens: u32,
}

impl AgentRuntime {
    /// Creates a runtime with an LLM provider, tools, and the event sink for all sessions.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn EventSink>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            tools,
            sink,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Overrides the completion token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs the loop until the model answers without tool invocations.
    ///
    /// Exactly one terminal event (`Finished` or `Failed`) is emitted.
    pub async fn run_session(
        &self,
        session_id: &SessionId,
        history: ConversationHistory,
        page: PageHandle,
        config: &SessionConfig,
    ) -> Result<ConversationHistory, SessionError> {
        let mut history = history;
        let t0 = Instant::now();

        match self.drive(session_id, &mut history, page, config).await {
            Ok(rounds) => {
                info!(
                    session = %session_id,
                    rounds,
                    elapsed_ms = %t0.elapsed().as_millis(),
                    "session finished"
                );
                self.sink.emit(session_id, AgentEvent::Finished);
                Ok(history)
            }
            Err(source) => {
                error!(session = %session_id, "session failed: {source}");
                self.sink.emit(
                    session_id,
                    AgentEvent::Failed {
                        error: source.to_string(),
                    },
                );
                Err(SessionError { history, source })
            }
        }
    }

    async fn drive(
        &self,
        session_id: &SessionId,
        history: &mut ConversationHistory,
        mut page: PageHandle,
        config: &SessionConfig,
    ) -> Result<usize, proto::Error> {
        if history.len() > 1 {
            match page.control().screenshot().await {
                Ok(png) => history.append_observation(ImageData::png(png)),
                Err(e) => warn!(session = %session_id, "resume screenshot failed: {e}"),
            }
        }

        let tool_defs = self.tools.definitions();
        let mut round = 0;

        loop {
            if let Some(max) = config.max_rounds
                && round >= max
            {
                warn!("Max tool rounds ({max}) reached for session {session_id}");
                return Err(LlmError::MaxToolRoundsExceeded.into());
            }

            let removed = trim_images(history, config.retention);
            if removed > 0 {
                debug!(session = %session_id, removed, "trimmed old screenshots");
            }

            let req = CompletionRequest {
                model: self.model.clone(),
                system_prompt: config.system_prompt.clone(),
                history: history.clone(),
                tools: tool_defs.clone(),
                temperature: config.temperature,
                max_tokens: self.max_tokens,
                api_key: config.api_key.clone(),
            };
            debug!("LLM call (round {round}) for session {session_id}");
            let t0 = Instant::now();
            let stream = self.llm.stream(req).await.map_err(|e| {
                error!(shape = ?history.shape(), "model call failed: {e}");
                e
            })?;
            let turn = self.drain(session_id, stream).await.map_err(|e| {
                error!(shape = ?history.shape(), "model stream failed: {e}");
                e
            })?;
            debug!(elapsed_ms = %t0.elapsed().as_millis(), round = %round, "LLM turn assembled");

            let invocations: Vec<(String, String, Value)> = turn
                .tool_invocations()
                .map(|(id, name, args)| (id.to_string(), name.to_string(), args.clone()))
                .collect();
            history.push(turn)?;

            if invocations.is_empty() {
                return Ok(round);
            }

            debug!(
                "Tool calls requested: {:?}",
                invocations.iter().map(|(_, name, _)| name).collect::<Vec<_>>()
            );
            for (id, name, args) in invocations {
                let Some(tool) = self.tools.get(&name) else {
                    error!(session = %session_id, tool = %name, "unknown tool requested, skipping");
                    continue;
                };

                let (next_page, parts, is_error) =
                    match tool.execute(args, page.clone(), config.settle_delay).await {
                        Ok(result) => {
                            if result.navigation_timeout {
                                info!(session = %session_id, "navigation timed out, continuing with current view");
                            }
                            let (next, parts) = result.into_parts();
                            (next, parts, false)
                        }
                        Err(err @ (ActionError::Validation(_) | ActionError::Unsupported(_))) => {
                            warn!(session = %session_id, tool = %name, "action rejected: {err}");
                            (page.clone(), vec![ResultPart::Text { text: err.to_string() }], true)
                        }
                        Err(err @ ActionError::Page(_)) => {
                            error!(session = %session_id, tool = %name, "action failed: {err}");
                            let parts = vec![
                                ResultPart::Image {
                                    image: ImageData::png(placeholder_png().to_vec()),
                                },
                                ResultPart::Text { text: err.to_string() },
                            ];
                            (page.clone(), parts, true)
                        }
                    };
                page = next_page;

                let result = ContentUnit::ToolResult {
                    invocation_id: id,
                    parts,
                    is_error,
                };
                history.append_tool_result(result.clone())?;
                self.sink.emit(
                    session_id,
                    AgentEvent::ToolResult {
                        turn: Turn::new(Role::User, vec![result]),
                    },
                );

                if let Some(url) = page.control().url().await {
                    self.sink.emit(session_id, AgentEvent::UrlChanged { url });
                }
            }
            round += 1;
        }
    }

    /// Drains one model stream, forwarding each event before reassembling it.
    async fn drain(&self, session_id: &SessionId, mut stream: EventStream) -> Result<Turn, proto::Error> {
        let mut reassembler = StreamReassembler::new();

        while let Some(event) = stream.next().await {
            let event = event?;
            self.sink.emit(session_id, AgentEvent::from(event.clone()));
            if let Some(live) = reassembler.apply(&event)? {
                self.sink.emit(session_id, live);
            }
            if reassembler.is_finished() {
                break;
            }
        }

        if !reassembler.is_finished() {
            return Err(LlmError::Stream("stream closed before message_stop".to_string()).into());
        }
        Ok(reassembler.into_turn())
    }
}
