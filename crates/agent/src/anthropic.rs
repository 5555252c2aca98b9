//! Anthropic Messages API provider with streaming and computer use.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use proto::{
    BlockDelta, BlockMeta, ContentUnit, ImageData, LlmError, ResultPart, StreamEvent,
    ToolDefinition, Turn,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{CompletionRequest, EventStream, LlmProvider};

const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const COMPUTER_USE_BETA: &str = "computer-use-2024-10-22";
const COMPUTER_TOOL_TYPE: &str = "computer_20241022";

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ResultBlock>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResultBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

impl From<&ImageData> for ImageSource {
    fn from(image: &ImageData) -> Self {
        Self {
            kind: "base64",
            media_type: image.media_type.clone(),
            data: general_purpose::STANDARD.encode(&image.data),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicTool {
    Function {
        name: String,
        description: String,
        input_schema: Value,
    },
    Computer {
        #[serde(rename = "type")]
        kind: &'static str,
        name: String,
        display_width_px: u32,
        display_height_px: u32,
        display_number: u32,
    },
}

// ── Stream event types ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BlockStartEvent {
    index: usize,
    content_block: StartBlock,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text,
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BlockDeltaEvent {
    index: usize,
    delta: DeltaBlock,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaBlock {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BlockStopEvent {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

// ── Provider ───────────────────────────────────────────────────────────────────

/// Anthropic Messages API LLM provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Creates a provider targeting the default Anthropic API endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com")
    }

    /// Creates a provider targeting a custom base URL (useful for proxies/tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream(&self, req: CompletionRequest) -> Result<EventStream, LlmError> {
        let api_key = req
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(&self.api_key)
            .to_string();
        if api_key.is_empty() {
            return Err(LlmError::Api("Anthropic API key is not configured".to_string()));
        }

        let uses_computer = req
            .tools
            .iter()
            .any(|t| matches!(t, ToolDefinition::Computer { .. }));

        let anthropic_req = AnthropicRequest {
            model: req.model.clone(),
            max_tokens: req.max_tokens,
            system: req.system_prompt,
            messages: convert_turns(req.history.turns()),
            tools: req.tools.iter().map(convert_tool).collect(),
            temperature: req.temperature,
            stream: true,
        };

        let url = format!("{}/v1/messages", self.base_url);
        debug!(
            model = %req.model,
            messages = %anthropic_req.messages.len(),
            tools = %anthropic_req.tools.len(),
            "Sending streaming request to Anthropic"
        );

        let mut req_builder = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("content-type", "application/json");

        if uses_computer {
            req_builder = req_builder.header("anthropic-beta", COMPUTER_USE_BETA);
        }

        if proto::is_anthropic_oauth_token(&api_key) {
            req_builder = req_builder.bearer_auth(&api_key);
        } else {
            req_builder = req_builder.header("x-api-key", &api_key);
        }

        let response = req_builder
            .json(&anthropic_req)
            .send()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let status = response.status();
        debug!(status = %status.as_u16(), "Anthropic response received");
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimit);
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::Api(e.to_string()))?;
            let preview: String = body.chars().take(500).collect();
            return Err(LlmError::Api(format!("HTTP {status}: {preview}")));
        }

        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(sse) => parse_sse_event(&sse.event, &sse.data).transpose(),
                    Err(e) => Some(Err(LlmError::Stream(e.to_string()))),
                }
            });

        Ok(Box::pin(events))
    }
}

/// Maps one SSE frame to a stream event; bookkeeping frames yield `None`.
fn parse_sse_event(event: &str, data: &str) -> Result<Option<StreamEvent>, LlmError> {
    fn parse<'a, T: Deserialize<'a>>(event: &str, data: &'a str) -> Result<T, LlmError> {
        serde_json::from_str(data).map_err(|e| {
            LlmError::InvalidResponse(format!(
                "Malformed {event} event: {e}; data: {}",
                data.chars().take(200).collect::<String>()
            ))
        })
    }

    match event {
        "content_block_start" => {
            let start: BlockStartEvent = parse(event, data)?;
            let block = match start.content_block {
                StartBlock::Text => BlockMeta::Text,
                StartBlock::ToolUse { id, name } => BlockMeta::ToolInvocation { id, name },
                StartBlock::Other => {
                    return Err(LlmError::InvalidResponse(format!(
                        "Unsupported content block at index {}",
                        start.index
                    )));
                }
            };
            Ok(Some(StreamEvent::BlockStart {
                index: start.index,
                block,
            }))
        }
        "content_block_delta" => {
            let delta: BlockDeltaEvent = parse(event, data)?;
            let payload = match delta.delta {
                DeltaBlock::TextDelta { text } => BlockDelta::Text { text },
                DeltaBlock::InputJsonDelta { partial_json } => BlockDelta::Json { partial_json },
                DeltaBlock::Other => {
                    debug!(index = delta.index, "Ignoring unsupported delta kind");
                    return Ok(None);
                }
            };
            Ok(Some(StreamEvent::BlockDelta {
                index: delta.index,
                delta: payload,
            }))
        }
        "content_block_stop" => {
            let stop: BlockStopEvent = parse(event, data)?;
            Ok(Some(StreamEvent::BlockStop { index: stop.index }))
        }
        "message_stop" => Ok(Some(StreamEvent::MessageStop)),
        "error" => {
            let err: ErrorEvent = parse(event, data)?;
            warn!(kind = %err.error.kind, "Anthropic stream error event");
            Err(LlmError::Api(format!("{}: {}", err.error.kind, err.error.message)))
        }
        // message_start, message_delta, ping
        _ => Ok(None),
    }
}

// ── Conversion helpers ─────────────────────────────────────────────────────────

/// Converts history turns into Anthropic messages.
///
/// Consecutive turns with the same role are merged into one message
/// (Anthropic forbids consecutive same-role messages).
fn convert_turns(turns: &[Turn]) -> Vec<AnthropicMessage> {
    let mut result: Vec<AnthropicMessage> = Vec::new();

    for turn in turns {
        let role = turn.role.as_str();
        let blocks = turn.content.iter().map(convert_unit);
        match result.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => result.push(AnthropicMessage {
                role,
                content: blocks.collect(),
            }),
        }
    }

    result
}

fn convert_unit(unit: &ContentUnit) -> RequestBlock {
    match unit {
        ContentUnit::Text { text } => RequestBlock::Text { text: text.clone() },
        ContentUnit::ToolInvocation {
            id,
            name,
            arguments,
        } => RequestBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: arguments.clone(),
        },
        ContentUnit::ToolResult {
            invocation_id,
            parts,
            is_error,
        } => RequestBlock::ToolResult {
            tool_use_id: invocation_id.clone(),
            content: parts
                .iter()
                .map(|part| match part {
                    ResultPart::Image { image } => ResultBlock::Image {
                        source: image.into(),
                    },
                    ResultPart::Text { text } => ResultBlock::Text { text: text.clone() },
                })
                .collect(),
            is_error: *is_error,
        },
        ContentUnit::Image { image } => RequestBlock::Image {
            source: image.into(),
        },
    }
}

fn convert_tool(t: &ToolDefinition) -> AnthropicTool {
    match t {
        ToolDefinition::Function {
            name,
            description,
            input_schema,
        } => AnthropicTool::Function {
            name: name.clone(),
            description: description.clone(),
            input_schema: input_schema.clone(),
        },
        ToolDefinition::Computer {
            name,
            display_width_px,
            display_height_px,
        } => AnthropicTool::Computer {
            kind: COMPUTER_TOOL_TYPE,
            name: name.clone(),
            display_width_px: *display_width_px,
            display_height_px: *display_height_px,
            display_number: 1,
        },
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
