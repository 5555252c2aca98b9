use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP gateway error.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Model provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Browser action error.
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Model stream protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Browser-hosting provider error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Listener bind or serve failure.
    #[error("Server error: {0}")]
    Server(String),

    /// Malformed client request.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    /// The response stream failed or closed before `message_stop`.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Runtime exceeded configured tool-call rounds.
    #[error("Max tool rounds exceeded")]
    MaxToolRoundsExceeded,

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Browser action errors
#[derive(Debug, Error)]
pub enum ActionError {
    /// The request has wrong, missing, or extra fields for its action kind.
    #[error("{0}")]
    Validation(String),

    /// The action is not supported by the control surface.
    #[error("{0} action is not supported by the browser control surface")]
    Unsupported(String),

    /// The page rejected or failed an operation.
    #[error("Page operation failed: {0}")]
    Page(String),
}

/// Stream reassembly protocol violations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A delta or stop arrived for an index that is not the open block.
    #[error("Event for block {got} while block {expected:?} is open")]
    UnexpectedIndex { expected: Option<usize>, got: usize },

    /// A block was started while another one is still open.
    #[error("Block {got} started while block {open} is still open")]
    OverlappingBlock { open: usize, got: usize },

    /// A block index was used twice within one turn.
    #[error("Block index {0} reused within one turn")]
    ReusedIndex(usize),

    /// A delta kind does not match its block kind.
    #[error("Delta kind does not match block {0}")]
    DeltaKindMismatch(usize),

    /// The completed argument buffer of a tool invocation is not valid JSON.
    #[error("Malformed arguments for tool invocation {id}: {reason}")]
    MalformedArguments { id: String, reason: String },
}

/// Browser-hosting provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider credential is configured.
    #[error("Missing provider API key")]
    MissingApiKey,

    /// HTTP transport failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Connecting to the remote browser failed.
    #[error("Browser connection failed: {0}")]
    Connect(String),
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid role string value.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// A tool result referenced an invocation id that does not exist.
    #[error("Tool result references unknown invocation: {0}")]
    UnknownInvocation(String),

    /// Generic serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("agent.api_key".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn wraps_llm_error_into_top_level_error() {
        let err: Error = LlmError::MaxToolRoundsExceeded.into();
        assert!(err.to_string().contains("Max tool rounds exceeded"));
    }

    #[test]
    fn unsupported_action_mentions_action_name() {
        let err = ActionError::Unsupported("cursor_position".to_string());
        assert!(err.to_string().contains("cursor_position"));
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn wraps_protocol_and_action_errors() {
        let protocol: Error = ProtocolError::ReusedIndex(2).into();
        assert!(protocol.to_string().contains("Protocol error"));

        let action: Error = ActionError::Validation("text is required".to_string()).into();
        assert!(action.to_string().contains("text is required"));
    }

    #[test]
    fn provider_status_error_includes_code() {
        let err: Error = ProviderError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        }
        .into();
        assert!(err.to_string().contains("HTTP 502"));
    }
}
