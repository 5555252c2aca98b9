//! Conversation history: turns and the content units they carry.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtoError;
use crate::message::Role;

/// Binary image payload carried in a tool result or observation.
///
/// Bytes are raw (PNG for screenshots); they are rendered as base64 only
/// at serde boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// MIME type of the encoded image, e.g. `image/png`.
    pub media_type: String,
    /// Encoded image bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl ImageData {
    /// Wraps PNG bytes.
    pub fn png(data: Vec<u8>) -> Self {
        Self {
            media_type: "image/png".to_string(),
            data,
        }
    }
}

/// One entry inside a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultPart {
    Image { image: ImageData },
    Text { text: String },
}

impl ResultPart {
    /// Returns `true` for image parts.
    pub fn is_image(&self) -> bool {
        matches!(self, ResultPart::Image { .. })
    }
}

/// A text span, tool invocation, tool result, or observation image within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentUnit {
    /// Plain text authored by the user or the model.
    Text { text: String },
    /// A fully parsed tool call requested by the model.
    ToolInvocation {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Result of executing an earlier tool invocation.
    ToolResult {
        invocation_id: String,
        parts: Vec<ResultPart>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Standalone page observation (not subject to image retention).
    Image { image: ImageData },
}

impl ContentUnit {
    /// Creates a text unit.
    pub fn text(text: impl Into<String>) -> Self {
        ContentUnit::Text { text: text.into() }
    }

    /// Returns `true` when this unit is a tool result.
    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentUnit::ToolResult { .. })
    }

    /// Short kind label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentUnit::Text { .. } => "text",
            ContentUnit::ToolInvocation { .. } => "tool_invocation",
            ContentUnit::ToolResult { .. } => "tool_result",
            ContentUnit::Image { .. } => "image",
        }
    }
}

/// One role-attributed group of content units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Accepts either a plain string or a list of content units.
    #[serde(deserialize_with = "content_or_string")]
    pub content: Vec<ContentUnit>,
}

impl Turn {
    /// Creates a turn with the given role and units.
    pub fn new(role: Role, content: Vec<ContentUnit>) -> Self {
        Self { role, content }
    }

    /// Creates a user turn holding a single text unit.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentUnit::text(text)])
    }

    /// Creates an assistant turn holding a single text unit.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentUnit::text(text)])
    }

    /// Iterates the tool invocations of this turn in emitted order.
    pub fn tool_invocations(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|unit| match unit {
            ContentUnit::ToolInvocation {
                id,
                name,
                arguments,
            } => Some((id.as_str(), name.as_str(), arguments)),
            _ => None,
        })
    }
}

/// Ordered, append-only conversation owned by one session.
///
/// The only in-place mutation allowed is removal of tool-result image
/// parts, exposed through [`ConversationHistory::tool_results_mut`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Turn>", into = "Vec<Turn>")]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a history from existing turns, validating tool-result references.
    pub fn from_turns(turns: Vec<Turn>) -> Result<Self, ProtoError> {
        let mut history = Self::new();
        for turn in turns {
            history.push(turn)?;
        }
        Ok(history)
    }

    /// Returns all turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns `true` when the history has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Appends a whole turn.
    ///
    /// Every tool result in it must reference an invocation that appeared
    /// earlier (including earlier in the same turn).
    pub fn push(&mut self, turn: Turn) -> Result<(), ProtoError> {
        for (idx, unit) in turn.content.iter().enumerate() {
            if let ContentUnit::ToolResult { invocation_id, .. } = unit {
                let in_turn = turn.content[..idx].iter().any(|u| {
                    matches!(u, ContentUnit::ToolInvocation { id, .. } if id == invocation_id)
                });
                if !in_turn && !self.has_invocation(invocation_id) {
                    return Err(ProtoError::UnknownInvocation(invocation_id.clone()));
                }
            }
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Appends a tool result.
    ///
    /// The result joins the trailing user turn when that turn already ends
    /// with a tool result; otherwise a new user turn is started.
    pub fn append_tool_result(&mut self, result: ContentUnit) -> Result<(), ProtoError> {
        let ContentUnit::ToolResult { invocation_id, .. } = &result else {
            return Err(ProtoError::Serialization(format!(
                "expected tool_result, got {}",
                result.kind()
            )));
        };
        if !self.has_invocation(invocation_id) {
            return Err(ProtoError::UnknownInvocation(invocation_id.clone()));
        }

        if let Some(last) = self.turns.last_mut()
            && last.role == Role::User
            && last.content.last().is_some_and(ContentUnit::is_tool_result)
        {
            last.content.push(result);
        } else {
            self.turns.push(Turn::new(Role::User, vec![result]));
        }
        Ok(())
    }

    /// Appends an observation image to the trailing user turn, or to a new one.
    pub fn append_observation(&mut self, image: ImageData) {
        let unit = ContentUnit::Image { image };
        match self.turns.last_mut() {
            Some(last) if last.role == Role::User => last.content.push(unit),
            _ => self.turns.push(Turn::new(Role::User, vec![unit])),
        }
    }

    /// Returns `true` when a tool invocation with `id` exists in the history.
    pub fn has_invocation(&self, id: &str) -> bool {
        self.turns
            .iter()
            .flat_map(|t| t.content.iter())
            .any(|u| matches!(u, ContentUnit::ToolInvocation { id: existing, .. } if existing == id))
    }

    /// Counts image parts across every tool result.
    pub fn image_count(&self) -> usize {
        self.turns
            .iter()
            .flat_map(|t| t.content.iter())
            .map(|u| match u {
                ContentUnit::ToolResult { parts, .. } => {
                    parts.iter().filter(|p| p.is_image()).count()
                }
                _ => 0,
            })
            .sum()
    }

    /// Mutable access to the parts of every tool result, oldest first.
    pub fn tool_results_mut(&mut self) -> impl Iterator<Item = &mut Vec<ResultPart>> {
        self.turns
            .iter_mut()
            .flat_map(|t| t.content.iter_mut())
            .filter_map(|u| match u {
                ContentUnit::ToolResult { parts, .. } => Some(parts),
                _ => None,
            })
    }

    /// One-line shape summary per turn (roles and unit kinds, no payloads).
    pub fn shape(&self) -> Vec<String> {
        self.turns
            .iter()
            .map(|t| {
                let kinds: Vec<&str> = t.content.iter().map(ContentUnit::kind).collect();
                format!("{}[{}]", t.role, kinds.join(","))
            })
            .collect()
    }
}

impl TryFrom<Vec<Turn>> for ConversationHistory {
    type Error = ProtoError;

    fn try_from(turns: Vec<Turn>) -> Result<Self, Self::Error> {
        Self::from_turns(turns)
    }
}

impl From<ConversationHistory> for Vec<Turn> {
    fn from(history: ConversationHistory) -> Self {
        history.turns
    }
}

fn content_or_string<'de, D>(deserializer: D) -> Result<Vec<ContentUnit>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Content {
        Plain(String),
        Units(Vec<ContentUnit>),
    }

    Ok(match Content::deserialize(deserializer)? {
        Content::Plain(text) => vec![ContentUnit::Text { text }],
        Content::Units(units) => units,
    })
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
