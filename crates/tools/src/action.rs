//! Abstract browser actions and their field validation.

use proto::ActionError;
use serde_json::Value;

use crate::page::MouseButton;

/// Click variants; all act at the current pointer position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Left,
    Right,
    Middle,
    Double,
}

impl ClickKind {
    /// Button and click count sent to the page.
    pub fn button_and_count(self) -> (MouseButton, u32) {
        match self {
            ClickKind::Left => (MouseButton::Left, 1),
            ClickKind::Right => (MouseButton::Right, 1),
            ClickKind::Middle => (MouseButton::Middle, 1),
            ClickKind::Double => (MouseButton::Left, 2),
        }
    }
}

/// One validated action from the fixed vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Navigate { url: String },
    MouseMove { x: f64, y: f64 },
    LeftClickDrag { x: f64, y: f64 },
    Click(ClickKind),
    /// `+`-joined key chord such as `ctrl+s`.
    Key { chord: String },
    Type { text: String },
    Screenshot,
    CursorPosition,
}

impl ActionRequest {
    /// Parses the input of the computer tool (`action`, `text`, `coordinate`).
    ///
    /// Fails with a validation error before anything touches the page. JSON
    /// `null` counts as an absent field.
    pub fn from_computer_input(input: &Value) -> Result<Self, ActionError> {
        let action = field(input, "action")
            .ok_or_else(|| ActionError::Validation("action is required".to_string()))?
            .as_str()
            .ok_or_else(|| ActionError::Validation("action must be a string".to_string()))?;

        // Never supported, whatever fields came with it.
        if action == "cursor_position" {
            return Ok(ActionRequest::CursorPosition);
        }

        let text = field(input, "text");
        let coordinate = field(input, "coordinate");

        match action {
            "mouse_move" | "left_click_drag" => {
                let coordinate = coordinate.ok_or_else(|| {
                    ActionError::Validation(format!("coordinate is required for action '{action}'"))
                })?;
                reject(text, "text", action)?;
                let (x, y) = parse_coordinate(coordinate)?;
                Ok(if action == "mouse_move" {
                    ActionRequest::MouseMove { x, y }
                } else {
                    ActionRequest::LeftClickDrag { x, y }
                })
            }
            "key" | "type" => {
                let text = text.ok_or_else(|| {
                    ActionError::Validation(format!("text is required for action '{action}'"))
                })?;
                reject(coordinate, "coordinate", action)?;
                let text = text
                    .as_str()
                    .ok_or_else(|| ActionError::Validation("text must be a string".to_string()))?
                    .to_string();
                Ok(if action == "key" {
                    ActionRequest::Key { chord: text }
                } else {
                    ActionRequest::Type { text }
                })
            }
            "left_click" | "right_click" | "middle_click" | "double_click" | "screenshot" => {
                reject(text, "text", action)?;
                reject(coordinate, "coordinate", action)?;
                Ok(match action {
                    "left_click" => ActionRequest::Click(ClickKind::Left),
                    "right_click" => ActionRequest::Click(ClickKind::Right),
                    "middle_click" => ActionRequest::Click(ClickKind::Middle),
                    "double_click" => ActionRequest::Click(ClickKind::Double),
                    _ => ActionRequest::Screenshot,
                })
            }
            other => Err(ActionError::Validation(format!("Invalid action: '{other}'"))),
        }
    }

    /// Parses the input of the navigation tool (`url`).
    pub fn navigate(input: &Value) -> Result<Self, ActionError> {
        let url = field(input, "url")
            .ok_or_else(|| ActionError::Validation("url is required for action 'navigate'".to_string()))?
            .as_str()
            .ok_or_else(|| ActionError::Validation("url must be a string".to_string()))?;
        if url.trim().is_empty() {
            return Err(ActionError::Validation("url must not be empty".to_string()));
        }
        Ok(ActionRequest::Navigate {
            url: url.to_string(),
        })
    }

    /// Action name as the model spells it.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionRequest::Navigate { .. } => "navigate",
            ActionRequest::MouseMove { .. } => "mouse_move",
            ActionRequest::LeftClickDrag { .. } => "left_click_drag",
            ActionRequest::Click(ClickKind::Left) => "left_click",
            ActionRequest::Click(ClickKind::Right) => "right_click",
            ActionRequest::Click(ClickKind::Middle) => "middle_click",
            ActionRequest::Click(ClickKind::Double) => "double_click",
            ActionRequest::Key { .. } => "key",
            ActionRequest::Type { .. } => "type",
            ActionRequest::Screenshot => "screenshot",
            ActionRequest::CursorPosition => "cursor_position",
        }
    }
}

fn field<'a>(input: &'a Value, name: &str) -> Option<&'a Value> {
    input.get(name).filter(|v| !v.is_null())
}

fn reject(value: Option<&Value>, name: &str, action: &str) -> Result<(), ActionError> {
    match value {
        Some(_) => Err(ActionError::Validation(format!(
            "{name} is not accepted for action '{action}'"
        ))),
        None => Ok(()),
    }
}

fn parse_coordinate(value: &Value) -> Result<(f64, f64), ActionError> {
    let items = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| ActionError::Validation("coordinate must be a tuple of length 2".to_string()))?;

    let mut parsed = [0.0_f64; 2];
    for (slot, item) in parsed.iter_mut().zip(items) {
        match item.as_f64() {
            Some(n) if n >= 0.0 => *slot = n,
            _ => {
                return Err(ActionError::Validation(
                    "coordinate must be a tuple of non-negative numbers".to_string(),
                ));
            }
        }
    }
    Ok((parsed[0], parsed[1]))
}
