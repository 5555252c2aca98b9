use serde::{Deserialize, Serialize};

/// Tool declaration sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolDefinition {
    /// A regular function tool described by a JSON schema.
    Function {
        name: String,
        description: String,
        input_schema: serde_json::Value,
    },
    /// The provider's native screen-control tool.
    Computer {
        name: String,
        display_width_px: u32,
        display_height_px: u32,
    },
}

impl ToolDefinition {
    /// Creates a function tool definition.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self::Function {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Name the model uses to invoke this tool.
    pub fn name(&self) -> &str {
        match self {
            Self::Function { name, .. } | Self::Computer { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_shared_across_variants() {
        let f = ToolDefinition::function("go_to_url", "Navigate", serde_json::json!({}));
        let c = ToolDefinition::Computer {
            name: "computer".to_string(),
            display_width_px: 1366,
            display_height_px: 768,
        };
        assert_eq!(f.name(), "go_to_url");
        assert_eq!(c.name(), "computer");
    }
}
