//! Data shapes exchanged between extensions and the host.

use std::{collections::BTreeMap, fmt};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// One block of message or tool-result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// Provider + model id pair identifying a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub id: String,
}

impl ModelRef {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

/// When a message injected by an extension reaches the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliverAs {
    /// Interrupt the current turn.
    Steer,
    /// Queue after the current run finishes.
    FollowUp,
    /// Attach to the next user prompt.
    NextTurn,
}

/// A message with an extension-defined type, rendered by the renderer
/// registered for `custom_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMessage {
    pub custom_type: String,
    pub content: Vec<ContentBlock>,
    #[serde(default = "default_display")]
    pub display: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

fn default_display() -> bool {
    true
}

impl CustomMessage {
    pub fn text(custom_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            custom_type: custom_type.into(),
            content: vec![ContentBlock::text(text)],
            display: true,
            details: None,
        }
    }
}

/// One model offered by an extension-registered provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub context_window: Option<u64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

impl ProviderModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            reasoning: false,
            context_window: None,
            max_tokens: None,
        }
    }
}

/// Full provider configuration handed to the model registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Wire API identifier understood by the host's provider layer.
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub models: Vec<ProviderModel>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_wire_shape() {
        let block: ContentBlock = serde_json::from_value(serde_json::json!({
            "type": "image",
            "data": "AA==",
            "mimeType": "image/png",
        }))
        .unwrap();
        assert!(
            matches!(block, ContentBlock::Image { ref mime_type, .. } if mime_type == "image/png")
        );
        assert_eq!(ContentBlock::text("hi").as_text(), Some("hi"));
        assert_eq!(block.as_text(), None);
    }

    #[test]
    fn provider_config_from_camel_case() {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "baseUrl": "http://localhost:11434/v1",
            "apiKeyEnv": "LOCAL_KEY",
            "models": [{"id": "qwen", "contextWindow": 32768}]
        }))
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(config.models[0].context_window, Some(32768));
        assert!(config.headers.is_empty());
    }

    #[test]
    fn custom_message_display_defaults_true() {
        let msg: CustomMessage = serde_json::from_value(serde_json::json!({
            "customType": "note",
            "content": [{"type": "text", "text": "x"}]
        }))
        .unwrap();
        assert!(msg.display);
        assert_eq!(ModelRef::new("anthropic", "opus").to_string(), "anthropic/opus");
    }
}
