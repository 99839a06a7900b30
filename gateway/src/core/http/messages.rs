//! Chat Completions wire types and call options.

use serde::{Deserialize, Serialize};

use crate::core::conversation::{Message, Role};
use crate::core::error::{GatewayError, GatewayResult};

/// Sampling temperature used when the caller does not pick one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Completion token cap used when the caller does not pick one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

// =============================================================================
// Options
// =============================================================================

/// Per-call options for [`ChatClient`](super::ChatClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    /// Overrides [`GatewayConfig::model`](crate::config::GatewayConfig) for this call
    pub model: Option<String>,
    /// Must lie in `[0, 2]`
    pub temperature: f32,
    /// Must be positive
    pub max_tokens: u32,
    /// Request an SSE stream instead of a single JSON document
    pub stream: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
        }
    }
}

impl ChatOptions {
    pub fn streaming() -> Self {
        Self {
            stream: true,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GatewayError::Configuration(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(GatewayError::Configuration(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(GatewayError::Configuration(
                "model override must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Request
// =============================================================================

/// `POST /chat/completions` body.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// =============================================================================
// Responses
// =============================================================================

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Non-streaming response document.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<Role>,
    /// `null` when the model answered with a tool call only
    #[serde(default)]
    pub content: Option<String>,
}

/// One `data:` payload of a streamed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatChunk {
    /// Text carried by the first choice, if any.
    pub fn delta_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

/// Result of one chat round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// Assistant text, also appended to the conversation log
    pub content: String,
    /// Model reported by the provider
    pub model: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}
