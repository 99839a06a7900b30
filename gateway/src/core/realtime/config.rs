//! Realtime session configuration types.
//!
//! This module contains the knobs sent in the initial `session.update`:
//! - Audio format configuration
//! - Output modalities
//! - Server-side turn detection
//! - Transcription model and response token cap

use serde::{Deserialize, Serialize};

/// Realtime model requested in the `?model=` query parameter.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Transcription model used for user audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Cap on tokens generated per response.
pub const DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS: u32 = 4096;

/// Sample rate of PCM16 audio exchanged with the realtime endpoint.
pub const REALTIME_SAMPLE_RATE: u32 = 24000;

// =============================================================================
// Audio Formats
// =============================================================================

/// Audio encodings accepted by the realtime endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// PCM 16-bit signed little-endian (default)
    #[default]
    Pcm16,
    /// G.711 u-law (8-bit)
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    /// G.711 a-law (8-bit)
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

impl AudioFormat {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
            Self::G711Ulaw => "g711_ulaw",
            Self::G711Alaw => "g711_alaw",
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Pcm16 => REALTIME_SAMPLE_RATE,
            Self::G711Ulaw | Self::G711Alaw => 8000,
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pcm16" | "pcm" | "linear16" => Self::Pcm16,
            "g711_ulaw" | "ulaw" | "mulaw" => Self::G711Ulaw,
            "g711_alaw" | "alaw" => Self::G711Alaw,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Modalities
// =============================================================================

/// Output modalities for a realtime response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

impl Modality {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

// =============================================================================
// Turn Detection
// =============================================================================

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerVad {
    /// Activation threshold (0.0 to 1.0)
    pub threshold: f32,
    /// Audio kept before detected speech, in ms
    pub prefix_padding_ms: u32,
    /// Silence that ends a turn, in ms
    pub silence_duration_ms: u32,
}

impl Default for ServerVad {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

// =============================================================================
// Session Options
// =============================================================================

/// Everything the client announces in its first `session.update`.
///
/// The voice is taken from [`GatewayConfig::voice`](crate::config::GatewayConfig)
/// at connect time so that a stored configuration drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Realtime model for the `?model=` query parameter
    pub model: String,
    pub modalities: Vec<Modality>,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    /// `None` disables input transcription
    pub transcription_model: Option<String>,
    /// `None` disables server VAD (manual commits only)
    pub turn_detection: Option<ServerVad>,
    pub max_response_output_tokens: u32,
    pub instructions: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            modalities: vec![Modality::Text, Modality::Audio],
            input_audio_format: AudioFormat::Pcm16,
            output_audio_format: AudioFormat::Pcm16,
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            turn_detection: Some(ServerVad::default()),
            max_response_output_tokens: DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS,
            instructions: None,
        }
    }
}

impl SessionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Text-only responses, no audio synthesis.
    pub fn text_only(mut self) -> Self {
        self.modalities = vec![Modality::Text];
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_sample_rate() {
        assert_eq!(AudioFormat::Pcm16.sample_rate(), 24000);
        assert_eq!(AudioFormat::G711Ulaw.sample_rate(), 8000);
        assert_eq!(AudioFormat::G711Alaw.sample_rate(), 8000);
    }

    #[test]
    fn test_audio_format_from_str() {
        assert_eq!(AudioFormat::from_str_or_default("linear16"), AudioFormat::Pcm16);
        assert_eq!(AudioFormat::from_str_or_default("ULAW"), AudioFormat::G711Ulaw);
        assert_eq!(AudioFormat::from_str_or_default("opus"), AudioFormat::Pcm16);
    }

    #[test]
    fn test_session_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.model, "gpt-4o-realtime-preview");
        assert_eq!(options.modalities, vec![Modality::Text, Modality::Audio]);
        assert_eq!(options.transcription_model.as_deref(), Some("whisper-1"));
        assert_eq!(options.max_response_output_tokens, 4096);

        let vad = options.turn_detection.unwrap();
        assert_eq!(vad.threshold, 0.5);
        assert_eq!(vad.prefix_padding_ms, 300);
        assert_eq!(vad.silence_duration_ms, 500);
    }

    #[test]
    fn test_text_only() {
        let options = SessionOptions::default().text_only().with_instructions("be brief");
        assert_eq!(options.modalities, vec![Modality::Text]);
        assert_eq!(options.instructions.as_deref(), Some("be brief"));
    }
}
