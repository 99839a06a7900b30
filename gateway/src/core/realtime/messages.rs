//! Realtime WebSocket message types.
//!
//! All events are JSON text frames tagged by `type`.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Announce session configuration
//! - input_audio_buffer.append - Append audio to buffer
//! - input_audio_buffer.commit - Commit audio buffer
//! - conversation.item.create - Add a user message
//! - response.create - Generate a response
//!
//! Server events (received from server):
//! - session.created / session.updated
//! - input_audio_buffer.speech_started / speech_stopped
//! - conversation.item.created
//! - conversation.item.input_audio_transcription.completed
//! - conversation.interrupted
//! - response.created / response.done
//! - response.text.delta / response.text.done
//! - response.audio_transcript.delta / response.audio_transcript.done
//! - response.audio.delta
//! - error
//!
//! Server fields are decoded leniently: gateways and mocks routinely omit ids
//! and indices, so everything except the payload that gives an event its
//! meaning defaults when absent. Event types this client does not model decode
//! to [`ServerEvent::Unknown`].

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::config::{Modality, SessionOptions};
use crate::core::error::GatewayResult;

// =============================================================================
// Session Configuration
// =============================================================================

/// Body of `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    pub voice: String,

    pub input_audio_format: String,

    pub output_audio_format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Serialized as `null` when disabled so the server drops its default VAD
    pub turn_detection: Option<TurnDetection>,

    pub max_response_output_tokens: u32,
}

impl SessionConfig {
    pub fn from_options(options: &SessionOptions, voice: &str) -> Self {
        Self {
            modalities: options
                .modalities
                .iter()
                .map(Modality::as_str)
                .map(str::to_string)
                .collect(),
            instructions: options.instructions.clone(),
            voice: voice.to_string(),
            input_audio_format: options.input_audio_format.as_str().to_string(),
            output_audio_format: options.output_audio_format.as_str().to_string(),
            input_audio_transcription: options
                .transcription_model
                .as_ref()
                .map(|model| InputAudioTranscription {
                    model: model.clone(),
                }),
            turn_detection: options.turn_detection.map(|vad| TurnDetection::ServerVad {
                threshold: vad.threshold,
                prefix_padding_ms: vad.prefix_padding_ms,
                silence_duration_ms: vad.silence_duration_ms,
            }),
            max_response_output_tokens: options.max_response_output_tokens,
        }
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    #[serde(rename = "server_vad")]
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            item_type: "message".to_string(),
            role: Some("user".to_string()),
            content: vec![ContentPart {
                content_type: "input_text".to_string(),
                text: Some(text.into()),
                transcript: None,
            }],
        }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPart {
    /// Content type (input_text, input_audio, text, audio)
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent over the realtime socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Base64-encoded PCM chunk
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },

    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit => "input_audio_buffer.commit",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate => "response.create",
        }
    }

    /// Encode as a JSON text frame carrying a fresh client `event_id`.
    pub fn encode(&self) -> GatewayResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "event_id".to_string(),
                Value::String(format!("evt_{}", Uuid::new_v4().simple())),
            );
        }
        Ok(serde_json::to_string(&value)?)
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received over the realtime socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: SessionInfo,
    },

    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: u64,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: u64,
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        item: ConversationItem,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        transcript: String,
    },

    #[serde(rename = "conversation.interrupted")]
    ConversationInterrupted,

    #[serde(rename = "response.created")]
    ResponseCreated {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.text.done")]
    TextDone {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        text: String,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        /// Base64-encoded audio chunk
        delta: String,
    },

    /// Any event type not modelled above
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode base64 audio from an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

// =============================================================================
// Supporting Types
// =============================================================================

/// API error information.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    /// Client event that caused the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Session information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

/// Response information.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Usage reported on `response.done`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::config::ServerVad;

    #[test]
    fn test_client_event_carries_event_id() {
        let json = ClientEvent::InputAudioBufferCommit.encode().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "input_audio_buffer.commit");
        assert!(value["event_id"].as_str().unwrap().starts_with("evt_"));

        let other: Value =
            serde_json::from_str(&ClientEvent::InputAudioBufferCommit.encode().unwrap()).unwrap();
        assert_ne!(value["event_id"], other["event_id"]);
    }

    #[test]
    fn test_audio_append() {
        let data = vec![0u8, 1, 2, 3];
        match ClientEvent::audio_append(&data) {
            ClientEvent::InputAudioBufferAppend { audio } => {
                assert_eq!(BASE64_STANDARD.decode(&audio).unwrap(), data);
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_session_update_from_options() {
        let session = SessionConfig::from_options(&SessionOptions::default(), "verse");
        let json = ClientEvent::SessionUpdate { session }.encode().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "session.update");
        let session = &value["session"];
        assert_eq!(session["modalities"], serde_json::json!(["text", "audio"]));
        assert_eq!(session["voice"], "verse");
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["threshold"], 0.5);
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(session["turn_detection"]["silence_duration_ms"], 500);
        assert_eq!(session["max_response_output_tokens"], 4096);
        assert!(session.get("instructions").is_none());
    }

    #[test]
    fn test_session_update_without_vad_sends_null() {
        let options = SessionOptions {
            turn_detection: None,
            ..Default::default()
        };
        let session = SessionConfig::from_options(&options, "alloy");
        let value = serde_json::to_value(&session).unwrap();
        assert!(value["turn_detection"].is_null());

        let custom = SessionOptions {
            turn_detection: Some(ServerVad {
                threshold: 0.8,
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(SessionConfig::from_options(&custom, "alloy")).unwrap();
        assert_eq!(value["turn_detection"]["threshold"].as_f64().unwrap() as f32, 0.8);
    }

    #[test]
    fn test_user_text_item() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text("hi"),
        };
        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_text");
        assert_eq!(value["item"]["content"][0]["text"], "hi");
    }

    #[test]
    fn test_server_error_deserialization() {
        let json = r#"{
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "Test error"
            }
        }"#;
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Error { error } => {
                assert_eq!(error.error_type, "invalid_request_error");
                assert_eq!(error.message, "Test error");
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_minimal_frames_decode() {
        let delta: ServerEvent =
            serde_json::from_str(r#"{"type":"response.text.delta","delta":"He"}"#).unwrap();
        assert!(matches!(delta, ServerEvent::TextDelta { ref delta, .. } if delta == "He"));

        let done: ServerEvent = serde_json::from_str(r#"{"type":"response.done"}"#).unwrap();
        assert!(matches!(done, ServerEvent::ResponseDone { .. }));

        let interrupted: ServerEvent =
            serde_json::from_str(r#"{"type":"conversation.interrupted"}"#).unwrap();
        assert!(matches!(interrupted, ServerEvent::ConversationInterrupted));
    }

    #[test]
    fn test_unknown_event_type() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert!(matches!(event, ServerEvent::Unknown));
    }

    #[test]
    fn test_known_type_missing_payload_is_an_error() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"response.text.delta"}"#).is_err());
        assert!(serde_json::from_str::<ServerEvent>("not json").is_err());
    }

    #[test]
    fn test_audio_delta_decode() {
        let original = vec![0u8, 1, 2, 3, 4, 5];
        let encoded = BASE64_STANDARD.encode(&original);
        assert_eq!(ServerEvent::decode_audio_delta(&encoded).unwrap(), original);
    }
}
