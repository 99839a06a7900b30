//! Session state, close classification and the inbound event type.

use std::fmt;

use bytes::Bytes;
use tokio_tungstenite::tungstenite;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a realtime session.
///
/// `Disconnected -> Connecting -> Connected -> Disconnected`, plus
/// `Connecting -> Disconnected` when the handshake fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Close Classification
// =============================================================================

/// Diagnostic reading of why a socket closed or never opened.
///
/// Purely informational: the session ends `Disconnected` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDiagnosis {
    /// 4001/4003, or a 401/403 handshake response
    AuthenticationFailure,
    /// 1002, or a handshake that failed subprotocol negotiation
    ProtocolNegotiationFailure,
    /// 1006: the socket dropped without a close frame
    AbnormalClosure,
}

/// Close code for an orderly client or server shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the socket dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

impl CloseDiagnosis {
    /// Classify a close code. `None` for 1000 and codes with no known meaning.
    pub fn from_close_code(code: u16) -> Option<Self> {
        match code {
            4001 | 4003 => Some(Self::AuthenticationFailure),
            1002 => Some(Self::ProtocolNegotiationFailure),
            CLOSE_ABNORMAL => Some(Self::AbnormalClosure),
            _ => None,
        }
    }

    /// Classify a failed WebSocket handshake.
    pub fn from_handshake_error(error: &tungstenite::Error) -> Option<Self> {
        match error {
            tungstenite::Error::Http(response) => match response.status().as_u16() {
                401 | 403 => Some(Self::AuthenticationFailure),
                _ => None,
            },
            tungstenite::Error::Protocol(_) => Some(Self::ProtocolNegotiationFailure),
            tungstenite::Error::Io(_) | tungstenite::Error::ConnectionClosed => {
                Some(Self::AbnormalClosure)
            }
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure => {
                "authentication failure: the gateway rejected the credentials offered in the subprotocol list"
            }
            Self::ProtocolNegotiationFailure => {
                "protocol negotiation failure: no offered subprotocol was accepted"
            }
            Self::AbnormalClosure => "abnormal closure: the connection dropped without a close frame",
        }
    }
}

impl fmt::Display for CloseDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// =============================================================================
// Inbound Events
// =============================================================================

/// Typed event delivered to the caller, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Model and voice are whatever the server reports for the session
    SessionCreated {
        session_id: String,
        model: Option<String>,
        voice: Option<String>,
    },
    SessionUpdated,
    ResponseCreated {
        response_id: String,
    },
    ResponseDone {
        response_id: String,
        status: Option<String>,
    },
    TextDelta {
        delta: String,
    },
    TextDone {
        text: String,
    },
    AudioTranscriptDelta {
        delta: String,
    },
    AudioTranscriptDone {
        transcript: String,
    },
    /// Decoded PCM chunk of assistant speech
    AudioDelta {
        audio: Bytes,
    },
    ItemCreated {
        item_id: Option<String>,
        role: Option<String>,
    },
    InputTranscriptionCompleted {
        item_id: Option<String>,
        transcript: String,
    },
    SpeechStarted {
        audio_start_ms: u64,
    },
    SpeechStopped {
        audio_end_ms: u64,
    },
    /// An assistant message was appended to the conversation log
    AssistantMessage {
        content: String,
    },
    /// Error event reported by the server; the session stays open
    Error {
        error_type: String,
        code: Option<String>,
        message: String,
    },
    ConversationInterrupted,
    /// The socket closed; the session is now disconnected
    Closed {
        code: u16,
        reason: String,
        diagnosis: Option<CloseDiagnosis>,
    },
}

impl RealtimeEvent {
    pub(crate) fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
            diagnosis: CloseDiagnosis::from_close_code(code),
        }
    }
}
