//! Error taxonomy shared by the HTTP and WebSocket transports.

use thiserror::Error;

use crate::core::realtime::CloseDiagnosis;

/// Errors surfaced by the gateway client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid configuration (identifiers, options, header values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The gateway answered with a non-2xx HTTP status
    #[error("Gateway HTTP error ({status}): {body}")]
    GatewayHttp {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Network or socket failure before a protocol-level response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The WebSocket closed before reaching the connected state
    #[error("Connect error: {message}{}", diagnosis_suffix(.diagnosis))]
    Connect {
        /// Diagnostic classification of the failure, when one applies
        diagnosis: Option<CloseDiagnosis>,
        /// Underlying failure description
        message: String,
    },

    /// Operation is not valid in the current session state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A single inbound frame could not be decoded
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),
}

fn diagnosis_suffix(diagnosis: &Option<CloseDiagnosis>) -> String {
    match diagnosis {
        Some(d) => format!(" ({})", d.description()),
        None => String::new(),
    }
}

impl GatewayError {
    /// Build a [`GatewayError::Connect`] without a classification.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            diagnosis: None,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::GatewayHttp { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Diagnostic classification carried by a connect error, if any.
    pub fn diagnosis(&self) -> Option<CloseDiagnosis> {
        match self {
            Self::Connect { diagnosis, .. } => *diagnosis,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::ProtocolDecode(e.to_string())
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(e: url::ParseError) -> Self {
        GatewayError::Configuration(format!("Invalid URL: {e}"))
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
