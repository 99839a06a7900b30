//! Realtime WebSocket transport.
//!
//! A persistent session over the provider's Realtime API, relayed through the
//! AI Gateway or sent straight to the provider depending on
//! [`TransportTarget`](crate::config::TransportTarget).
//!
//! # Architecture
//!
//! - [`RealtimeClient`] owns the session state and the conversation log
//! - A spawned task owns the socket; commands reach it over an mpsc channel
//! - Inbound frames are decoded into [`RealtimeEvent`]s delivered in order
//!   through [`RealtimeEvents`]
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz, base64 encoded on the wire.

mod base;
mod client;
mod config;
pub mod messages;

pub use base::{CLOSE_ABNORMAL, CLOSE_NORMAL, CloseDiagnosis, ConnectionState, RealtimeEvent};
pub use client::{RealtimeClient, RealtimeEvents};
pub use config::{
    AudioFormat, DEFAULT_MAX_RESPONSE_OUTPUT_TOKENS, DEFAULT_REALTIME_MODEL,
    DEFAULT_TRANSCRIPTION_MODEL, Modality, REALTIME_SAMPLE_RATE, ServerVad, SessionOptions,
};
