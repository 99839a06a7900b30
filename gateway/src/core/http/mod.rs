//! Chat Completions HTTP transport.
//!
//! - `client`: request/response and SSE round-trips folded into a conversation log
//! - `messages`: wire types and per-call options
//! - `sse`: incremental `data:` line decoding

mod client;
pub mod messages;
pub mod sse;

pub use client::{ChatClient, DeltaObserver};
pub use messages::{ChatOptions, ChatReply, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Usage};
pub use sse::{SseDecoder, SseItem};
