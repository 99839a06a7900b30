//! Server-Sent Events decoding for streamed chat completions.
//!
//! Frames look like `data: <json>` and the stream ends with `data: [DONE]`.
//! Bytes are buffered until a full line is available, so chunk boundaries may
//! fall anywhere, including inside a multi-byte character.

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use super::messages::ChatChunk;
use crate::core::error::{GatewayError, GatewayResult};

/// Sentinel payload terminating a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE line.
#[derive(Debug)]
pub enum SseItem {
    Chunk(ChatChunk),
    /// The `[DONE]` sentinel
    Done,
    /// A `data:` payload that did not decode; the stream continues
    Malformed(GatewayError),
}

/// Incremental line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and return every item completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = self.decode_line(&line) {
                items.push(item);
                if self.done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        items
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<SseItem> {
        if self.done || self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseItem> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim_end_matches(['\n', '\r']),
            Err(e) => {
                return Some(SseItem::Malformed(GatewayError::ProtocolDecode(format!(
                    "invalid UTF-8 in stream: {e}"
                ))));
            }
        };

        // Blank separators, `:` comments and non-data fields carry nothing here
        let payload = line.strip_prefix("data:")?.trim();
        if payload.is_empty() {
            return None;
        }
        if payload == DONE_SENTINEL {
            self.done = true;
            return Some(SseItem::Done);
        }

        Some(match serde_json::from_str::<ChatChunk>(payload) {
            Ok(chunk) => SseItem::Chunk(chunk),
            Err(e) => SseItem::Malformed(GatewayError::ProtocolDecode(format!(
                "malformed stream fragment: {e}"
            ))),
        })
    }
}

/// Turn an HTTP body stream into decoded SSE items.
///
/// Transport failures surface as `Err` and end the stream. The stream also
/// ends right after [`SseItem::Done`].
pub fn decode_stream<S, E>(byte_stream: S) -> impl Stream<Item = GatewayResult<SseItem>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let state = (
        Box::pin(byte_stream),
        SseDecoder::new(),
        std::collections::VecDeque::new(),
        false,
    );

    stream::unfold(
        state,
        |(mut byte_stream, mut decoder, mut ready, mut finished)| async move {
            loop {
                if let Some(item) = ready.pop_front() {
                    return Some((Ok(item), (byte_stream, decoder, ready, finished)));
                }
                if finished || decoder.is_done() {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => ready.extend(decoder.push(&bytes)),
                    Some(Err(e)) => {
                        finished = true;
                        return Some((
                            Err(GatewayError::Transport(format!("stream interrupted: {e}"))),
                            (byte_stream, decoder, ready, finished),
                        ));
                    }
                    None => {
                        finished = true;
                        ready.extend(decoder.finish());
                    }
                }
            }
        },
    )
}
