//! Audio capture seam for the realtime transport.
//!
//! Device access lives outside this crate. Callers hand the realtime client an
//! [`AudioCapture`] that yields PCM16 chunks; the client forwards them as
//! `input_audio_buffer.append` events and releases the capture on every exit
//! path (explicit stop, socket close, socket error, disconnect).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::error::{GatewayError, GatewayResult};

/// Channel capacity between a capture source and the forwarder.
const CAPTURE_CHANNEL_CAPACITY: usize = 32;

/// Source of PCM16 mono audio at the session sample rate.
#[async_trait]
pub trait AudioCapture: Send {
    /// Begin capturing. Chunks arrive on the returned receiver until it closes
    /// or [`stop`](Self::stop) is called.
    async fn start(&mut self) -> GatewayResult<mpsc::Receiver<Bytes>>;

    /// Release the underlying device. Must be safe to call more than once.
    async fn stop(&mut self);
}

/// Streams a raw PCM16 file in fixed-size chunks.
///
/// Stands in for a microphone in the CLI and in tests.
pub struct FileCapture {
    path: PathBuf,
    chunk_size: usize,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FileCapture {
    /// 100 ms of 24 kHz PCM16 per chunk.
    pub const DEFAULT_CHUNK_SIZE: usize = 4800;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            task: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl AudioCapture for FileCapture {
    async fn start(&mut self) -> GatewayResult<mpsc::Receiver<Bytes>> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            GatewayError::Configuration(format!(
                "Failed to open audio file {}: {e}",
                self.path.display()
            ))
        })?;

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let chunk_size = self.chunk_size;
        let path = self.path.clone();

        self.task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; chunk_size];
            loop {
                match file.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Audio file read failed for {}: {}", path.display(), e);
                        break;
                    }
                }
            }
            debug!("Audio file capture finished: {}", path.display());
        }));

        Ok(rx)
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
