//! Chat Completions over HTTP.
//!
//! # Authentication
//!
//! Headers come from [`GatewayConfig::build_http_headers`]: the provider key
//! travels as `authorization` and, when gateway-level auth is enabled, the
//! gateway token as `cf-aig-authorization`. Over HTTP the gateway accepts the
//! gateway token without the provider key being exposed anywhere else.
//!
//! # Conversation handling
//!
//! The user message is appended to the log before the request goes out and
//! rolled back if the round-trip fails, so a failed call leaves the log
//! exactly as it was.

use std::time::Duration;

use futures_util::StreamExt;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::messages::{ChatOptions, ChatReply, ChatRequest, ChatResponse, Usage};
use super::sse::{SseItem, decode_stream};
use crate::config::GatewayConfig;
use crate::core::conversation::{ConversationLog, Message};
use crate::core::error::{GatewayError, GatewayResult};

/// Upper bound on a whole request, streaming included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives each streamed text fragment as it arrives.
pub type DeltaObserver<'a> = &'a mut (dyn FnMut(&str) + Send);

/// HTTP transport for chat completions.
pub struct ChatClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                GatewayError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, http })
    }

    /// Use a caller-supplied HTTP client (shared pools, custom TLS roots).
    pub fn with_http_client(config: GatewayConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Switch the default model for subsequent calls.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.set_model(model);
    }

    /// Send `text` as the next user turn and fold the answer into `log`.
    pub async fn send(
        &self,
        log: &mut ConversationLog,
        text: &str,
        options: &ChatOptions,
    ) -> GatewayResult<ChatReply> {
        self.exchange(log, text, options, None, None).await
    }

    /// Like [`send`](Self::send), reporting each streamed fragment to `on_delta`.
    ///
    /// The observer is only called when `options.stream` is set.
    pub async fn send_streaming(
        &self,
        log: &mut ConversationLog,
        text: &str,
        options: &ChatOptions,
        on_delta: DeltaObserver<'_>,
    ) -> GatewayResult<ChatReply> {
        self.exchange(log, text, options, Some(on_delta), None).await
    }

    /// Like [`send_streaming`](Self::send_streaming), abandoning the request
    /// when `cancel` fires. A cancelled call fails with
    /// [`GatewayError::Transport`] and rolls the user turn back.
    pub async fn send_with_cancel(
        &self,
        log: &mut ConversationLog,
        text: &str,
        options: &ChatOptions,
        on_delta: Option<DeltaObserver<'_>>,
        cancel: &CancellationToken,
    ) -> GatewayResult<ChatReply> {
        self.exchange(log, text, options, on_delta, Some(cancel))
            .await
    }

    async fn exchange(
        &self,
        log: &mut ConversationLog,
        text: &str,
        options: &ChatOptions,
        on_delta: Option<DeltaObserver<'_>>,
        cancel: Option<&CancellationToken>,
    ) -> GatewayResult<ChatReply> {
        options.validate()?;
        let url = self.config.chat_completions_url()?;
        let headers = self.config.build_http_headers()?;
        let model = options
            .model
            .as_deref()
            .unwrap_or(self.config.model.as_str());

        log.append(Message::user(text));

        let never = CancellationToken::new();
        let cancel = cancel.unwrap_or(&never);

        let messages = log.snapshot();
        let request = ChatRequest {
            model,
            messages: &messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: options.stream,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Transport("request cancelled".to_string())),
            result = self.round_trip(url, headers, &request, on_delta) => result,
        };

        match result {
            Ok(reply) => {
                log.append(Message::assistant(reply.content.clone()));
                Ok(reply)
            }
            Err(e) => {
                log.pop_last();
                warn!("Chat request failed, user turn rolled back: {}", e);
                Err(e)
            }
        }
    }

    async fn round_trip(
        &self,
        url: Url,
        headers: HeaderMap,
        request: &ChatRequest<'_>,
        on_delta: Option<DeltaObserver<'_>>,
    ) -> GatewayResult<ChatReply> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Chat completions request to {}",
            url
        );

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Gateway answered {}: {}", status, body);
            return Err(GatewayError::GatewayHttp {
                status: status.as_u16(),
                body,
            });
        }
        info!("Chat completions status {}", status);

        if request.stream {
            read_stream(response, on_delta).await
        } else {
            read_document(response).await
        }
    }
}

async fn read_document(response: reqwest::Response) -> GatewayResult<ChatReply> {
    let body = response
        .bytes()
        .await
        .map_err(|e| GatewayError::Transport(format!("Failed to read response: {e}")))?;
    let document: ChatResponse = serde_json::from_slice(&body)?;

    let choice = document
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::ProtocolDecode("response has no choices".to_string()))?;

    log_usage(document.usage.as_ref());
    Ok(ChatReply {
        content: choice.message.content.unwrap_or_default(),
        model: document.model,
        finish_reason: choice.finish_reason,
        usage: document.usage,
    })
}

async fn read_stream(
    response: reqwest::Response,
    mut on_delta: Option<DeltaObserver<'_>>,
) -> GatewayResult<ChatReply> {
    let mut items = std::pin::pin!(decode_stream(response.bytes_stream()));
    let mut reply = ChatReply {
        content: String::new(),
        model: None,
        finish_reason: None,
        usage: None,
    };
    let mut done = false;

    while let Some(item) = items.next().await {
        match item? {
            SseItem::Chunk(chunk) => {
                if let Some(delta) = chunk.delta_text() {
                    if let Some(observer) = on_delta.as_deref_mut() {
                        observer(delta);
                    }
                    reply.content.push_str(delta);
                }
                if let Some(reason) = chunk.finish_reason() {
                    reply.finish_reason = Some(reason.to_string());
                }
                if reply.model.is_none() {
                    reply.model = chunk.model;
                }
                if chunk.usage.is_some() {
                    reply.usage = chunk.usage;
                }
            }
            SseItem::Done => done = true,
            SseItem::Malformed(e) => warn!("Skipping stream fragment: {}", e),
        }
    }

    if !done {
        return Err(GatewayError::Transport(
            "stream ended without the [DONE] sentinel".to_string(),
        ));
    }
    log_usage(reply.usage.as_ref());
    Ok(reply)
}

fn log_usage(usage: Option<&Usage>) {
    if let Some(usage) = usage {
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Chat completion usage"
        );
    }
}
