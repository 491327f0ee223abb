//! OpenAI-compatible streaming provider
//!
//! Posts chat completion requests with `stream: true` and turns the
//! server-sent event body into a [`DeltaStream`]. The SSE body is parsed on a
//! spawned task that forwards deltas over a bounded channel. The task also
//! watches for the receiver closing while it waits on the body, so dropping
//! the returned stream stops it and releases the HTTP connection even when
//! the provider has stalled.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ProviderConfig;
use crate::error::{ChatStreamError, Result};
use crate::providers::{CompletionDelta, CompletionRequest, DeltaStream, Provider};

/// Deltas buffered between the SSE parser task and the consumer
const DELTA_BUFFER: usize = 32;

/// OpenAI-compatible chat completions provider
///
/// # Examples
///
/// ```no_run
/// use chatstream::config::ProviderConfig;
/// use chatstream::providers::OpenAiProvider;
///
/// # fn example() -> chatstream::error::Result<()> {
/// let provider = OpenAiProvider::new(ProviderConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub struct OpenAiProvider {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// Creates a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns `ChatStreamError::Config` if the HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> Result<Self> {
        // No total request timeout: a long completion must be able to stream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| ChatStreamError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<DeltaStream> {
        tracing::debug!(
            "Sending streaming request: model={}, {} messages",
            request.model,
            request.messages.len()
        );

        let mut builder = self
            .client
            .post(self.completions_url())
            .header("Accept", "text/event-stream")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!("Completion request failed: {}", e);
            ChatStreamError::ProviderRequest(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Provider returned error {}: {}", status, error_text);
            return Err(ChatStreamError::ProviderRequest(format!(
                "provider returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let (tx, rx) = mpsc::channel(DELTA_BUFFER);
        tokio::spawn(parse_sse_stream(response.bytes_stream(), tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// One chunk of a streamed chat completion
#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Outcome of parsing a single SSE event block
#[derive(Debug, PartialEq)]
pub(crate) enum SseFrame {
    /// A content delta for the first choice
    Delta(CompletionDelta),
    /// The `[DONE]` terminator
    Done,
    /// Comments, pings, and chunks without a first choice
    Skip,
    /// An error event or an unparseable frame
    Error(String),
}

/// Reads an SSE byte stream and forwards completion deltas
///
/// Events are separated by blank lines. Stops at `[DONE]`, at the first
/// error (which is forwarded), or as soon as the receiver is dropped, even
/// while no bytes are arriving. A body that ends without `[DONE]` ends the
/// stream normally.
pub(crate) async fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    tx: mpsc::Sender<Result<CompletionDelta>>,
) {
    // Raw bytes accumulate between `\n\n` boundaries; decoding happens per
    // complete block so multi-byte characters split across chunks survive.
    let mut buffer: Vec<u8> = Vec::new();

    tokio::pin!(byte_stream);

    loop {
        let chunk_result = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("Delta receiver dropped; abandoning provider stream");
                return;
            }
            next = byte_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
        };

        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Provider stream failed: {}", e);
                let _ = tx
                    .send(Err(ChatStreamError::Streaming(e.to_string()).into()))
                    .await;
                return;
            }
        };

        buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        while let Some(pos) = find_event_boundary(&buffer) {
            let block: Vec<u8> = buffer.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&block[..pos]);
            if !forward_frame(parse_event_block(&text), &tx).await {
                return;
            }
        }
    }

    if !buffer.is_empty() {
        let text = String::from_utf8_lossy(&buffer);
        forward_frame(parse_event_block(&text), &tx).await;
    }
}

/// Sends a frame downstream; returns false when parsing should stop
async fn forward_frame(frame: SseFrame, tx: &mpsc::Sender<Result<CompletionDelta>>) -> bool {
    match frame {
        SseFrame::Delta(delta) => tx.send(Ok(delta)).await.is_ok(),
        SseFrame::Skip => true,
        SseFrame::Done => false,
        SseFrame::Error(message) => {
            let _ = tx
                .send(Err(ChatStreamError::Streaming(message).into()))
                .await;
            false
        }
    }
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Parses the text between two blank lines
pub(crate) fn parse_event_block(event_block: &str) -> SseFrame {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;

    for line in event_block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        }
        // `:` comments, `id:` and `retry:` carry nothing we need
    }

    if let Some(et) = event_type {
        if et.eq_ignore_ascii_case("ping") {
            return SseFrame::Skip;
        }
    }

    let data = data_lines.join("\n");
    let data = data.trim();
    if data.is_empty() {
        return SseFrame::Skip;
    }
    if data == "[DONE]" {
        return SseFrame::Done;
    }

    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(p) => p,
        Err(e) => return SseFrame::Error(format!("malformed stream frame: {}", e)),
    };

    if let Some(error) = payload.error {
        return SseFrame::Error(error.message);
    }

    match payload.choices.into_iter().find(|c| c.index == 0) {
        Some(choice) => SseFrame::Delta(CompletionDelta {
            content: choice.delta.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        }),
        None => SseFrame::Skip,
    }
}
