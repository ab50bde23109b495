//! Ollama HTTP client.

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use reqwest::{Response, StatusCode};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::BackendError;

use super::probe::Endpoint;
use super::types::{ChatRequest, ChatResponse, Chunk, TagsResponse};

/// Chunks of a streaming reply, in generation order.
pub type ChunkStream = BoxStream<'static, Result<Chunk, BackendError>>;

/// Buffered fragments between the HTTP reader and the consumer.
const STREAM_BUFFER: usize = 32;

/// Operations the session needs from a model server.
///
/// This abstraction allows mocking the backend in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Identifiers of the models available locally.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// Send a non-streaming chat request and wait for the whole reply.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError>;

    /// Send a streaming chat request.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError>;

    /// Ask the server to drop the model from memory.
    async fn release(&self, model: &str) -> Result<(), BackendError>;
}

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::Request)?;

        Ok(Self {
            http,
            base_url: endpoint.base_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_chat(&self, request: &ChatRequest) -> Result<Response, BackendError> {
        let response = self
            .http
            .post(self.url("api/chat"))
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Generation(describe_http_error(status, &body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let tags: TagsResponse = self
            .http
            .get(self.url("api/tags"))
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(BackendError::Request)?
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("model list: {e}")))?;

        Ok(tags.models.iter().map(|m| m.id().to_string()).collect())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, BackendError> {
        let body = self
            .post_chat(request)
            .await?
            .text()
            .await
            .map_err(|e| BackendError::Generation(format!("failed to read response: {e}")))?;

        let mut response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(format!("{e}: {}", preview(&body))))?;

        if let Some(error) = response.error.take() {
            return Err(BackendError::Generation(error));
        }

        Ok(response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChunkStream, BackendError> {
        let response = self.post_chat(request).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(pump_stream(response, tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn release(&self, model: &str) -> Result<(), BackendError> {
        self.post_chat(&ChatRequest::unload(model)).await?;
        Ok(())
    }
}

/// Decode newline-delimited JSON fragments and forward their text.
///
/// Stops at the first `done` fragment, the first error, or when the
/// receiver is dropped.
async fn pump_stream(response: Response, tx: mpsc::Sender<Result<Chunk, BackendError>>) {
    let mut bytes = Box::pin(response.bytes_stream());
    let mut decoder = NdjsonDecoder::default();

    while let Some(item) = bytes.next().await {
        let data = match item {
            Ok(data) => data,
            Err(e) => {
                let _ = tx
                    .send(Err(BackendError::Generation(format!("stream interrupted: {e}"))))
                    .await;
                return;
            }
        };

        for fragment in decoder.push(&data) {
            match forward(fragment, &tx).await {
                Flow::Continue => {}
                Flow::Stop => return,
            }
        }
    }

    if let Some(fragment) = decoder.finish() {
        if let Flow::Stop = forward(fragment, &tx).await {
            return;
        }
    }

    warn!("Ollama stream ended without a final fragment");
    let _ = tx
        .send(Err(BackendError::Generation(
            "stream ended before the response was complete".to_string(),
        )))
        .await;
}

enum Flow {
    Continue,
    Stop,
}

async fn forward(
    fragment: Result<ChatResponse, BackendError>,
    tx: &mpsc::Sender<Result<Chunk, BackendError>>,
) -> Flow {
    let fragment = match fragment {
        Ok(f) => f,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return Flow::Stop;
        }
    };

    if let Some(error) = &fragment.error {
        let _ = tx.send(Err(BackendError::Generation(error.clone()))).await;
        return Flow::Stop;
    }

    let text = fragment.text();
    if !text.is_empty() && tx.send(Ok(Chunk::new(text))).await.is_err() {
        debug!("Stream consumer went away, dropping response");
        return Flow::Stop;
    }

    if fragment.done {
        Flow::Stop
    } else {
        Flow::Continue
    }
}

/// Splits a byte stream into JSON lines.
#[derive(Debug, Default)]
struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    fn push(&mut self, data: &[u8]) -> Vec<Result<ChatResponse, BackendError>> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(fragment) = decode_line(&line) {
                out.push(fragment);
            }
        }

        out
    }

    /// Decode whatever is left after the last newline.
    fn finish(&mut self) -> Option<Result<ChatResponse, BackendError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Option<Result<ChatResponse, BackendError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(serde_json::from_str(text).map_err(|e| {
        BackendError::Generation(format!("invalid stream fragment: {e}: {}", preview(text)))
    }))
}

/// Build a readable message from a failed HTTP response.
fn describe_http_error(status: StatusCode, body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => format!("HTTP {}: {}", status, parsed.error),
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, preview(body)),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
