//! Chat messages, decoding parameters, and the Ollama wire format.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Sampling temperature. Low values keep commit messages deterministic.
const TEMPERATURE: f32 = 0.1;
const TOP_P: f32 = 0.5;
const TOP_K: u32 = 20;
const REPEAT_PENALTY: f32 = 1.3;
/// Upper bound on generated tokens; a commit message never needs more.
const MAX_TOKENS: u32 = 150;
/// How long Ollama keeps the model loaded between requests.
const KEEP_ALIVE_SECS: u64 = 300;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// An incremental fragment of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk(String);

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How long the backend should keep the model in memory after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive(pub Duration);

impl KeepAlive {
    /// Unload the model as soon as the request completes.
    pub const UNLOAD: KeepAlive = KeepAlive(Duration::ZERO);
}

impl Serialize for KeepAlive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}s", self.0.as_secs()))
    }
}

/// Fixed decoding parameters sent with every chat request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub max_tokens: u32,
    pub seed: Option<u64>,
    pub keep_alive: KeepAlive,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE,
            top_p: TOP_P,
            top_k: TOP_K,
            repeat_penalty: REPEAT_PENALTY,
            max_tokens: MAX_TOKENS,
            seed: None,
            keep_alive: KeepAlive(Duration::from_secs(KEEP_ALIVE_SECS)),
        }
    }
}

/// `options` object of an Ollama chat request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl From<&DecodingParams> for ChatOptions {
    fn from(params: &DecodingParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            num_predict: params.max_tokens,
            seed: params.seed,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
    pub keep_alive: KeepAlive,
}

impl ChatRequest {
    pub fn new(model: &str, messages: &[Message], params: &DecodingParams, stream: bool) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.to_vec(),
            stream,
            options: Some(ChatOptions::from(params)),
            keep_alive: params.keep_alive,
        }
    }

    /// Request that releases the model: no messages, zero keep-alive.
    pub fn unload(model: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: Vec::new(),
            stream: false,
            options: None,
            keep_alive: KeepAlive::UNLOAD,
        }
    }
}

/// One response object, either the whole reply or a stream fragment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Generated text carried by this response, empty if none.
    pub fn text(&self) -> &str {
        self.message.as_ref().map(ResponseMessage::text).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
    /// Reasoning models may put their output here instead of `content`.
    #[serde(default)]
    pub thinking: Option<String>,
}

impl ResponseMessage {
    /// `content` if non-empty, otherwise `thinking`.
    pub fn text(&self) -> &str {
        if !self.content.is_empty() {
            return &self.content;
        }
        self.thinking.as_deref().unwrap_or("")
    }
}

/// Body of `GET /api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl ModelTag {
    pub fn id(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.name)
    }
}
