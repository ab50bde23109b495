//! Model session: validation, chat requests, and the release handshake.

use std::fmt;

use futures_core::stream::BoxStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::BackendError;

use super::ollama::ModelBackend;
use super::probe::{Endpoint, PROBE_TIMEOUT, is_backend_running};
use super::types::{ChatRequest, Chunk, DecodingParams, Message};

/// Lifecycle of a [`Session`].
///
/// `Uninitialized` is never observable: a session only exists once
/// [`Session::validate`] has succeeded. Requests are only accepted while
/// `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Validated,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Validated => "validated",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One conversation with one validated model.
pub struct Session<B: ModelBackend> {
    backend: B,
    model: String,
    state: SessionState,
}

impl<B: ModelBackend> Session<B> {
    /// Probe the backend and check `model` is installed.
    ///
    /// The returned session is `Validated`; call [`Session::activate`]
    /// before sending requests.
    pub async fn validate(backend: B, endpoint: &Endpoint, model: &str) -> Result<Self, BackendError> {
        if !is_backend_running(&endpoint.host, endpoint.port, PROBE_TIMEOUT).await {
            warn!("Ollama is not running at {}", endpoint);
            return Err(BackendError::Unavailable {
                host: endpoint.host.clone(),
                port: endpoint.port,
            });
        }

        let available = backend.list_models().await?;
        let resolved = resolve_model(model, &available).map(str::to_string);
        let Some(resolved) = resolved else {
            warn!("Model '{}' not found. Available models: {:?}", model, available);
            return Err(BackendError::ModelNotFound {
                model: model.to_string(),
                available,
            });
        };

        debug!("Model '{}' validated at {}", resolved, endpoint);
        Ok(Self {
            backend,
            model: resolved,
            state: SessionState::Validated,
        })
    }

    /// Adopt the backend connection for requests.
    pub fn activate(&mut self) {
        if self.state == SessionState::Validated {
            self.state = SessionState::Active;
            info!("Session started with model {}", self.model);
        }
    }

    /// [`Session::validate`] then [`Session::activate`].
    pub async fn connect(backend: B, endpoint: &Endpoint, model: &str) -> Result<Self, BackendError> {
        let mut session = Self::validate(backend, endpoint, model).await?;
        session.activate();
        Ok(session)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn ensure_active(&self) -> Result<(), BackendError> {
        match self.state {
            SessionState::Active => Ok(()),
            state => Err(BackendError::NotActive(state)),
        }
    }

    /// Send `messages` and wait for the complete reply.
    pub async fn ask(&self, messages: &[Message], params: &DecodingParams) -> Result<String, BackendError> {
        self.ensure_active()?;

        let request = ChatRequest::new(&self.model, messages, params, false);
        let response = self.backend.chat(&request).await?;
        let text = response.text().to_string();

        info!("Response complete ({} chars)", text.len());
        Ok(text)
    }

    /// Send `messages` and yield the reply as it is generated.
    ///
    /// The stream borrows the session, so it cannot outlive [`Session::close`].
    pub async fn ask_stream(
        &self,
        messages: &[Message],
        params: &DecodingParams,
    ) -> Result<BoxStream<'_, Result<Chunk, BackendError>>, BackendError> {
        self.ensure_active()?;

        let request = ChatRequest::new(&self.model, messages, params, true);
        let stream = self.backend.chat_stream(&request).await?;
        debug!("Streaming response from {}", self.model);

        Ok(Box::pin(stream.filter(|chunk| {
            !matches!(chunk, Ok(c) if c.as_str().is_empty())
        })))
    }

    /// Release the model on the backend and end the session.
    pub async fn close(mut self) -> Result<(), BackendError> {
        let result = self.backend.release(&self.model).await;
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => info!("Session closed"),
            Err(e) => warn!("Failed to release model {}: {}", self.model, e),
        }
        result
    }
}

/// Find `requested` among `available`, treating an untagged name as `:latest`.
fn resolve_model<'a>(requested: &str, available: &'a [String]) -> Option<&'a str> {
    if let Some(exact) = available.iter().find(|m| m.as_str() == requested) {
        return Some(exact);
    }
    if requested.contains(':') {
        return None;
    }
    let tagged = format!("{requested}:latest");
    available.iter().find(|m| **m == tagged).map(String::as_str)
}
