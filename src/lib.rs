//! rubbersoul - A CLI tool that writes commit messages for staged changes
//! using a model served by a local Ollama instance.
//!
//! # Overview
//!
//! rubbersoul reads the staged diff with libgit2, wraps it in a prompt, and
//! streams the model's reply to the terminal. The model is released on the
//! backend when the run ends, however it ends.

pub mod app;
pub mod backend;
pub mod commit;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod progress;

// Re-export commonly used types
pub use app::{Generator, OutputMode};
pub use backend::{Chunk, DecodingParams, Endpoint, Message, ModelBackend, OllamaClient, Session, SessionState};
pub use commit::{DiffProvider, GitDiffProvider, InstructionSource};
pub use error::{BackendError, ConfigError, DiffError, PromptError, RunError};
