//! Error types for rubbersoul modules using thiserror.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the model backend and the session lifecycle.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Ollama is not running at {host}:{port}. Start it with `ollama serve` and try again.")]
    Unavailable { host: String, port: u16 },

    #[error("Model '{model}' not found. Available models: {}", format_models(.available))]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },

    #[error("Request to Ollama failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Ollama returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Session is {0}, not active")]
    NotActive(crate::backend::SessionState),
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        "none (pull one with `ollama pull <model>`)".to_string()
    } else {
        models.join(", ")
    }
}

/// Errors from collecting the staged diff.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("No staged changes.")]
    NoChanges,

    #[error("Not a git repository ({path}): {source}")]
    OpenRepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),
}

/// Errors from loading commit message instructions.
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to load instructions from {path}: {source}")]
    InstructionLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from reading or writing the persisted configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not resolve config location: {0:#}")]
    Paths(#[source] anyhow::Error),
}

/// Any failure that ends a command run.
///
/// This is the one place errors are turned into exit codes.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Interrupted")]
    Interrupted,
}

impl RunError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Backend(BackendError::Unavailable { .. }) => 2,
            RunError::Backend(BackendError::ModelNotFound { .. }) => 3,
            RunError::Prompt(_) => 4,
            RunError::Backend(_) => 5,
            RunError::Interrupted => 130,
            RunError::Diff(_) | RunError::Config(_) | RunError::Output(_) => 1,
        }
    }

    /// Whether this is the ordinary "nothing staged" stop rather than a failure.
    pub fn is_no_changes(&self) -> bool {
        matches!(self, RunError::Diff(DiffError::NoChanges))
    }
}
