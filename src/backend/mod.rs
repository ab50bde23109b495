//! Ollama backend: reachability, HTTP client, and model session.

pub mod ollama;
pub mod probe;
pub mod session;
pub mod types;

pub use ollama::{ChunkStream, ModelBackend, OllamaClient};
pub use probe::{Endpoint, PROBE_TIMEOUT, is_backend_running};
pub use session::{Session, SessionState};
pub use types::{Chunk, DecodingParams, Message, Role};
