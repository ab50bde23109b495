//! Backend address resolution and reachability check.

use std::env;
use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default Ollama host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default Ollama port.
pub const DEFAULT_PORT: u16 = 11434;

/// How long the reachability check waits for a TCP connection.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Environment variable overriding the backend address.
const HOST_ENV_VAR: &str = "OLLAMA_HOST";

/// Where the Ollama server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve the endpoint from `OLLAMA_HOST`, falling back to the default.
    ///
    /// Accepts `host`, `host:port`, and `http://host:port`. Logs a warning
    /// and uses the default if the value cannot be parsed.
    pub fn from_env() -> Self {
        match env::var(HOST_ENV_VAR) {
            Ok(v) if !v.trim().is_empty() => Self::parse(&v).unwrap_or_else(|| {
                warn!("Invalid {} value '{}', using default", HOST_ENV_VAR, v);
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value
            .strip_prefix("http://")
            .or_else(|| value.strip_prefix("https://"))
            .unwrap_or(value)
            .trim_end_matches('/');

        match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().ok()?;
                let host = if host.is_empty() { DEFAULT_HOST } else { host };
                Some(Self::new(host, port))
            }
            None if !value.is_empty() => Some(Self::new(value, DEFAULT_PORT)),
            None => None,
        }
    }

    /// Base URL of the HTTP API, e.g. `http://127.0.0.1:11434/`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Check whether something accepts TCP connections on `host:port`.
///
/// Returns `false` on any connection error or when `limit` elapses.
pub async fn is_backend_running(host: &str, port: u16, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Backend probe {}:{} failed: {}", host, port, e);
            false
        }
        Err(_) => {
            debug!("Backend probe {}:{} timed out after {:?}", host, port, limit);
            false
        }
    }
}
