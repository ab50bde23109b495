//! Command orchestration: diff → prompt → session → terminal.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::backend::{
    DecodingParams, Endpoint, Message, ModelBackend, PROBE_TIMEOUT, Session, is_backend_running,
};
use crate::commit::{DiffProvider, InstructionSource, build_messages, build_prompt};
use crate::error::{BackendError, RunError};
use crate::progress::Spinner;

/// Shown next to the spinner while waiting for the model.
pub const STATUS_MESSAGE: &str = "Generating commit message...";

/// Default limit on releasing the model at the end of a run.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// How the reply reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Print chunks as they are generated.
    #[default]
    Stream,
    /// Wait for the whole reply, then print it.
    Single,
}

/// Everything needed to produce one commit message.
pub struct Generator<B, D> {
    pub backend: B,
    pub endpoint: Endpoint,
    pub model: String,
    pub diff: D,
    pub instructions: InstructionSource,
    pub mode: OutputMode,
    pub params: DecodingParams,
    /// How long to wait for the backend to release the model.
    pub close_timeout: Duration,
}

impl<B: ModelBackend, D: DiffProvider> Generator<B, D> {
    /// Generate the commit message, writing it to `out`.
    ///
    /// The spinner is drawn on `status` (if given) until the first chunk
    /// arrives. The diff and instructions are read before the backend is
    /// contacted. Once a session exists it is closed exactly once on every
    /// path, including when `shutdown` resolves first. The close is bounded
    /// by `close_timeout` so a hung backend cannot stall the exit.
    pub async fn run<O, S, F>(
        self,
        out: &mut O,
        status: Option<S>,
        shutdown: F,
    ) -> Result<String, RunError>
    where
        O: Write,
        S: Write + Send + 'static,
        F: Future<Output = ()>,
    {
        let diff_text = self.diff.change_text()?;
        let template = self.instructions.load()?;
        let messages = build_messages(build_prompt(&template, &diff_text));
        debug!("Prompt built ({} chars of diff)", diff_text.len());

        let session = Session::connect(self.backend, &self.endpoint, &self.model).await?;
        let spinner = status.map(|s| Spinner::start(s, STATUS_MESSAGE));

        let result = tokio::select! {
            r = respond(&session, &messages, &self.params, self.mode, spinner, out) => r,
            _ = shutdown => {
                warn!("Interrupted, closing session");
                Err(RunError::Interrupted)
            }
        };

        let closed = match timeout(self.close_timeout, session.close()).await {
            Ok(closed) => closed,
            Err(_) => {
                warn!(
                    "Gave up releasing model {} after {:?}",
                    self.model, self.close_timeout
                );
                Ok(())
            }
        };

        match (result, closed) {
            (Err(e), _) => Err(e),
            (Ok(text), Err(e)) => {
                warn!("Commit message generated but the model was not released: {e}");
                Ok(text)
            }
            (Ok(text), Ok(())) => Ok(text),
        }
    }
}

async fn respond<B: ModelBackend, O: Write>(
    session: &Session<B>,
    messages: &[Message],
    params: &DecodingParams,
    mode: OutputMode,
    mut spinner: Option<Spinner>,
    out: &mut O,
) -> Result<String, RunError> {
    match mode {
        OutputMode::Single => {
            let result = session.ask(messages, params).await;
            stop_spinner(&mut spinner).await;

            let text = result?;
            writeln!(out, "{}", text.trim_end()).map_err(RunError::Output)?;
            out.flush().map_err(RunError::Output)?;
            Ok(text)
        }
        OutputMode::Stream => {
            let mut stream = match session.ask_stream(messages, params).await {
                Ok(s) => s,
                Err(e) => {
                    stop_spinner(&mut spinner).await;
                    return Err(e.into());
                }
            };

            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                // Nothing may reach `out` while the spinner owns the line.
                stop_spinner(&mut spinner).await;

                let chunk = chunk?;
                out.write_all(chunk.as_str().as_bytes())
                    .map_err(RunError::Output)?;
                out.flush().map_err(RunError::Output)?;
                text.push_str(chunk.as_str());
            }
            stop_spinner(&mut spinner).await;

            if !text.ends_with('\n') {
                writeln!(out).map_err(RunError::Output)?;
            }
            info!("Streamed {} chars", text.len());
            Ok(text)
        }
    }
}

async fn stop_spinner(spinner: &mut Option<Spinner>) {
    if let Some(s) = spinner.take() {
        s.stop().await;
    }
}

/// Whether to draw the spinner.
///
/// Only on a terminal, and not alongside console logs, which would break
/// up its line.
pub fn spinner_enabled(stderr_is_terminal: bool, verbose: bool) -> bool {
    stderr_is_terminal && !verbose
}

/// Models installed on the backend at `endpoint`.
pub async fn list_models<B: ModelBackend>(
    backend: &B,
    endpoint: &Endpoint,
) -> Result<Vec<String>, BackendError> {
    if !is_backend_running(&endpoint.host, endpoint.port, PROBE_TIMEOUT).await {
        return Err(BackendError::Unavailable {
            host: endpoint.host.clone(),
            port: endpoint.port,
        });
    }
    backend.list_models().await
}
