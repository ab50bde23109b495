//! Terminal spinner shown while waiting for the first chunk.

use std::io::Write;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Time between frames.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(80);

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Carriage return plus "erase entire line".
pub const CLEAR_LINE: &str = "\r\x1b[2K";

/// A spinner animating on its own task until stopped.
///
/// Call [`Spinner::stop`] before writing anything else to the terminal: it
/// returns only after the spinner has erased its line.
pub struct Spinner {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start animating `message` on `out`.
    pub fn start<W>(out: W, message: impl Into<String>) -> Self
    where
        W: Write + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(animate(out, message.into(), token.clone()));

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Cancel the animation and wait until its line is erased.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Spinner task failed: {e}");
            }
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        // The task still erases its line the next time the runtime polls it.
        self.token.cancel();
    }
}

async fn animate<W: Write>(mut out: W, message: String, token: CancellationToken) {
    let mut ticker = interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frames = FRAMES.iter().cycle();

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let frame = frames.next().copied().unwrap_or_default();
                let _ = write!(out, "\r{frame} {message}");
                let _ = out.flush();
            }
        }
    }

    let _ = write!(out, "{CLEAR_LINE}");
    let _ = out.flush();
}
