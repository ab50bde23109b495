//! Log setup.
//!
//! Logging is owned by a [`Logger`] created in `main` and dropped when the
//! process finishes. The subscriber is installed as the thread's default for
//! as long as the logger lives, never globally.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Used when `RUST_LOG` is not set. HTTP plumbing is kept quiet.
const DEFAULT_FILTER: &str = "debug,hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,rustls=warn";

/// Name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "app.log";

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub dir: PathBuf,
    /// Also log to stderr.
    pub console: bool,
}

/// Active logging configuration. Logging stops when this is dropped.
pub struct Logger {
    file: Option<PathBuf>,
    _guard: DefaultGuard,
}

impl Logger {
    /// Log to `<dir>/app.log`, truncating the previous run's log.
    pub fn init(options: &LogOptions) -> std::io::Result<Self> {
        std::fs::create_dir_all(&options.dir)?;
        let path = options.dir.join(LOG_FILE_NAME);
        let file = File::create(&path)?;

        let file_layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false);
        let console_layer = options
            .console
            .then(|| fmt::layer().with_writer(std::io::stderr));

        let subscriber = tracing_subscriber::registry()
            .with(filter())
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            file: Some(path),
            _guard: tracing::subscriber::set_default(subscriber),
        })
    }

    /// Log only to stderr, or nowhere when `console` is false.
    pub fn console_only(console: bool) -> Self {
        let console_layer = console.then(|| fmt::layer().with_writer(std::io::stderr));
        let subscriber = tracing_subscriber::registry()
            .with(filter())
            .with(console_layer);

        Self {
            file: None,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    /// Path of the log file, if logging to a file.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
