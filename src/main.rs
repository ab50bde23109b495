//! rubbersoul - CLI entry point.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use rubbersoul::app::{self, CLOSE_TIMEOUT, Generator, OutputMode};
use rubbersoul::backend::{DecodingParams, Endpoint, OllamaClient};
use rubbersoul::commit::{GitDiffProvider, InstructionSource};
use rubbersoul::config::{self, ConfigStore, Overrides};
use rubbersoul::error::{ConfigError, RunError};
use rubbersoul::logging::{LogOptions, Logger};
use rubbersoul::paths;

/// Write a commit message for the staged changes using a local Ollama model.
#[derive(Parser, Debug)]
#[command(name = "rubbersoul")]
#[command(about = "Write a commit message for the staged changes using a local Ollama model")]
#[command(version)]
struct Cli {
    /// Repository to read staged changes from (saved for next time)
    #[arg(short = 'p', long)]
    path: Option<PathBuf>,

    /// Ollama model to use (saved for next time)
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Restore the default model and path before applying other options
    #[arg(long)]
    reset: bool,

    /// File with custom instructions; `{diff}` marks where the diff goes
    #[arg(long, value_name = "FILE")]
    skill: Option<PathBuf>,

    /// Print the message once it is complete instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// List the models installed on the Ollama server and exit
    #[arg(long)]
    list_models: bool,

    /// Also log to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logger = init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_no_changes() => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let endpoint = Endpoint::from_env();
    let client = OllamaClient::new(&endpoint)?;

    if cli.list_models {
        let models = app::list_models(&client, &endpoint).await?;
        let mut stdout = io::stdout().lock();
        for model in models {
            writeln!(stdout, "{model}").map_err(RunError::Output)?;
        }
        return Ok(());
    }

    let store = ConfigStore::new(paths::config_file().map_err(ConfigError::Paths)?);
    let overrides = Overrides {
        model: cli.model,
        path: cli.path,
        reset: cli.reset,
    };
    let config = config::resolve(&store, &overrides)?;

    let generator = Generator {
        backend: client,
        endpoint,
        model: config.model,
        diff: GitDiffProvider::new(config.path),
        instructions: InstructionSource::from_path(cli.skill),
        mode: if cli.no_stream {
            OutputMode::Single
        } else {
            OutputMode::Stream
        },
        params: DecodingParams::default(),
        close_timeout: CLOSE_TIMEOUT,
    };

    let status = app::spinner_enabled(io::stderr().is_terminal(), cli.verbose).then(io::stderr);

    let mut stdout = io::stdout();
    generator.run(&mut stdout, status, shutdown_signal()).await?;
    info!("Done");
    Ok(())
}

fn init_logging(verbose: bool) -> Logger {
    let dir = match paths::log_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Warning: Could not locate log directory: {e:#}");
            return Logger::console_only(verbose);
        }
    };

    let options = LogOptions {
        dir,
        console: verbose,
    };
    match Logger::init(&options) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!(
                "Warning: Could not open log file in {}: {e}",
                options.dir.display()
            );
            Logger::console_only(verbose)
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
