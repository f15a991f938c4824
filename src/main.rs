use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use voxd::config::Config;
use voxd::logging::init_logging;
use voxd::{app, daemon, server};

/// Voice-to-text front-ends over a remote transcription API.
#[derive(Parser)]
#[command(name = "voxd", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe speech to the terminal and the transcript file
    Listen,
    /// Manage the background voice-to-keyboard daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Serve the browser front-end
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the daemon in the background
    Start,
    /// Stop a running daemon
    Stop,
    /// Report whether the daemon is running
    Status,
    /// Stop and start the daemon
    Restart,
}

// No #[tokio::main]: `daemon start` must fork before any runtime threads
// exist, so each command builds its own runtime where it needs one.
fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path).context(format!("Reading config {}", path.display()))?
    } else {
        Config::load_or_write_default(None)?
    };

    match cli.command {
        Command::Listen => runtime()?.block_on(app::run(config)),
        Command::Daemon { action } => match action {
            DaemonAction::Start => daemon::start(&config),
            DaemonAction::Stop => daemon::stop(&config.daemon),
            DaemonAction::Status => daemon::status(&config.daemon),
            DaemonAction::Restart => daemon::restart(&config),
        },
        Command::Serve { bind, port } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            runtime()?.block_on(server::run(&config))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Creating tokio runtime")
}
