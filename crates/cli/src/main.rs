//! Tellerdesk CLI - staff session management

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "tellerdesk")]
#[command(about = "Sign in to Tellerdesk and keep the staff session alive")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Settings file (TOML or JSON)
    #[arg(short = 'c', long, global = true, env = "TELLERDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the stored session and log file
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::load_settings(cli.config.as_deref(), cli.data_dir)?;
    logging::init_logging(cli.log_level.into(), &settings.data_dir, cli.no_file_log)?;

    debug!(api_root = %settings.api_root, data_dir = %settings.data_dir.display(), "Starting Tellerdesk CLI");

    if let Err(e) = cli.command.execute(settings).await {
        error!("Command failed: {e:#}");
        eprintln!("{e}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
