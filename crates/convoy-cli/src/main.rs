//! Convoy CI CLI entrypoint.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod report;

use commands::{Commands, ConfigCommands};
use config::{CliConfig, LogFormat};
use handlers::RunOptions;

const EXIT_BUILD_FAILED: u8 = 1;
const EXIT_INTERNAL_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "convoy")]
#[command(author, version, about = "Convoy CI: run pipeline stages in containers", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn dispatch(cli: Cli, config: CliConfig) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            max_workers,
            keep_containers,
            output,
        } => {
            let options = RunOptions {
                file,
                max_workers,
                keep_containers,
                output,
            };
            return handlers::run(&config, options).await;
        }
        Commands::Validate { path } => handlers::validate(&path)?,
        Commands::Init => handlers::init()?,
        Commands::Schema => handlers::schema()?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&key, &value)?,
        },
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let loaded = CliConfig::load();

    let log_format = match (&loaded, cli.json_logs) {
        (_, true) => LogFormat::Json,
        (Ok(config), false) => config.log_format,
        (Err(_), false) => LogFormat::Text,
    };
    init_logging(cli.debug, log_format);

    let config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable config file");
        CliConfig::default()
    });

    match dispatch(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_BUILD_FAILED),
        Err(e) => {
            error!(error = %format!("{:#}", e), "convoy aborted");
            eprintln!("{} {:#}", style("✗").red(), e);
            ExitCode::from(EXIT_INTERNAL_ERROR)
        }
    }
}
