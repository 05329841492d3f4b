//! CLI command definitions.

use crate::config::OutputFormat;
use clap::Subcommand;
use std::path::PathBuf;

/// Pipeline file looked up in the working directory.
pub const DEFAULT_PIPELINE_FILE: &str = ".convoy.yml";

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline in local containers
    Run {
        /// Path to pipeline file
        #[arg(short, long, default_value = DEFAULT_PIPELINE_FILE)]
        file: PathBuf,

        /// Maximum number of jobs running at once
        #[arg(long)]
        max_workers: Option<usize>,

        /// Stop job containers instead of removing them
        #[arg(long)]
        keep_containers: bool,

        /// Report format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Validate pipeline configuration
    Validate {
        /// Path to pipeline file
        #[arg(default_value = DEFAULT_PIPELINE_FILE)]
        path: PathBuf,
    },

    /// Initialize a new pipeline
    Init,

    /// Print the JSON schema of the pipeline file
    Schema,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set configuration value
    Set {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}
