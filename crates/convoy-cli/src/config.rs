//! CLI configuration management.

use anyhow::{Context, Result};
use clap::ValueEnum;
use convoy_runner::DEFAULT_MAX_WORKERS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Jobs allowed to run at once across a build.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Remove job containers when they finish; otherwise stop them.
    #[serde(default = "default_remove_containers")]
    pub remove_containers: bool,
    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Report format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_remove_containers() -> bool {
    true
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            remove_containers: default_remove_containers(),
            log_format: LogFormat::default(),
            output_format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => f.write_str("table"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl CliConfig {
    /// Load configuration from the user config directory.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Save configuration to the user config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("ci", "convoy", "convoy")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "max_workers" => {
                let workers: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid worker count: {}", value))?;
                if workers == 0 {
                    return Err("max_workers must be at least 1".to_string());
                }
                self.max_workers = workers;
            }
            "remove_containers" => {
                self.remove_containers = value
                    .parse()
                    .map_err(|_| format!("Invalid boolean: {}", value))?;
            }
            "log_format" => {
                self.log_format = LogFormat::from_str(value, true)
                    .map_err(|_| format!("Invalid log format: {}", value))?;
            }
            "output_format" => {
                self.output_format = OutputFormat::from_str(value, true)
                    .map_err(|_| format!("Invalid output format: {}", value))?;
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}
