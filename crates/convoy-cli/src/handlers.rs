//! Command handlers.

use crate::commands::DEFAULT_PIPELINE_FILE;
use crate::config::{CliConfig, OutputFormat};
use crate::report;
use anyhow::{Context, Result};
use console::style;
use convoy_core::pipeline::PipelineDefinition;
use convoy_runner::{DockerRuntime, TaskArgs, TaskFactory, Teardown, WorkerPool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const TEMPLATE: &str = r#"stages:
  - name: build
    jobs:
      - name: compile
        image: rust:1
        commands:
          - cargo build --locked

  - name: test
    jobs:
      - name: unit
        image: rust:1
        env:
          CARGO_TERM_COLOR: always
        commands:
          - cargo test --locked
        after_failure: cat target/debug/build/*/output
        finally: cargo clean
"#;

/// Options of `convoy run` that override the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub file: PathBuf,
    pub max_workers: Option<usize>,
    pub keep_containers: bool,
    pub output: Option<OutputFormat>,
}

fn load_pipeline(path: &Path) -> Result<PipelineDefinition> {
    debug!("opening {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let definition = PipelineDefinition::from_yaml_str(&content)
        .with_context(|| format!("invalid pipeline {}", path.display()))?;
    Ok(definition)
}

/// Run the pipeline. Returns whether the build succeeded.
pub async fn run(config: &CliConfig, options: RunOptions) -> Result<bool> {
    let pipeline = load_pipeline(&options.file)?;

    let max_workers = options.max_workers.unwrap_or(config.max_workers);
    let teardown = if options.keep_containers || !config.remove_containers {
        Teardown::Stop
    } else {
        Teardown::Remove
    };

    let runtime = DockerRuntime::connect()?;
    let factory = TaskFactory::new(Arc::new(runtime))
        .with_pool(WorkerPool::new(max_workers))
        .with_teardown(teardown);
    let mut build = factory.build(&pipeline)?;

    info!(build = %build.name(), workers = max_workers, "starting build");
    let executed = build.execute(TaskArgs::default()).await;

    match options.output.unwrap_or(config.output_format) {
        OutputFormat::Table => println!("{}", report::render(&build)),
        OutputFormat::Json => println!("{}", report::render_json(&build)?),
    }

    executed?;
    Ok(build.successful())
}

/// Validate a pipeline configuration.
pub fn validate(path: &Path) -> Result<()> {
    let definition = load_pipeline(path)?;

    println!("{} Pipeline {} is valid", style("✓").green(), path.display());
    println!("  Stages: {}", definition.stages.len());

    for stage in &definition.stages {
        let jobs: usize = stage.jobs.iter().map(|job| job.split().len()).sum();
        println!("    - {} ({} jobs)", stage.name, jobs);
    }

    Ok(())
}

/// Initialize a new pipeline.
pub fn init() -> Result<()> {
    let path = Path::new(DEFAULT_PIPELINE_FILE);

    if path.exists() {
        println!("{} {} already exists", style("!").yellow(), DEFAULT_PIPELINE_FILE);
        return Ok(());
    }

    std::fs::write(path, TEMPLATE)?;
    println!("{} Created {}", style("✓").green(), DEFAULT_PIPELINE_FILE);
    Ok(())
}

/// Print the pipeline JSON schema.
pub fn schema() -> Result<()> {
    let schema = PipelineDefinition::json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> Result<()> {
    println!("Current configuration:");
    println!("  max_workers: {}", config.max_workers);
    println!("  remove_containers: {}", config.remove_containers);
    println!("  log_format: {}", config.log_format);
    println!("  output_format: {}", config.output_format);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value).map_err(anyhow::Error::msg)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}
