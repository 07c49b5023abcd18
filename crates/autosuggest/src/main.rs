//! Main entry point for the autosuggest command-line tool

// Internal modules
mod commands;
mod sources;

// Internal imports (std, crate)
use crate::commands::Command;
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use anyhow::{Context, Result, bail};
use autosuggest_common::{LogFormat, init_tracing};
use autosuggest_config::ApplicationConfig;
use autosuggest_config::source::{ConfigurationLoader, EnvironmentSource, TomlFileSource};
use autosuggest_engine::{NamedIndex, SuggesterEngine};
use clap::Parser;

/// autosuggest - term completion for source trees
///
/// Every `--source` directory is indexed as one project named after the
/// directory. Completion data is kept under the suggester directory and reused
/// while the sources stay unchanged.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory to index (repeatable)
    #[arg(long = "source", short = 's', required = true)]
    sources: Vec<PathBuf>,

    /// Optional configuration file path (TOML format)
    #[arg(long, short = 'c')]
    config_file: Option<PathBuf>,

    /// Directory for completion data, overriding the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log line format (json or compact), overriding the configuration
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config_file.as_deref())?;

    let format: LogFormat = cli
        .log_format
        .as_deref()
        .unwrap_or(&config.telemetry.log_format)
        .parse()
        .map_err(anyhow::Error::msg)?;
    init_tracing(format, &config.telemetry.tracing_level);

    let mut suggester = config.suggester;
    if let Some(dir) = cli.data_dir {
        suggester.suggester_dir = dir;
    }

    let engine = SuggesterEngine::new(suggester).context("Invalid suggester configuration")?;
    let indexes = sources::load_projects(&cli.sources)?;

    // Close on every path so lifecycle work stops and counts reach the disk
    let outcome = run(&engine, &cli.sources, indexes, cli.command).await;
    engine.close().await;
    outcome
}

async fn run(
    engine: &SuggesterEngine,
    roots: &[PathBuf],
    indexes: Vec<NamedIndex>,
    command: Command,
) -> Result<()> {
    engine.init(indexes.clone()).await?;
    commands::run(engine, roots, indexes, command).await
}

/// Defaults, then the optional TOML file, then `AUTOSUGGEST_*` variables
fn load_config(config_file: Option<&Path>) -> Result<ApplicationConfig> {
    let mut loader = ConfigurationLoader::new().add_source(Box::new(EnvironmentSource));
    if let Some(path) = config_file {
        if !path.is_file() {
            bail!("Config file '{}' does not exist", path.display());
        }
        loader = loader.add_source(Box::new(TomlFileSource::new(path)));
    }
    loader.load().context("Failed to load configuration")
}
