pub mod analyze;
pub mod config;
pub mod tools;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use sift_core::config::SiftConfig;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "sift.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a source file (or stdin) and print the merged report
    Analyze(analyze::AnalyzeArgs),
    /// List configured external tools and whether they are available
    Tools,
    /// Print the effective configuration as TOML
    Config,
}

pub async fn run(cmd: Command, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    match cmd {
        Command::Analyze(args) => analyze::run(args, config).await,
        Command::Tools => {
            tools::run(&config);
            Ok(())
        }
        Command::Config => config::run(&config),
    }
}

/// Load an explicit config file, else `./sift.toml` if it exists, else defaults.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<SiftConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !local.exists() {
                return Ok(SiftConfig::default());
            }
            local
        }
    };
    SiftConfig::load(&path).with_context(|| format!("Cannot load config: {}", path.display()))
}
