use std::path::PathBuf;

use clap::Parser;
use sift_core::error::ConfigError;

use crate::commands::analyze::AnalysisFailed;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "sift",
    version,
    about = "Run C++ analyzers and rule checks, and merge their findings into one report"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Config file (default: ./sift.toml when present)
    #[arg(short, long, global = true, env = "SIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
///   0: success (the report may still contain issues)
///   1: general/unknown error
///   2: configuration error
///   3: analysis failed (`success=false` in the report)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<AnalysisFailed>().is_some() {
        3
    } else if err.chain().any(|cause| cause.is::<ConfigError>()) {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    // Logs go to stderr so JSON on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.config.as_deref())) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
