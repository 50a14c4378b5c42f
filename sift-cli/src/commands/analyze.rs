use std::fmt::Write as _;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::warn;

use sift_core::config::SiftConfig;
use sift_core::engine::Engine;
use sift_core::types::{
    AnalysisOptions, AnalysisReport, AnalysisRequest, Category, DEFAULT_STANDARD_PROFILE,
};

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Source file to analyze; `-` or omitted reads stdin
    pub file: Option<PathBuf>,

    /// Comma-separated categories (default: all)
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Escalate warnings to errors
    #[arg(long)]
    pub strict: bool,

    /// Drop warning-severity issues
    #[arg(long)]
    pub no_warnings: bool,

    /// Drop info-severity issues
    #[arg(long)]
    pub no_hints: bool,

    /// Language standard passed to external tools
    #[arg(long = "std", default_value = DEFAULT_STANDARD_PROFILE)]
    pub standard: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

/// The engine returned a report with `success=false`.
#[derive(thiserror::Error, Debug)]
#[error("Analysis failed: {0}")]
pub struct AnalysisFailed(pub String);

pub async fn run(args: AnalyzeArgs, config: SiftConfig) -> anyhow::Result<()> {
    let source = read_source(args.file.as_ref())?;
    let categories = parse_categories(&args.categories);

    let request = AnalysisRequest::new(source, categories).with_options(AnalysisOptions {
        include_warnings: !args.no_warnings,
        include_hints: !args.no_hints,
        strict_mode: args.strict,
        standard_profile: args.standard,
    });

    let engine = Engine::from_config(config);
    let report = engine.analyze(&request).await;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Cannot serialize report")?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{}", render_text(&report)),
    }

    if !report.success {
        let message = report.error_message.unwrap_or_else(|| "unknown error".into());
        return Err(AnalysisFailed(message).into());
    }
    Ok(())
}

fn read_source(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read source: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Cannot read source from stdin")?;
            Ok(text)
        }
    }
}

/// Parse category names; unknown names are reported and ignored. An empty
/// list selects every category.
fn parse_categories(names: &[String]) -> Vec<Category> {
    if names.is_empty() {
        return Category::ALL.to_vec();
    }
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let parsed = Category::parse(name);
            if parsed.is_none() {
                warn!(category = name, "Ignoring unknown category");
            }
            parsed
        })
        .collect()
}

fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();

    if let Some(message) = &report.error_message {
        let _ = writeln!(out, "analysis failed: {message}");
        return out;
    }

    for issue in &report.issues {
        let _ = writeln!(
            out,
            "{}:{}:{}: {}: {} [{}] ({})",
            issue.file,
            issue.line,
            issue.column,
            issue.severity,
            issue.message,
            issue.rule,
            issue.source_tool,
        );
    }
    if !report.issues.is_empty() {
        out.push('\n');
    }

    if !report.suggestions.is_empty() {
        out.push_str("Suggestions:\n");
        for suggestion in &report.suggestions {
            match suggestion.issue_ref.and_then(|i| report.issues.get(i)) {
                Some(issue) => {
                    let _ = writeln!(out, "  line {}: {}", issue.line, suggestion.rationale);
                }
                None => {
                    let _ = writeln!(out, "  {}", suggestion.rationale);
                }
            }
            if !suggestion.after_snippet.is_empty() {
                let _ = writeln!(out, "    - {}", suggestion.before_snippet);
                let _ = writeln!(out, "    + {}", suggestion.after_snippet.replace('\n', "\n      "));
            }
        }
        out.push('\n');
    }

    if !report.metrics.is_empty() {
        out.push_str("Metrics:\n");
        for (name, value) in report.metrics.iter() {
            let _ = writeln!(out, "  {name:<24} {value:>8.1}");
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "{} error(s), {} warning(s), {} info; score {:.1} ({} ms)",
        report.error_count,
        report.warning_count,
        report.info_count,
        report.score,
        report.analysis_time_ms,
    );
    out
}
