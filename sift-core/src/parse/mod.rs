//! Parsers that turn raw external-tool diagnostics into [`Issue`]s.
//!
//! Parsing is line-oriented and tolerant: lines that do not match the tool's
//! format are skipped, and unparseable line/column numbers become `0`.

pub mod clang_tidy;
pub mod cppcheck;

use crate::types::Issue;

pub use clang_tidy::LintParser;
pub use cppcheck::CheckerParser;

/// Common interface for tool output parsers.
pub trait OutputParser: Send + Sync + std::fmt::Debug {
    /// Name recorded as `source_tool` on every emitted issue.
    fn tool(&self) -> &'static str;

    /// Parse raw tool output. Never fails.
    fn parse(&self, raw: &str) -> Vec<Issue>;
}

/// Parse a line/column field, falling back to `0` when out of range.
pub(crate) fn position(field: &str) -> u32 {
    field.parse().unwrap_or(0)
}

/// Iterate lines with any trailing `\r` removed.
pub(crate) fn lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(|line| line.trim_end_matches('\r'))
}
