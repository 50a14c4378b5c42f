use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Categories ─────────────────────────────────────────────────────

/// A requested class of analysis; selects which analyzer modules run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum Category {
    /// Compiler-level diagnostics from the checker tool.
    Syntax,
    /// Lint diagnostics from the lint tool.
    StaticLint,
    /// Dangerous calls, leaks, and unchecked input.
    Security,
    /// Large allocations, nested loops, and known-slow idioms.
    Performance,
    /// Naming and anti-pattern checks.
    Style,
    /// Complexity metrics and thresholds.
    Complexity,
    /// The custom rule set: anti-patterns, naming, and complexity.
    Custom,
    /// Any category name this engine does not recognize; resolves to no analyzers.
    Unsupported,
}

impl Category {
    /// Every supported category, in scheduling order.
    pub const ALL: [Self; 7] = [
        Self::Syntax,
        Self::StaticLint,
        Self::Security,
        Self::Performance,
        Self::Style,
        Self::Complexity,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::StaticLint => "staticLint",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Complexity => "complexity",
            Self::Custom => "custom",
            Self::Unsupported => "unsupported",
        }
    }

    /// Parse a category name, accepting `static-lint`, `static_lint`, and
    /// `staticLint` spellings. Returns `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "syntax" => Some(Self::Syntax),
            "staticlint" | "lint" => Some(Self::StaticLint),
            "security" => Some(Self::Security),
            "performance" => Some(Self::Performance),
            "style" => Some(Self::Style),
            "complexity" => Some(Self::Complexity),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl From<String> for Category {
    fn from(name: String) -> Self {
        Self::parse(&name).unwrap_or(Self::Unsupported)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Issues ─────────────────────────────────────────────────────────

/// Diagnostic severity bucket. Every issue lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical diagnostic record every analyzer module emits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub file: String,
    /// 1-based line; `0` when the producer could not tell.
    pub line: u32,
    /// 1-based column; `0` when unknown.
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    pub rule: String,
    /// Which tool or rule-engine module produced this issue.
    pub source_tool: String,
    pub category: Category,
}

/// Likelihood-times-impact rating attached to security findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// An [`Issue`] with security classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    #[serde(flatten)]
    pub issue: Issue,
    pub vulnerability_type: String,
    pub risk_level: RiskLevel,
}

/// A concrete before/after rewrite attached to an issue, or to the report
/// as a whole when `issue_ref` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    /// Index into the owning `issues` list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_ref: Option<usize>,
    pub before_snippet: String,
    pub after_snippet: String,
    pub rationale: String,
}

// ── Metrics ────────────────────────────────────────────────────────

/// Well-known metric names.
pub mod metric {
    pub const CYCLOMATIC_COMPLEXITY: &str = "cyclomatic_complexity";
    pub const COGNITIVE_COMPLEXITY: &str = "cognitive_complexity";
    pub const LINES_OF_CODE: &str = "lines_of_code";
    pub const FUNCTION_COUNT: &str = "function_count";
    pub const CLASS_COUNT: &str = "class_count";
    pub const TOTAL_LINES: &str = "total_lines";
    pub const COMMENT_LINES: &str = "comment_lines";
    pub const BLANK_LINES: &str = "blank_lines";
    pub const MAX_NESTING_DEPTH: &str = "max_nesting_depth";
    pub const MAINTAINABILITY_INDEX: &str = "maintainability_index";
}

/// Metric name → value. Each name is produced by exactly one check, so
/// merging is plain insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplexityMetrics(BTreeMap<String, f64>);

impl ComplexityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Insert every metric from `other`, overwriting same-named entries.
    pub fn merge_from(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn cyclomatic_complexity(&self) -> Option<f64> {
        self.get(metric::CYCLOMATIC_COMPLEXITY)
    }

    pub fn cognitive_complexity(&self) -> Option<f64> {
        self.get(metric::COGNITIVE_COMPLEXITY)
    }

    pub fn lines_of_code(&self) -> Option<f64> {
        self.get(metric::LINES_OF_CODE)
    }

    pub fn function_count(&self) -> Option<f64> {
        self.get(metric::FUNCTION_COUNT)
    }
}

// ── Requests ───────────────────────────────────────────────────────

pub const DEFAULT_STANDARD_PROFILE: &str = "c++20";

/// Caller-controlled knobs for one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    /// Keep warning-severity issues in the report.
    pub include_warnings: bool,
    /// Keep info-severity issues (hints) in the report.
    pub include_hints: bool,
    /// Escalate every warning to an error.
    pub strict_mode: bool,
    /// Language standard passed to external tools, e.g. `c++17`.
    pub standard_profile: String,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_warnings: true,
            include_hints: true,
            strict_mode: false,
            standard_profile: DEFAULT_STANDARD_PROFILE.to_string(),
        }
    }
}

impl AnalysisOptions {
    /// The standard profile if it is a plain token like `c++17` or `gnu11`,
    /// otherwise the default.
    pub fn sanitized_standard(&self) -> &str {
        sanitize_standard(&self.standard_profile)
    }
}

/// `profile` if it is a short `[A-Za-z0-9+]` token, otherwise
/// [`DEFAULT_STANDARD_PROFILE`].
pub fn sanitize_standard(profile: &str) -> &str {
    let plain = !profile.is_empty()
        && profile.len() <= 16
        && profile.chars().all(|c| c.is_ascii_alphanumeric() || c == '+');
    if plain { profile } else { DEFAULT_STANDARD_PROFILE }
}

/// One unit of work for the engine. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub source_text: String,
    #[serde(rename = "analysisCategories")]
    pub categories: BTreeSet<Category>,
    #[serde(default)]
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn new(source_text: impl Into<String>, categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            source_text: source_text.into(),
            categories: categories.into_iter().collect(),
            options: AnalysisOptions::default(),
        }
    }

    /// A request for every supported category.
    pub fn full(source_text: impl Into<String>) -> Self {
        Self::new(source_text, Category::ALL)
    }

    #[must_use]
    pub fn with_options(mut self, options: AnalysisOptions) -> Self {
        self.options = options;
        self
    }
}

// ── Report ─────────────────────────────────────────────────────────

/// The terminal aggregate returned for every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub success: bool,
    pub issues: Vec<Issue>,
    pub security_findings: Vec<SecurityFinding>,
    pub metrics: ComplexityMetrics,
    pub suggestions: Vec<FixSuggestion>,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    /// Composite 0–100 quality score.
    pub score: f64,
    pub analysis_time_ms: u64,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisReport {
    /// A fatal-failure report: no issues, `success=false`, message set.
    pub fn failed(message: impl Into<String>, analysis_time_ms: u64) -> Self {
        Self {
            success: false,
            issues: Vec::new(),
            security_findings: Vec::new(),
            metrics: ComplexityMetrics::new(),
            suggestions: Vec::new(),
            error_count: 0,
            warning_count: 0,
            info_count: 0,
            score: 0.0,
            analysis_time_ms,
            generated_at: Utc::now(),
            error_message: Some(message.into()),
        }
    }

    /// Number of issues in the given severity bucket.
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Issues emitted under a given rule id.
    pub fn issues_with_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues.iter().filter(move |i| i.rule == rule)
    }
}
