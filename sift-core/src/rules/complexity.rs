// Complexity heuristics: decision-point counting and whole-file code metrics.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RulesSection;
use crate::types::{Category, Severity, metric};

use super::RuleOutput;

static DECISION_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:if|while|for|case|catch)\b").expect("decision pattern is valid")
});

static COGNITIVE_KEYWORD: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["if", "else", "while", "for", "switch", "catch", "goto"]
        .iter()
        .map(|kw| Regex::new(&format!(r"\b{kw}\b")).expect("keyword pattern is valid"))
        .collect()
});

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[\w:<>,*&\s]+?\b([A-Za-z_~][\w:]*)\s*\([^;]*\)\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?\{?\s*$",
    )
    .expect("function pattern is valid")
});

static CLASS_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:class|struct)\s+\w+").expect("class pattern is valid"));

const NOT_FUNCTIONS: &[&str] = &[
    "if", "else", "while", "for", "switch", "catch", "return", "sizeof", "do", "new", "delete",
];

/// McCabe-style count: one plus every decision keyword, logical operator and
/// ternary in the text. Keywords are word-bounded; operators are substrings.
pub fn cyclomatic(source: &str) -> u32 {
    let keywords = DECISION_KEYWORD.find_iter(source).count();
    let operators = source.matches("&&").count() + source.matches("||").count();
    let ternaries = source.matches('?').count();
    u32::try_from(1 + keywords + operators + ternaries).unwrap_or(u32::MAX)
}

/// Record cyclomatic complexity; warn when it exceeds the threshold.
pub fn cyclomatic_complexity(source: &str, settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    let value = cyclomatic(source);
    out.metrics
        .insert(metric::CYCLOMATIC_COMPLEXITY, f64::from(value));

    if value > settings.complexity_threshold {
        out.push_issue(
            Category::Complexity,
            "complexity",
            Severity::Warning,
            (1, 1),
            format!("High cyclomatic complexity ({value}). Consider refactoring."),
        );
    }
    out
}

#[derive(Debug, Default, PartialEq, Eq)]
struct LineCounts {
    total: usize,
    code: usize,
    comment: usize,
    blank: usize,
    functions: usize,
    classes: usize,
}

fn count_lines(source: &str) -> LineCounts {
    let mut counts = LineCounts::default();
    let mut in_block_comment = false;

    for line in source.lines() {
        counts.total += 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            counts.blank += 1;
            continue;
        }
        if in_block_comment {
            counts.comment += 1;
            if trimmed.contains("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.starts_with("//") {
            counts.comment += 1;
            continue;
        }
        if trimmed.starts_with("/*") {
            counts.comment += 1;
            in_block_comment = !trimmed.contains("*/");
            continue;
        }

        counts.code += 1;
        let is_function = FUNCTION_DEF
            .captures(trimmed)
            .is_some_and(|caps| !NOT_FUNCTIONS.contains(&&caps[1]));
        if is_function {
            counts.functions += 1;
        }
        if CLASS_DEF.is_match(trimmed) {
            counts.classes += 1;
        }
    }
    counts
}

/// Sum of `1 + depth` for each control keyword, plus one per logical operator.
/// Depth is the brace depth at the start of the line.
fn cognitive(source: &str) -> u32 {
    let mut depth: usize = 0;
    let mut score: usize = 0;

    for line in source.lines() {
        let trimmed = line.trim();
        for keyword in COGNITIVE_KEYWORD.iter() {
            if keyword.is_match(trimmed) {
                score += 1 + depth;
            }
        }
        score += trimmed.matches("&&").count() + trimmed.matches("||").count();

        for ch in trimmed.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }
    u32::try_from(score).unwrap_or(u32::MAX)
}

fn max_nesting(source: &str) -> u32 {
    let mut depth: u32 = 0;
    let mut max: u32 = 0;
    for ch in source.chars() {
        match ch {
            '{' => {
                depth = depth.saturating_add(1);
                max = max.max(depth);
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// `171 - 5.2 ln(V) - 0.23 CC - 16.2 ln(LOC + 1)` with the volume estimated
/// as `log2(LOC + 1) * (LOC + 1)`, clamped to `0..=100`.
#[allow(clippy::cast_precision_loss)]
fn maintainability(lines_of_code: usize, cyclomatic: u32) -> f64 {
    let loc = lines_of_code as f64 + 1.0;
    let volume = (loc.log2() * loc).max(1.0);
    let index = 171.0 - 5.2 * volume.ln() - 0.23 * f64::from(cyclomatic) - 16.2 * loc.ln();
    index.clamp(0.0, 100.0)
}

/// Whole-file metrics. Emits no issues.
#[allow(clippy::cast_precision_loss)]
pub fn code_metrics(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    let counts = count_lines(source);

    let m = &mut out.metrics;
    m.insert(metric::TOTAL_LINES, counts.total as f64);
    m.insert(metric::LINES_OF_CODE, counts.code as f64);
    m.insert(metric::COMMENT_LINES, counts.comment as f64);
    m.insert(metric::BLANK_LINES, counts.blank as f64);
    m.insert(metric::FUNCTION_COUNT, counts.functions as f64);
    m.insert(metric::CLASS_COUNT, counts.classes as f64);
    m.insert(metric::COGNITIVE_COMPLEXITY, f64::from(cognitive(source)));
    m.insert(metric::MAX_NESTING_DEPTH, f64::from(max_nesting(source)));
    m.insert(
        metric::MAINTAINABILITY_INDEX,
        maintainability(counts.code, cyclomatic(source)),
    );
    out
}
