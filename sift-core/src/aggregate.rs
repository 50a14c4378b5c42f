//! Merge per-module outputs into one [`AnalysisReport`].
//!
//! Issues keep module schedule order and are never re-sorted. Request
//! options are applied after concatenation: strict escalation first, then
//! severity filtering, so a filtered-out warning in strict mode survives as
//! an error.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::rules::RuleOutput;
use crate::types::{
    AnalysisOptions, AnalysisReport, Category, ComplexityMetrics, FixSuggestion, Issue, Severity,
    metric,
};

/// Issues sharing one of these categories trigger a report-level suggestion.
const CATEGORY_SUGGESTION_THRESHOLD: usize = 3;

/// Concatenate `outputs` in order and build the final report.
pub fn merge(
    outputs: impl IntoIterator<Item = RuleOutput>,
    options: &AnalysisOptions,
    analysis_time_ms: u64,
) -> AnalysisReport {
    let mut issues: Vec<Issue> = Vec::new();
    let mut suggestions: Vec<FixSuggestion> = Vec::new();
    let mut security_findings = Vec::new();
    let mut metrics = ComplexityMetrics::new();

    for output in outputs {
        let base = issues.len();
        issues.extend(output.issues);
        suggestions.extend(output.suggestions.into_iter().map(|mut s| {
            s.issue_ref = s.issue_ref.map(|r| r + base);
            s
        }));
        security_findings.extend(output.security_findings);
        metrics.merge_from(output.metrics);
    }

    if options.strict_mode {
        let escalate = |issue: &mut Issue| {
            if issue.severity == Severity::Warning {
                issue.severity = Severity::Error;
            }
        };
        issues.iter_mut().for_each(escalate);
        security_findings
            .iter_mut()
            .for_each(|f| escalate(&mut f.issue));
    }

    let keep = |issue: &Issue| match issue.severity {
        Severity::Error => true,
        Severity::Warning => options.include_warnings,
        Severity::Info => options.include_hints,
    };

    // Old index -> new index for surviving issues.
    let mut remap: Vec<Option<usize>> = Vec::with_capacity(issues.len());
    let mut kept = Vec::with_capacity(issues.len());
    for issue in issues {
        if keep(&issue) {
            remap.push(Some(kept.len()));
            kept.push(issue);
        } else {
            remap.push(None);
        }
    }
    let issues = kept;
    for suggestion in &mut suggestions {
        suggestion.issue_ref = suggestion
            .issue_ref
            .and_then(|r| remap.get(r).copied().flatten());
    }
    security_findings.retain(|f| keep(&f.issue));

    suggestions.extend(category_suggestions(&issues));

    let error_count = count(&issues, Severity::Error);
    let warning_count = count(&issues, Severity::Warning);
    let info_count = count(&issues, Severity::Info);
    let score = score(error_count, warning_count, info_count, &metrics);

    AnalysisReport {
        success: true,
        issues,
        security_findings,
        metrics,
        suggestions,
        error_count,
        warning_count,
        info_count,
        score,
        analysis_time_ms,
        generated_at: Utc::now(),
        error_message: None,
    }
}

fn count(issues: &[Issue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}

/// One advisory suggestion per category with enough issues to suggest a
/// systemic problem.
fn category_suggestions(issues: &[Issue]) -> Vec<FixSuggestion> {
    let mut per_category: BTreeMap<Category, usize> = BTreeMap::new();
    for issue in issues {
        *per_category.entry(issue.category).or_default() += 1;
    }

    per_category
        .into_iter()
        .filter(|&(_, n)| n >= CATEGORY_SUGGESTION_THRESHOLD)
        .filter_map(|(category, _)| {
            let (before, after, rationale) = match category {
                Category::Security => (
                    "strcpy(buf, input);",
                    "std::string buf = input;",
                    "Security issues detected. Consider safer alternatives and input validation",
                ),
                Category::Performance => (
                    "",
                    "",
                    "Multiple performance issues detected. Consider profiling and optimizing hot paths",
                ),
                Category::Style => (
                    "",
                    "",
                    "Consider a formatter such as clang-format for consistent style",
                ),
                Category::Complexity => (
                    "",
                    "",
                    "Consider splitting large functions into smaller, focused ones",
                ),
                _ => return None,
            };
            Some(FixSuggestion {
                issue_ref: None,
                before_snippet: before.to_string(),
                after_snippet: after.to_string(),
                rationale: rationale.to_string(),
            })
        })
        .collect()
}

/// Composite 0–100 score: severity penalties plus complexity and nesting
/// overruns.
#[allow(clippy::cast_precision_loss)]
pub fn score(errors: usize, warnings: usize, infos: usize, metrics: &ComplexityMetrics) -> f64 {
    let mut score = 100.0 - 10.0 * errors as f64 - 5.0 * warnings as f64 - infos as f64;
    if let Some(cc) = metrics.get(metric::CYCLOMATIC_COMPLEXITY) {
        if cc > 10.0 {
            score -= (cc - 10.0) * 2.0;
        }
    }
    if let Some(depth) = metrics.get(metric::MAX_NESTING_DEPTH) {
        if depth > 4.0 {
            score -= (depth - 4.0) * 3.0;
        }
    }
    score.clamp(0.0, 100.0)
}
