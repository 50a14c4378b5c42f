//! In-process rule engine.
//!
//! Every check is a pure function over the raw source text. Checks are
//! textual heuristics, not parsers: they must cope with source that does not
//! compile, and they never touch the filesystem or spawn processes, so they
//! run even when every external tool is missing.

pub mod complexity;
pub mod performance;
pub mod security;
pub mod style;

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::config::RulesSection;
use crate::error::SiftError;
use crate::types::{
    Category, ComplexityMetrics, FixSuggestion, Issue, RiskLevel, SecurityFinding, Severity,
};

/// `source_tool` recorded on issues produced by the rule engine.
pub const RULE_ENGINE: &str = "sift";

/// Everything one check produced. `issue_ref`s in `suggestions` index into
/// this output's own `issues`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutput {
    pub issues: Vec<Issue>,
    pub suggestions: Vec<FixSuggestion>,
    pub security_findings: Vec<SecurityFinding>,
    pub metrics: ComplexityMetrics,
}

impl RuleOutput {
    /// Append an issue and return its index.
    pub(crate) fn push_issue(
        &mut self,
        category: Category,
        rule: &str,
        severity: Severity,
        (line, column): (u32, u32),
        message: String,
    ) -> usize {
        self.issues.push(Issue {
            file: String::new(),
            line,
            column,
            severity,
            message,
            rule: rule.to_string(),
            source_tool: RULE_ENGINE.to_string(),
            category,
        });
        self.issues.len() - 1
    }

    /// Record issue `index` as a security finding too.
    pub(crate) fn flag_security(&mut self, index: usize, vulnerability_type: &str, risk_level: RiskLevel) {
        if let Some(issue) = self.issues.get(index) {
            self.security_findings.push(SecurityFinding {
                issue: issue.clone(),
                vulnerability_type: vulnerability_type.to_string(),
                risk_level,
            });
        }
    }

    pub(crate) fn suggest(
        &mut self,
        issue_ref: Option<usize>,
        before: impl Into<String>,
        after: impl Into<String>,
        rationale: impl Into<String>,
    ) {
        self.suggestions.push(FixSuggestion {
            issue_ref,
            before_snippet: before.into(),
            after_snippet: after.into(),
            rationale: rationale.into(),
        });
    }

    /// Set `file` on every issue and finding that has none yet.
    pub fn label_file(&mut self, file: &str) {
        let issues = self
            .issues
            .iter_mut()
            .chain(self.security_findings.iter_mut().map(|f| &mut f.issue));
        for issue in issues {
            if issue.file.is_empty() {
                issue.file = file.to_string();
            }
        }
    }
}

pub type CheckFn = fn(&str, &RulesSection) -> RuleOutput;

/// A registered rule-engine check.
#[derive(Debug, Clone, Copy)]
pub struct RuleCheck {
    pub name: &'static str,
    /// Categories that schedule this check. The first is the category
    /// stamped on its issues.
    pub categories: &'static [Category],
    pub check: CheckFn,
}

impl RuleCheck {
    pub fn primary_category(&self) -> Category {
        self.categories.first().copied().unwrap_or(Category::Custom)
    }

    /// Run the check, turning a panic into [`SiftError::Internal`].
    pub fn run(&self, source: &str, settings: &RulesSection) -> Result<RuleOutput, SiftError> {
        catch_unwind(AssertUnwindSafe(|| (self.check)(source, settings))).map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "check panicked".to_string());
            SiftError::Internal {
                module: self.name.to_string(),
                message,
            }
        })
    }
}

/// Every rule-engine check, in scheduling order.
pub static CHECKS: &[RuleCheck] = &[
    RuleCheck {
        name: "unsafe-functions",
        categories: &[Category::Security],
        check: security::unsafe_functions,
    },
    RuleCheck {
        name: "resource-balance",
        categories: &[Category::Security],
        check: security::resource_balance,
    },
    RuleCheck {
        name: "input-validation",
        categories: &[Category::Security],
        check: security::input_validation,
    },
    RuleCheck {
        name: "large-arrays",
        categories: &[Category::Performance],
        check: performance::large_arrays,
    },
    RuleCheck {
        name: "nested-loops",
        categories: &[Category::Performance],
        check: performance::nested_loops,
    },
    RuleCheck {
        name: "inefficiencies",
        categories: &[Category::Performance],
        check: performance::inefficiencies,
    },
    RuleCheck {
        name: "anti-patterns",
        categories: &[Category::Style, Category::Custom],
        check: style::anti_patterns,
    },
    RuleCheck {
        name: "naming-convention",
        categories: &[Category::Style, Category::Custom],
        check: style::naming_convention,
    },
    RuleCheck {
        name: "cyclomatic-complexity",
        categories: &[Category::Complexity, Category::Custom],
        check: complexity::cyclomatic_complexity,
    },
    RuleCheck {
        name: "code-metrics",
        categories: &[Category::Complexity],
        check: complexity::code_metrics,
    },
];

/// Checks scheduled by `category`, in registry order.
pub fn checks_for(category: Category) -> impl Iterator<Item = &'static RuleCheck> {
    CHECKS
        .iter()
        .filter(move |check| check.categories.contains(&category))
}

/// 1-based line containing byte `offset`: newlines before it, plus one.
pub(crate) fn line_at(text: &str, offset: usize) -> u32 {
    let end = offset.min(text.len());
    let newlines = text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

/// 1-based `(line, column)` of byte `offset`.
pub(crate) fn position_at(text: &str, offset: usize) -> (u32, u32) {
    let end = offset.min(text.len());
    let line_start = text.as_bytes()[..end]
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let column = u32::try_from(end - line_start + 1).unwrap_or(u32::MAX);
    (line_at(text, end), column)
}

/// 1-based line number for a 0-based line index.
pub(crate) fn line_number(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}
