// Performance heuristics: oversized static arrays, deep loop nests, and
// common inefficient idioms.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RulesSection;
use crate::types::{Category, Severity};

use super::{RuleOutput, line_at, position_at};

static ARRAY_BOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*(\d+)\s*\]").expect("array pattern is valid"));

static TRIPLE_LOOP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"for\s*\([^)]*\)\s*\{[^}]*for\s*\([^)]*\)\s*\{[^}]*for\s*\([^)]*\)",
    )
    .expect("loop pattern is valid")
});

struct Inefficiency {
    pattern: &'static str,
    message: &'static str,
    before: &'static str,
    after: &'static str,
}

const INEFFICIENCIES: &[Inefficiency] = &[
    Inefficiency {
        pattern: r"vector<\w+>\s+\w+\s*;[\s\S]*?\w+\.push_back",
        message: "Consider reserving vector capacity before repeated push_back",
        before: "std::vector<int> v;",
        after: "std::vector<int> v;\nv.reserve(expected_size);",
    },
    Inefficiency {
        pattern: r"string\s+\w+\s*=\s*\w+\s*\+\s*\w+",
        message: "Consider using string streams or append for repeated concatenation",
        before: "std::string s = a + b;",
        after: "std::string s;\ns.reserve(a.size() + b.size());\ns.append(a).append(b);",
    },
    Inefficiency {
        pattern: r"for\s*\([^)]*\)\s*\{[\s\S]*?\.size\(\)",
        message: "Cache the container size instead of calling size() inside the loop",
        before: "for (size_t i = 0; i < v.size(); ++i)",
        after: "for (size_t i = 0, n = v.size(); i < n; ++i)",
    },
];

static INEFFICIENCY_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    INEFFICIENCIES
        .iter()
        .map(|i| Regex::new(i.pattern).expect("inefficiency pattern is valid"))
        .collect()
});

/// Warn on every `[N]` whose `N` exceeds the configured threshold. Sizes too
/// large for `u64` are treated as exceeding it.
pub fn large_arrays(source: &str, settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();

    for caps in ARRAY_BOUND.captures_iter(source) {
        let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let size: u64 = digits.as_str().parse().unwrap_or(u64::MAX);
        if size <= settings.large_array_threshold {
            continue;
        }
        let idx = out.push_issue(
            Category::Performance,
            "memory-usage",
            Severity::Warning,
            position_at(source, whole.start()),
            format!(
                "Large static array ({} elements). Consider dynamic allocation.",
                digits.as_str()
            ),
        );
        out.suggest(
            Some(idx),
            format!("int data[{}];", digits.as_str()),
            format!("std::vector<int> data({});", digits.as_str()),
            "Large arrays on the stack risk overflow; the heap does not",
        );
    }

    out
}

/// One warning at the first loop nested three deep. The body pattern stops at
/// the first `}`, so loops separated by closed blocks are not counted.
pub fn nested_loops(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    if let Some(m) = TRIPLE_LOOP.find(source) {
        out.push_issue(
            Category::Performance,
            "algorithm-complexity",
            Severity::Warning,
            position_at(source, m.start()),
            "Triple nested loop detected. Consider algorithm optimization.".to_string(),
        );
    }
    out
}

/// At most one informational issue per inefficiency pattern.
pub fn inefficiencies(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    for (ineff, re) in INEFFICIENCIES.iter().zip(INEFFICIENCY_RES.iter()) {
        if let Some(m) = re.find(source) {
            let idx = out.push_issue(
                Category::Performance,
                "performance",
                Severity::Info,
                (line_at(source, m.start()), 1),
                ineff.message.to_string(),
            );
            out.suggest(Some(idx), ineff.before, ineff.after, ineff.message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RulesSection {
        RulesSection::default()
    }

    #[test]
    fn only_arrays_over_threshold_are_flagged() {
        let src = "int small[100];\nint exact[10000];\nstatic char big[ 20000 ];\n";
        let out = large_arrays(src, &settings());
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].line, 3);
        assert_eq!(
            out.issues[0].message,
            "Large static array (20000 elements). Consider dynamic allocation."
        );
        assert_eq!(out.suggestions[0].after_snippet, "std::vector<int> data(20000);");
    }

    #[test]
    fn overflowing_size_counts_as_large() {
        let out = large_arrays("int a[123456789012345678901234567890];", &settings());
        assert_eq!(out.issues.len(), 1);
    }

    #[test]
    fn triple_nest_warns_once() {
        let src = "\
void f(int n) {
    for (int i = 0; i < n; i++) {
        for (int j = 0; j < n; j++) {
            for (int k = 0; k < n; k++) {
                work(i, j, k);
            }
        }
    }
}
";
        let out = nested_loops(src, &settings());
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].rule, "algorithm-complexity");
        assert_eq!((out.issues[0].line, out.issues[0].column), (2, 5));
    }

    #[test]
    fn double_nest_and_sibling_loops_are_quiet() {
        let src = "\
for (int i = 0; i < n; i++) {
    for (int j = 0; j < n; j++) {
        work(i, j);
    }
}
for (int k = 0; k < n; k++) {
    work(k);
}
";
        assert!(nested_loops(src, &settings()).issues.is_empty());
    }

    #[test]
    fn inefficiency_patterns() {
        let src = "\
std::vector<int> v;
for (size_t i = 0; i < n; ++i) {
    v.push_back(items[i]);
    total += items.size();
}
std::string s = a + b;
";
        let out = inefficiencies(src, &settings());
        let lines: Vec<_> = out.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 6, 2]);
        assert!(out.issues.iter().all(|i| i.severity == Severity::Info));
        assert_eq!(out.suggestions.len(), 3);
    }

    #[test]
    fn size_call_in_loop_body_is_reported() {
        let src = "int n = 0;\nfor (int i = 0; i < n; ++i) {\n    total += items.size();\n}\n";
        let out = inefficiencies(src, &settings());
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].line, 2);
        assert!(out.issues[0].message.contains("size()"));
    }

    #[test]
    fn size_call_only_in_loop_header_is_not_reported() {
        let src = "for (size_t i = 0; i < items.size(); ++i) {\n    total += i;\n}\n";
        assert!(inefficiencies(src, &settings()).issues.is_empty());
    }

    #[test]
    fn clean_loop_has_no_inefficiency() {
        let src = "for (int i = 0; i < n; ++i) {\n    total += i;\n}\n";
        assert!(inefficiencies(src, &settings()).issues.is_empty());
    }
}
