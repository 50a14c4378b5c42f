// Style heuristics: type naming and known anti-patterns.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RulesSection;
use crate::types::{Category, Severity};

use super::{RuleOutput, line_number, position_at};

static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:class|struct)\s+([a-z][A-Za-z0-9_]*)").expect("type pattern is valid")
});

struct AntiPattern {
    pattern: &'static str,
    message: &'static str,
}

const ANTI_PATTERNS: &[AntiPattern] = &[
    AntiPattern {
        pattern: r"\busing\s+namespace\s+std\s*;",
        message: "Avoid 'using namespace std'; it pulls every std name into scope",
    },
    AntiPattern {
        pattern: r"#\s*include\s*<bits/stdc\+\+\.h>",
        message: "Avoid <bits/stdc++.h>; include only the headers you use",
    },
    AntiPattern {
        pattern: r"\bmalloc\s*\(",
        message: "Prefer 'new' or a standard container over 'malloc' in C++",
    },
    AntiPattern {
        pattern: r"catch\s*\(\s*\.\.\.\s*\)",
        message: "Catching every exception with '...' hides the failure cause",
    },
    AntiPattern {
        pattern: r"\bgoto\s+\w+\s*;",
        message: "Avoid 'goto'; restructure the control flow",
    },
    AntiPattern {
        pattern: r"#\s*define\s+[A-Z_][A-Z0-9_]*\s+\d",
        message: "Prefer 'constexpr' constants over numeric '#define' macros",
    },
];

static ANTI_PATTERN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ANTI_PATTERNS
        .iter()
        .map(|p| Regex::new(p.pattern).expect("anti-pattern is valid"))
        .collect()
});

/// Flag every `class`/`struct` whose name starts with a lowercase letter.
pub fn naming_convention(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    let mut cursor = 0;

    while let Some(caps) = TYPE_DECL.captures_at(source, cursor) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        cursor = whole.end();

        let name = name.as_str();
        let idx = out.push_issue(
            Category::Style,
            "naming-convention",
            Severity::Info,
            position_at(source, whole.start()),
            format!("Type name '{name}' should start with an uppercase letter"),
        );

        let mut chars = name.chars();
        let renamed: String = chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        let keyword = whole.as_str().split_whitespace().next().unwrap_or("class");
        out.suggest(
            Some(idx),
            format!("{keyword} {name}"),
            format!("{keyword} {renamed}"),
            "Type names use PascalCase",
        );
    }

    out
}

/// One issue per line per matching anti-pattern.
pub fn anti_patterns(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();

    for (index, line) in source.lines().enumerate() {
        for (pattern, re) in ANTI_PATTERNS.iter().zip(ANTI_PATTERN_RES.iter()) {
            if let Some(m) = re.find(line) {
                out.push_issue(
                    Category::Style,
                    "custom-pattern",
                    Severity::Warning,
                    (
                        line_number(index),
                        u32::try_from(m.start() + 1).unwrap_or(u32::MAX),
                    ),
                    pattern.message.to_string(),
                );
            }
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
    fn lowercase_types_are_flagged_with_position() {
        let src = "class Good {};\n\nclass badName {\n};\n  struct point { int x; };\n";
        let out = naming_convention(src, &settings());
        assert_eq!(out.issues.len(), 2);
        assert_eq!((out.issues[0].line, out.issues[0].column), (3, 1));
        assert!(out.issues[0].message.contains("'badName'"));
        assert_eq!((out.issues[1].line, out.issues[1].column), (5, 3));
        assert!(out.issues.iter().all(|i| i.severity == Severity::Info));
        assert_eq!(out.suggestions[1].after_snippet, "struct Point");
        assert_eq!(out.suggestions[1].issue_ref, Some(1));
    }

    #[test]
    fn two_declarations_on_one_line_both_report() {
        let out = naming_convention("class a {}; class b {};", &settings());
        assert_eq!(out.issues.len(), 2);
        assert_eq!(out.issues[1].column, 13);
    }

    #[test]
    fn pascal_case_and_template_params_pass() {
        let src = "template <class T>\nclass Widget {};\nstruct Point {};\n";
        assert!(naming_convention(src, &settings()).issues.is_empty());
    }

    #[test]
    fn anti_patterns_report_per_line() {
        let src = "#include <bits/stdc++.h>\nusing namespace std;\nint main() {\n    try { run(); } catch (...) {}\n    using namespace std;\n}\n";
        let out = anti_patterns(src, &settings());
        let lines: Vec<_> = out.issues.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![1, 2, 4, 5]);
        assert!(out.issues.iter().all(|i| i.rule == "custom-pattern"));
        assert!(out.issues.iter().all(|i| i.severity == Severity::Warning));
        assert!(out.issues.iter().all(|i| i.category == Category::Style));
    }

    #[test]
    fn clean_code_has_no_anti_patterns() {
        let src = "#include <vector>\nint main() {\n    std::vector<int> v;\n    return 0;\n}\n";
        assert!(anti_patterns(src, &settings()).issues.is_empty());
    }
}
