// Lint-tool format: `<file>:<line>:<column>: <severity>: <message> [<rule>]`

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Category, Issue, Severity};

use super::{OutputParser, lines, position};

static LINT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+):(\d+):(\d+):\s+(warning|error|note):\s+(.+)\s+\[(.+)\]$")
        .expect("lint pattern is valid")
});

#[derive(Debug, Default, Clone, Copy)]
pub struct LintParser;

impl OutputParser for LintParser {
    fn tool(&self) -> &'static str {
        crate::tools::CLANG_TIDY
    }

    fn parse(&self, raw: &str) -> Vec<Issue> {
        lines(raw)
            .filter_map(|line| {
                let caps = LINT_LINE.captures(line)?;
                Some(Issue {
                    file: caps[1].to_string(),
                    line: position(&caps[2]),
                    column: position(&caps[3]),
                    severity: match &caps[4] {
                        "error" => Severity::Error,
                        "warning" => Severity::Warning,
                        _ => Severity::Info,
                    },
                    message: caps[5].to_string(),
                    rule: caps[6].to_string(),
                    source_tool: self.tool().to_string(),
                    category: Category::StaticLint,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
/tmp/sift/sift-abc/source.cpp:4:5: warning: use nullptr [modernize-use-nullptr]
    int *p = NULL;
    ^
/tmp/sift/sift-abc/source.cpp:7:12: error: use of undeclared identifier 'x' [clang-diagnostic-error]
/tmp/sift/sift-abc/source.cpp:9:1: note: expanded from macro [clang-diagnostic-note]
12 warnings generated.
Suppressed 11 warnings (11 in non-user code).
";

    #[test]
    fn parses_diagnostics_and_skips_noise() {
        let issues = LintParser.parse(SAMPLE);
        assert_eq!(issues.len(), 3);

        assert_eq!(issues[0].file, "/tmp/sift/sift-abc/source.cpp");
        assert_eq!((issues[0].line, issues[0].column), (4, 5));
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].message, "use nullptr");
        assert_eq!(issues[0].rule, "modernize-use-nullptr");

        assert_eq!(issues[1].severity, Severity::Error);
        assert_eq!(issues[1].message, "use of undeclared identifier 'x'");
        assert_eq!(issues[2].severity, Severity::Info);

        assert!(issues.iter().all(|i| i.source_tool == "clang-tidy"));
        assert!(issues.iter().all(|i| i.category == Category::StaticLint));
    }

    #[test]
    fn line_without_rule_is_skipped() {
        assert!(LintParser.parse("a.cpp:1:1: warning: no rule here").is_empty());
    }

    #[test]
    fn unknown_severity_is_skipped() {
        assert!(LintParser.parse("a.cpp:1:1: fatal: boom [x]").is_empty());
    }

    #[test]
    fn oversized_numbers_become_zero() {
        let issues = LintParser.parse("a.cpp:99999999999:2: warning: huge [r]\r\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 0);
        assert_eq!(issues[0].column, 2);
        assert_eq!(issues[0].rule, "r");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(LintParser.parse("").is_empty());
    }
}
