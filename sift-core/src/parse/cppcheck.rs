// Checker-tool format: `<file>:<line>:<column>: <severity>: <message>`

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Category, Issue, Severity};

use super::{OutputParser, lines, position};

static CHECKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+):(\d+):(\d+):\s+(error|warning|style|performance|information):\s+(.+)$")
        .expect("checker pattern is valid")
});

/// Trailing `[id]` that some templates append to the message.
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\[([A-Za-z0-9_\-]+)\]$").expect("id pattern is valid"));

#[derive(Debug, Default, Clone, Copy)]
pub struct CheckerParser;

impl CheckerParser {
    fn severity(label: &str) -> Severity {
        match label {
            "error" => Severity::Error,
            "warning" | "performance" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl OutputParser for CheckerParser {
    fn tool(&self) -> &'static str {
        crate::tools::CPPCHECK
    }

    fn parse(&self, raw: &str) -> Vec<Issue> {
        lines(raw)
            .filter_map(|line| {
                let caps = CHECKER_LINE.captures(line)?;
                let label = &caps[4];
                let mut message = caps[5].to_string();
                let rule = match TRAILING_ID.captures(&message) {
                    Some(id) => {
                        let rule = id[1].to_string();
                        let cut = id.get(0).map_or(message.len(), |m| m.start());
                        message.truncate(cut);
                        rule
                    }
                    None => format!("cppcheck-{label}"),
                };
                Some(Issue {
                    file: caps[1].to_string(),
                    line: position(&caps[2]),
                    column: position(&caps[3]),
                    severity: Self::severity(label),
                    message,
                    rule,
                    source_tool: self.tool().to_string(),
                    category: Category::Syntax,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_severity_label() {
        let raw = "\
source.cpp:3:9: error: Array 'buf[10]' accessed at index 10, which is out of bounds.
source.cpp:5:5: warning: Uninitialized variable: x
source.cpp:6:5: style: Variable 'y' is assigned a value that is never used.
source.cpp:8:12: performance: Function parameter 's' should be passed by const reference.
source.cpp:0:0: information: Include file: <iostream> not found.
Checking source.cpp ...
";
        let issues = CheckerParser.parse(raw);
        let severities: Vec<_> = issues.iter().map(|i| i.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Error,
                Severity::Warning,
                Severity::Info,
                Severity::Warning,
                Severity::Info,
            ]
        );
        assert_eq!(issues[0].rule, "cppcheck-error");
        assert_eq!(issues[2].rule, "cppcheck-style");
        assert_eq!(issues[4].line, 0);
        assert!(issues.iter().all(|i| i.source_tool == "cppcheck"));
        assert!(issues.iter().all(|i| i.category == Category::Syntax));
    }

    #[test]
    fn trailing_id_becomes_rule() {
        let issues = CheckerParser.parse("a.cpp:2:3: style: Unused variable: z [unusedVariable]");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "unusedVariable");
        assert_eq!(issues[0].message, "Unused variable: z");
    }

    #[test]
    fn lint_severity_labels_are_not_checker_labels() {
        assert!(CheckerParser.parse("a.cpp:1:1: note: only lint tools emit notes").is_empty());
    }
}
