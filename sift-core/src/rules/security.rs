// Security heuristics: dangerous calls, new/delete balance, unchecked input.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RulesSection;
use crate::types::{Category, RiskLevel, Severity};

use super::{RuleOutput, line_number};

struct UnsafeCall {
    name: &'static str,
    severity: Severity,
    rule: &'static str,
    vulnerability: &'static str,
    risk: RiskLevel,
    message: &'static str,
    replacement: Option<&'static str>,
}

const UNSAFE_CALLS: &[UnsafeCall] = &[
    UnsafeCall {
        name: "strcpy",
        severity: Severity::Error,
        rule: "security-buffer-overflow",
        vulnerability: "buffer-overflow",
        risk: RiskLevel::High,
        message: "Unsafe function 'strcpy' may cause buffer overflow",
        replacement: Some("std::strncpy(dst, src, sizeof(dst) - 1); dst[sizeof(dst) - 1] = '\\0';"),
    },
    UnsafeCall {
        name: "strcat",
        severity: Severity::Error,
        rule: "security-buffer-overflow",
        vulnerability: "buffer-overflow",
        risk: RiskLevel::High,
        message: "Unsafe function 'strcat' may cause buffer overflow",
        replacement: Some("std::strncat(dst, src, sizeof(dst) - std::strlen(dst) - 1);"),
    },
    UnsafeCall {
        name: "sprintf",
        severity: Severity::Error,
        rule: "security-buffer-overflow",
        vulnerability: "buffer-overflow",
        risk: RiskLevel::High,
        message: "Unsafe function 'sprintf' may cause buffer overflow",
        replacement: Some("std::snprintf(buf, sizeof(buf), fmt, args);"),
    },
    UnsafeCall {
        name: "gets",
        severity: Severity::Error,
        rule: "security-buffer-overflow",
        vulnerability: "buffer-overflow",
        risk: RiskLevel::Critical,
        message: "Unsafe function 'gets' may cause buffer overflow",
        replacement: Some("std::fgets(buf, sizeof(buf), stdin);"),
    },
    UnsafeCall {
        name: "scanf",
        severity: Severity::Error,
        rule: "security-buffer-overflow",
        vulnerability: "buffer-overflow",
        risk: RiskLevel::Medium,
        message: "Unsafe function 'scanf' may cause buffer overflow",
        replacement: None,
    },
    UnsafeCall {
        name: "rand",
        severity: Severity::Warning,
        rule: "security-unsafe-function",
        vulnerability: "weak-randomness",
        risk: RiskLevel::Low,
        message: "Unsafe function detected: use random number generators from <random> instead",
        replacement: Some("std::mt19937 gen{std::random_device{}()};"),
    },
    UnsafeCall {
        name: "system",
        severity: Severity::Warning,
        rule: "security-unsafe-function",
        vulnerability: "command-injection",
        risk: RiskLevel::High,
        message: "Unsafe function detected: avoid system() calls for security reasons",
        replacement: None,
    },
    UnsafeCall {
        name: "eval",
        severity: Severity::Warning,
        rule: "security-unsafe-function",
        vulnerability: "code-injection",
        risk: RiskLevel::High,
        message: "Unsafe function detected: avoid eval() functions",
        replacement: None,
    },
    UnsafeCall {
        name: "exec",
        severity: Severity::Warning,
        rule: "security-unsafe-function",
        vulnerability: "command-injection",
        risk: RiskLevel::Medium,
        message: "Unsafe function detected: be careful with exec() functions",
        replacement: None,
    },
];

static UNSAFE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<_> = UNSAFE_CALLS.iter().map(|c| c.name).collect();
    Regex::new(&format!(r"\b({})\s*\(", names.join("|"))).expect("unsafe call pattern is valid")
});

static ALLOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnew\s+").expect("allocation pattern is valid"));

static DEALLOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdelete(?:\s*\[\s*\])?\s+").expect("deallocation pattern is valid")
});

static INPUT_READ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:std::)?cin\s*>>").expect("input pattern is valid"));

static INPUT_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bcin\s*\.\s*(?:fail|good|bad)\s*\(\s*\)|\b(?:if|while)\s*\(\s*!?\s*\(?\s*(?:std::)?cin\b",
    )
    .expect("input guard pattern is valid")
});

/// Flag every call to a known-dangerous function, one issue per occurrence.
pub fn unsafe_functions(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();

    for (index, line) in source.lines().enumerate() {
        for caps in UNSAFE_CALL.captures_iter(line) {
            let Some(call) = UNSAFE_CALLS.iter().find(|c| c.name == &caps[1]) else {
                continue;
            };
            let column = caps.get(1).map_or(1, |m| m.start() + 1);
            let idx = out.push_issue(
                Category::Security,
                call.rule,
                call.severity,
                (line_number(index), u32::try_from(column).unwrap_or(u32::MAX)),
                call.message.to_string(),
            );
            out.flag_security(idx, call.vulnerability, call.risk);
            if let Some(replacement) = call.replacement {
                out.suggest(
                    Some(idx),
                    line.trim(),
                    replacement,
                    format!("'{}' performs no bounds checking", call.name),
                );
            }
        }
    }

    out
}

/// One warning if the text allocates with `new` more often than it
/// releases with `delete`. Pure keyword counting: comments and strings count.
pub fn resource_balance(source: &str, _settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();

    let allocations = ALLOCATION.find_iter(source).count();
    let deallocations = DEALLOCATION.find_iter(source).count();
    if allocations <= deallocations {
        return out;
    }

    let first = ALLOCATION
        .find(source)
        .map_or((1, 1), |m| super::position_at(source, m.start()));
    let idx = out.push_issue(
        Category::Security,
        "security-memory-leak",
        Severity::Warning,
        first,
        format!("Potential memory leak: {allocations} 'new' but {deallocations} 'delete'"),
    );
    out.flag_security(idx, "memory-leak", RiskLevel::Medium);
    out.suggest(
        Some(idx),
        "int* ptr = new int(42);",
        "auto ptr = std::make_unique<int>(42);",
        "Smart pointers release memory automatically on every path",
    );
    out
}

/// One warning at the first `cin >>` read with no failure check within the
/// configured window of lines.
pub fn input_validation(source: &str, settings: &RulesSection) -> RuleOutput {
    let mut out = RuleOutput::default();
    let lines: Vec<&str> = source.lines().collect();
    let window = settings.input_check_window.max(1);

    let unguarded = lines.iter().enumerate().find(|(index, line)| {
        INPUT_READ.is_match(line)
            && !lines[*index..lines.len().min(index.saturating_add(window))]
                .iter()
                .any(|l| INPUT_GUARD.is_match(l))
    });

    if let Some((index, line)) = unguarded {
        let column = INPUT_READ.find(line).map_or(1, |m| m.start() + 1);
        let idx = out.push_issue(
            Category::Security,
            "security-input-validation",
            Severity::Warning,
            (line_number(index), u32::try_from(column).unwrap_or(u32::MAX)),
            "Consider validating input with cin.fail() checks".to_string(),
        );
        out.flag_security(idx, "unvalidated-input", RiskLevel::Low);
    }
    out
}
