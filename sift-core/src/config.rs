use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which output stream(s) of a tool carry its diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    #[default]
    Stdout,
    Stderr,
    Both,
}

/// Top-level Sift configuration, matching `sift.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiftConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub rules: RulesSection,
}

impl SiftConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.request_timeout_ms must be positive".into(),
            ));
        }
        if engine.max_source_chars == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_source_chars must be positive".into(),
            ));
        }
        if engine.source_file_name.is_empty()
            || engine.source_file_name.contains(['/', '\\'])
            || engine.source_file_name == ".."
        {
            return Err(ConfigError::Invalid(format!(
                "engine.source_file_name must be a bare file name, got {:?}",
                engine.source_file_name
            )));
        }
        for (name, tool) in self.tools.iter() {
            if tool.enabled && tool.path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("tools.{name}.path is empty")));
            }
            if tool.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "tools.{name}.timeout_ms must be positive"
                )));
            }
        }
        if self.rules.input_check_window == 0 {
            return Err(ConfigError::Invalid(
                "rules.input_check_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Directory under which per-request workspaces are created.
    pub scratch_root: PathBuf,
    /// Overall wall-clock budget for one analysis.
    pub request_timeout_ms: u64,
    /// Largest accepted source text, in characters.
    pub max_source_chars: usize,
    /// File name the source text is written to inside a workspace.
    pub source_file_name: String,
    /// Run analyzer modules concurrently instead of one after another.
    pub concurrent: bool,
    /// Cap on captured bytes per output stream of an external tool.
    pub max_output_bytes: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("sift"),
            request_timeout_ms: 60_000,
            max_source_chars: 50_000,
            source_file_name: "source.cpp".to_string(),
            concurrent: true,
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Per-tool settings. Each `[tools.<name>]` table overrides only the keys it
/// sets; the rest keep that tool's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ToolsOverrides")]
pub struct ToolsSection {
    pub clang_tidy: ToolConfig,
    pub cppcheck: ToolConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsOverrides {
    #[serde(default)]
    clang_tidy: ToolOverride,
    #[serde(default)]
    cppcheck: ToolOverride,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolOverride {
    enabled: Option<bool>,
    path: Option<String>,
    flags: Option<Vec<String>>,
    timeout_ms: Option<u64>,
    stream: Option<OutputStream>,
}

impl ToolOverride {
    fn apply(self, mut base: ToolConfig) -> ToolConfig {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(path) = self.path {
            base.path = path;
        }
        if let Some(flags) = self.flags {
            base.flags = flags;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            base.timeout_ms = timeout_ms;
        }
        if let Some(stream) = self.stream {
            base.stream = stream;
        }
        base
    }
}

impl From<ToolsOverrides> for ToolsSection {
    fn from(overrides: ToolsOverrides) -> Self {
        Self {
            clang_tidy: overrides.clang_tidy.apply(ToolConfig::clang_tidy()),
            cppcheck: overrides.cppcheck.apply(ToolConfig::cppcheck()),
        }
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            clang_tidy: ToolConfig::clang_tidy(),
            cppcheck: ToolConfig::cppcheck(),
        }
    }
}

impl ToolsSection {
    /// Iterate `(name, config)` pairs in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ToolConfig)> {
        [
            (crate::tools::CLANG_TIDY, &self.clang_tidy),
            (crate::tools::CPPCHECK, &self.cppcheck),
        ]
        .into_iter()
    }
}

/// How to invoke one external analyzer.
///
/// The tool is run as `<path> <flags...> <source file>`; a `{std}` token in
/// any flag is replaced with the request's language standard profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub enabled: bool,
    pub path: String,
    pub flags: Vec<String>,
    pub timeout_ms: u64,
    pub stream: OutputStream,
}

impl ToolConfig {
    pub fn clang_tidy() -> Self {
        Self {
            enabled: true,
            path: "clang-tidy".into(),
            flags: vec![
                "-checks=*,-fuchsia-*,-llvm-header-guard,-google-readability-todo".into(),
                "--format-style=llvm".into(),
                "--extra-arg=-std={std}".into(),
            ],
            timeout_ms: 30_000,
            stream: OutputStream::Both,
        }
    }

    pub fn cppcheck() -> Self {
        Self {
            enabled: true,
            path: "cppcheck".into(),
            flags: vec![
                "--enable=all".into(),
                "--std={std}".into(),
                "--platform=unix64".into(),
                "--inline-suppr".into(),
                "--template={file}:{line}:{column}: {severity}: {message}".into(),
            ],
            timeout_ms: 30_000,
            stream: OutputStream::Stderr,
        }
    }
}

/// Thresholds for the in-process rule checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    /// Cyclomatic complexity above which a refactor warning is emitted.
    pub complexity_threshold: u32,
    /// Fixed array sizes above this are reported.
    pub large_array_threshold: u64,
    /// Lines after an input read searched for a failure check.
    pub input_check_window: usize,
}

impl Default for RulesSection {
    fn default() -> Self {
        Self {
            complexity_threshold: 15,
            large_array_threshold: 10_000,
            input_check_window: 5,
        }
    }
}
