use std::path::PathBuf;

/// Top-level Sift error type.
///
/// Fallible operations in `sift-core` return [`Result<T, SiftError>`](Result).
/// Only [`SiftError::Workspace`] is fatal to an analysis; every other
/// variant is absorbed by the engine and reflected as a missing module
/// contribution.
#[derive(thiserror::Error, Debug)]
pub enum SiftError {
    /// The per-request workspace could not be set up.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// An external analyzer tool could not produce output.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A rule-engine check failed unexpectedly (panicked).
    #[error("Internal error in {module}: {message}")]
    Internal {
        /// Name of the module that failed.
        module: String,
        /// Panic payload or failure description.
        message: String,
    },

    /// The request was cancelled before it completed.
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Errors creating, populating, or removing a session workspace.
#[derive(thiserror::Error, Debug)]
pub enum WorkspaceError {
    /// The session directory could not be created under the scratch root.
    #[error("Cannot create workspace {path}: {source}")]
    Create {
        /// Directory that failed to be created.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The source file could not be written into the session directory.
    #[error("Cannot write source file {path}: {source}")]
    WriteSource {
        /// File that failed to be written.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The session was already destroyed.
    #[error("Workspace {0} has already been destroyed")]
    Destroyed(String),
}

/// Errors from invoking an external analyzer tool.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// The tool binary was not found or is disabled on this host.
    #[error("{tool} is not available")]
    Unavailable {
        /// Tool name.
        tool: String,
    },

    /// The tool did not finish within its time budget and was killed.
    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout {
        /// Tool name.
        tool: String,
        /// Budget that was exceeded.
        timeout_ms: u64,
    },

    /// The tool exited with a status that signals a failed run.
    #[error("{tool} exited with code {code}")]
    Exit {
        /// Tool name.
        tool: String,
        /// Exit code reported by the process.
        code: i32,
    },

    /// The process could not be started for a reason other than absence.
    #[error("{tool} failed to start: {message}")]
    Spawn {
        /// Tool name.
        tool: String,
        /// Description of the spawn failure.
        message: String,
    },
}

/// Errors in Sift configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, SiftError>`.
pub type Result<T> = std::result::Result<T, SiftError>;
