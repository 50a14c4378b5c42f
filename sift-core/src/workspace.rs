//! Per-request scratch directories.
//!
//! Every analysis gets its own directory under the scratch root, named by a
//! random session id. [`AnalysisSession`] owns that directory and removes it
//! when dropped, so teardown happens on every exit path: normal return,
//! early `?`, panic, or the future being dropped on cancellation.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::EngineSection;
use crate::error::WorkspaceError;

/// Allocates session workspaces under a fixed scratch root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    source_file_name: String,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, source_file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            source_file_name: source_file_name.into(),
        }
    }

    pub fn from_config(engine: &EngineSection) -> Self {
        Self::new(&engine.scratch_root, &engine.source_file_name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fresh session id: 128 random bits from the OS CSPRNG, hex encoded.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Create the directory for `session_id`.
    ///
    /// Fails if the scratch root cannot be created, if the id is not a plain
    /// path component, or if a directory with that id already exists.
    pub fn create(&self, session_id: &str) -> Result<AnalysisSession, WorkspaceError> {
        let workspace_path = self.root.join(format!("sift-{session_id}"));

        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(WorkspaceError::Create {
                path: workspace_path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "session id must be alphanumeric",
                ),
            });
        }

        std::fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Create {
            path: self.root.clone(),
            source,
        })?;

        private_dir_builder()
            .create(&workspace_path)
            .map_err(|source| WorkspaceError::Create {
                path: workspace_path.clone(),
                source,
            })?;

        debug!(session = session_id, path = %workspace_path.display(), "Workspace created");

        Ok(AnalysisSession {
            session_id: session_id.to_string(),
            source_file_path: workspace_path.join(&self.source_file_name),
            workspace_path,
            destroyed: false,
        })
    }
}

#[cfg(unix)]
fn private_dir_builder() -> std::fs::DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut builder = std::fs::DirBuilder::new();
    builder.mode(0o700);
    builder
}

#[cfg(not(unix))]
fn private_dir_builder() -> std::fs::DirBuilder {
    std::fs::DirBuilder::new()
}

/// A live session workspace. Removed on [`destroy`](Self::destroy) or drop,
/// whichever comes first.
#[derive(Debug)]
pub struct AnalysisSession {
    session_id: String,
    workspace_path: PathBuf,
    source_file_path: PathBuf,
    destroyed: bool,
}

impl AnalysisSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    pub fn source_file_path(&self) -> &Path {
        &self.source_file_path
    }

    /// Write `text` verbatim to the session's source file.
    pub fn write_source(&self, text: &str) -> Result<&Path, WorkspaceError> {
        if self.destroyed {
            return Err(WorkspaceError::Destroyed(self.session_id.clone()));
        }
        std::fs::write(&self.source_file_path, text).map_err(|source| {
            WorkspaceError::WriteSource {
                path: self.source_file_path.clone(),
                source,
            }
        })?;
        Ok(&self.source_file_path)
    }

    /// Remove the workspace directory. Idempotent; failures are logged only.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        match std::fs::remove_dir_all(&self.workspace_path) {
            Ok(()) => debug!(session = %self.session_id, "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session = %self.session_id, "Workspace already gone");
            }
            Err(e) => warn!(
                session = %self.session_id,
                path = %self.workspace_path.display(),
                error = %e,
                "Failed to clean up analysis workspace"
            ),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.destroy();
    }
}
