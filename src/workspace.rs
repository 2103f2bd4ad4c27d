//! Workspace root discovery and well-known file names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Workspace config file; its presence marks a workspace root.
pub const WORKSPACE_MARKER: &str = ".remote.toml";

/// Workspace-level sync rule overrides.
pub const WORKSPACE_IGNORE_FILE: &str = ".remoteignore.toml";

/// Script sourced in the remote shell before the user command.
pub const ENV_INIT_FILE: &str = ".remoteenv";

/// Version-control ignore file consulted when VCS patterns are enabled.
pub const VCS_IGNORE_FILE: &str = ".gitignore";

/// Global defaults, relative to the user's home directory.
pub const GLOBAL_CONFIG: &str = ".config/remote/defaults.toml";

/// Errors for workspace discovery
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("no {marker} found in {start} or any parent directory")]
    NotFound { start: PathBuf, marker: &'static str },

    #[error("cannot resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Absolute path of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceRoot {
    path: PathBuf,
    /// False when the root was inferred without a marker file.
    initiated: bool,
}

impl WorkspaceRoot {
    /// Wrap an absolute path without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, initiated: bool) -> Self {
        Self {
            path: path.into(),
            initiated,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initiated(&self) -> bool {
        self.initiated
    }

    /// Final path component, used in generated remote directory names.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn marker_file(&self) -> PathBuf {
        self.path.join(WORKSPACE_MARKER)
    }

    pub fn ignore_file(&self) -> PathBuf {
        self.path.join(WORKSPACE_IGNORE_FILE)
    }

    /// Position of `dir` inside the workspace, or `None` when outside.
    pub fn relative(&self, dir: &Path) -> Option<PathBuf> {
        dir.strip_prefix(&self.path).ok().map(Path::to_path_buf)
    }
}

/// Finds the workspace root by walking up from a start directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceLocator {
    allow_uninitiated: bool,
}

impl WorkspaceLocator {
    pub fn new(allow_uninitiated: bool) -> Self {
        Self { allow_uninitiated }
    }

    /// Locate the workspace containing `start`.
    ///
    /// A marker in `start` or any ancestor always wins. Without one, `start`
    /// becomes the root only in uninitiated-workspace mode.
    pub fn locate(&self, start: &Path) -> Result<WorkspaceRoot, WorkspaceError> {
        let start = fs::canonicalize(start).map_err(|source| WorkspaceError::Io {
            path: start.to_path_buf(),
            source,
        })?;

        if let Some(root) = start
            .ancestors()
            .find(|dir| dir.join(WORKSPACE_MARKER).is_file())
        {
            return Ok(WorkspaceRoot::new(root, true));
        }

        if self.allow_uninitiated {
            tracing::debug!(root = %start.display(), "no workspace marker, using start directory");
            return Ok(WorkspaceRoot::new(start, false));
        }

        Err(WorkspaceError::NotFound {
            start,
            marker: WORKSPACE_MARKER,
        })
    }
}
