//! `[general]` settings and their built-in defaults

use serde::{Deserialize, Serialize};

/// Remote directory that generated workspace directories live under
pub const DEFAULT_REMOTE_ROOT: &str = ".remotes";

/// Settings that only the global layer may define
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Treat any directory as a workspace even without a marker file
    pub allow_uninitiated_workspaces: bool,

    /// Mirror the local absolute path under `remote_root` instead of
    /// generating a flat `<name>_<hash>` directory
    pub use_relative_remote_paths: bool,

    /// Base directory, relative to the remote home, for generated paths
    pub remote_root: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            allow_uninitiated_workspaces: false,
            use_relative_remote_paths: false,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
        }
    }
}
