//! Configuration layering
//!
//! Three layers merge in order of increasing precedence:
//! 1. Global defaults (~/.config/remote/defaults.toml)
//! 2. Workspace config (.remote.toml)
//! 3. Workspace ignore overrides (.remoteignore.toml)

mod defaults;
mod effective;
mod layer;
mod merge;

use std::io;
use std::path::PathBuf;

pub use defaults::{GeneralConfig, DEFAULT_REMOTE_ROOT};
pub use effective::{ConfigPaths, ConfigResolver, ConfigSource, EffectiveConfig};
pub use layer::{Block, ConfigLayer, LayerRole};
pub use merge::{merge_hosts, merge_patterns};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TOML file {path} is unparsable: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("duplicate host label '{label}'")]
    DuplicateLabel { label: String },

    #[error("workspace config {path} not found; create it or allow uninitiated workspaces in the global config")]
    MissingWorkspaceConfig { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
