//! Top-level error type and process exit codes

use thiserror::Error;

use crate::config::ConfigError;
use crate::explain::ExplainError;
use crate::host::SelectionError;
use crate::orchestrator::RunError;
use crate::signal::EXIT_CODE_CANCELLED;
use crate::transport::{ShellError, SyncError};
use crate::workspace::WorkspaceError;
use remote_patterns::PatternError;

/// Exit code for failures reaching or syncing with the host, matching ssh's
/// own connection failure status
pub const EXIT_CODE_CONNECTION: i32 = 255;

/// Exit code for internal state machine violations
pub const EXIT_CODE_INTERNAL: i32 = 70;

/// Any error surfaced to the CLI
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Workspace(#[from] WorkspaceError),

    #[error("{0}")]
    Selection(#[from] SelectionError),

    #[error("{0}")]
    Pattern(#[from] PatternError),

    #[error("{0}")]
    Run(#[from] RunError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Shell(#[from] ShellError),

    #[error("{0}")]
    Explain(#[from] ExplainError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

impl RemoteError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RemoteError::Config(_)
            | RemoteError::Workspace(_)
            | RemoteError::Selection(_)
            | RemoteError::Pattern(_)
            | RemoteError::Explain(_)
            | RemoteError::Io(_)
            | RemoteError::Json(_)
            | RemoteError::Usage(_) => 1,
            RemoteError::Run(e) => run_exit_code(e),
            RemoteError::Sync(e) => sync_exit_code(e),
            RemoteError::Shell(_) => EXIT_CODE_CONNECTION,
        }
    }
}

/// Exit code for a run that failed before producing an outcome
pub fn run_exit_code(error: &RunError) -> i32 {
    match error {
        RunError::SyncFailed { source } => sync_exit_code(source),
        RunError::Shell(_) => EXIT_CODE_CONNECTION,
        RunError::InvalidTransition(_) => EXIT_CODE_INTERNAL,
    }
}

/// Exit code for a failed transfer
pub fn sync_exit_code(error: &SyncError) -> i32 {
    match error {
        SyncError::Interrupted { .. } => EXIT_CODE_CANCELLED,
        _ => EXIT_CODE_CONNECTION,
    }
}
