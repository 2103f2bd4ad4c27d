//! Remote workspace - edit locally, run remotely
//!
//! This crate syncs a local workspace to a directory on a remote host,
//! runs a command there and syncs results back. Configuration is layered
//! (global defaults, workspace config, workspace ignore overrides) and the
//! push, execute and pull steps are driven by an explicit state machine.

pub mod command;
pub mod config;
pub mod error;
pub mod explain;
pub mod host;
pub mod logging;
pub mod mock;
pub mod multi;
pub mod orchestrator;
pub mod session;
pub mod signal;
pub mod sync;
pub mod transport;
pub mod workspace;

pub use command::RemoteCommand;
pub use config::{ConfigError, ConfigResolver, EffectiveConfig};
pub use error::RemoteError;
pub use explain::ExplainReport;
pub use host::{HostList, HostSelector, HostSpec, SelectionError};
pub use orchestrator::{ExecutionOrchestrator, Phase, RunError, RunOptions, RunOutcome, RunPlan};
pub use remote_patterns::{PatternMatcher, PatternSet};
pub use session::Session;
pub use signal::{CancelToken, SignalHandler};
pub use sync::{Direction, SyncPlanner, SyncSpec};
pub use transport::{FileSync, RemoteShell, RsyncFileSync, SshShell};
pub use workspace::{WorkspaceLocator, WorkspaceRoot};
