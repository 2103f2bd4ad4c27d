//! External collaborators: file transfer and remote shell
//!
//! The orchestrator only talks to the [`FileSync`] and [`RemoteShell`]
//! traits. Production implementations shell out to `rsync` and `ssh`; the
//! in-process doubles live in [`crate::mock`].

mod process;
pub mod rsync;
pub mod ssh;

use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::host::HostSpec;
use crate::signal::CancelToken;
use crate::sync::{Direction, SyncSpec};

pub use rsync::{parse_itemized_line, RsyncFileSync};
pub use ssh::{ssh_args, SshShell};

/// Transfer flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOptions {
    /// Report what would change without changing anything
    pub dry_run: bool,
    /// Also delete remote files that are excluded or missing locally
    pub mirror: bool,
    pub verbose: bool,
    /// Kill the transfer after this long
    pub timeout: Option<Duration>,
}

/// One transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub spec: SyncSpec,
    pub options: SyncOptions,
}

impl SyncRequest {
    pub fn new(spec: SyncSpec, options: SyncOptions) -> Self {
        Self { spec, options }
    }

    pub fn direction(&self) -> Direction {
        self.spec.direction
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Paths reported as changed. Only populated in dry-run mode.
    pub changed: Vec<String>,
}

/// File transfer errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{direction} to {host} failed with exit code {code:?}; is the host reachable?")]
    Failed {
        direction: Direction,
        host: String,
        code: Option<i32>,
    },

    #[error("{direction} timed out after {}s", .after.as_secs())]
    TimedOut { direction: Direction, after: Duration },

    #[error("{direction} interrupted")]
    Interrupted { direction: Direction },

    #[error("I/O error during sync: {0}")]
    Io(#[from] io::Error),
}

/// Transfers a workspace between the local machine and a host
pub trait FileSync: Send + Sync {
    fn sync(&self, request: &SyncRequest, cancel: &CancelToken) -> Result<SyncOutcome, SyncError>;
}

/// A local port forwarded to a port on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortForward {
    pub remote_port: u16,
    pub local_port: u16,
    /// Target host as seen from the remote machine
    pub host: String,
}

impl PortForward {
    pub fn new(remote_port: u16, local_port: u16) -> Self {
        Self {
            remote_port,
            local_port,
            host: "localhost".to_string(),
        }
    }

    /// Value of an ssh `-L` option
    pub fn ssh_spec(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.host, self.remote_port)
    }
}

/// Invalid `--port` value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid port forwarding '{0}': expected REMOTE[:LOCAL] with ports in 1..=65535")]
pub struct PortForwardError(pub String);

impl FromStr for PortForward {
    type Err = PortForwardError;

    /// Parse `remote[:local]`; the local port defaults to the remote one
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PortForwardError(s.to_string());
        let parse = |p: &str| p.trim().parse::<u16>().ok().filter(|p| *p != 0);

        let mut parts = s.split(':');
        let remote = parts.next().and_then(parse).ok_or_else(invalid)?;
        let local = match parts.next() {
            Some(p) => parse(p).ok_or_else(invalid)?,
            None => remote,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(remote, local))
    }
}

impl fmt::Display for PortForward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "localhost:{} -> {}:{}", self.local_port, self.host, self.remote_port)
    }
}

/// One remote command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub host: HostSpec,
    /// Fully rendered shell script
    pub command: String,
    pub forwards: Vec<PortForward>,
    /// Interactive sessions are not cancellable
    pub interactive: bool,
    pub verbose: bool,
}

impl ShellRequest {
    pub fn new(host: HostSpec, command: impl Into<String>) -> Self {
        Self {
            host,
            command: command.into(),
            forwards: Vec::new(),
            interactive: false,
            verbose: false,
        }
    }

    pub fn with_forwards(mut self, forwards: Vec<PortForward>) -> Self {
        self.forwards = forwards;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Result of a remote command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShellOutcome {
    pub exit_code: i32,
    /// The command was stopped by a cancellation request
    pub cancelled: bool,
}

impl ShellOutcome {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            cancelled: false,
        }
    }

    pub fn cancelled(exit_code: i32) -> Self {
        Self {
            exit_code,
            cancelled: true,
        }
    }
}

/// Remote shell errors
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running remote command: {0}")]
    Io(#[from] io::Error),
}

/// Runs commands on a host, streaming its output to ours
pub trait RemoteShell: Send + Sync {
    fn execute(&self, request: &ShellRequest, cancel: &CancelToken)
        -> Result<ShellOutcome, ShellError>;
}
