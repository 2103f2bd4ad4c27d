//! Push → execute → pull orchestration
//!
//! Failure policy:
//! - a failed push aborts the run before anything executes remotely
//! - once the push succeeded, the pull is always attempted, whatever the
//!   command did
//! - the run's exit code is the command's, never the pull's; a failed pull
//!   is reported as a warning on the outcome
//! - after a cancellation request the pull still runs, bounded by the pull
//!   grace period; a second request abandons it

mod state;

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::command::RemoteCommand;
use crate::host::HostSpec;
use crate::signal::{CancelToken, EXIT_CODE_CANCELLED};
use crate::sync::{Direction, SyncSpec};
use crate::transport::{
    FileSync, PortForward, RemoteShell, ShellError, ShellOutcome, ShellRequest, SyncError,
    SyncOptions, SyncRequest,
};

pub use state::{InvalidTransition, Phase, PhaseTracker, PhaseTransition};

/// Upper bound on the pull after a cancellation request
pub const DEFAULT_PULL_GRACE: Duration = Duration::from_secs(30);

/// Run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("sync failed: {source}")]
    SyncFailed {
        #[source]
        source: SyncError,
    },

    #[error("remote command could not be run: {0}")]
    Shell(#[from] ShellError),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Flags for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Transfer and execute nothing; the command is echoed instead
    pub dry_run: bool,
    /// Push deletes remote files that are excluded or gone locally
    pub mirror: bool,
    pub verbose: bool,
    pub forwards: Vec<PortForward>,
    /// Allocate a tty; the session then ignores cancellation
    pub interactive: bool,
    pub pull_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            mirror: false,
            verbose: false,
            forwards: Vec::new(),
            interactive: false,
            pull_grace: DEFAULT_PULL_GRACE,
        }
    }
}

/// Everything needed to run a command on one host
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub host: HostSpec,
    pub push: SyncSpec,
    pub pull: SyncSpec,
    pub command: RemoteCommand,
    pub options: RunOptions,
}

impl RunPlan {
    fn sync_request(&self, direction: Direction) -> SyncRequest {
        let spec = match direction {
            Direction::Push => self.push.clone(),
            Direction::Pull => self.pull.clone(),
        };
        SyncRequest::new(
            spec,
            SyncOptions {
                dry_run: self.options.dry_run,
                mirror: self.options.mirror && direction == Direction::Push,
                verbose: self.options.verbose,
                timeout: None,
            },
        )
    }

    fn shell_request(&self) -> ShellRequest {
        let script = self
            .command
            .render(&self.push.remote_root, self.options.dry_run);
        let request = ShellRequest::new(self.host.clone(), script)
            .with_forwards(self.options.forwards.clone())
            .with_verbose(self.options.verbose);
        if self.options.interactive {
            request.interactive()
        } else {
            request
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub host: String,
    /// Process exit code to report
    pub exit_code: i32,
    /// Exit code reported by the remote command, when it finished on its own
    pub command_exit_code: Option<i32>,
    pub cancelled: bool,
    /// Why pulling results back failed, if it did
    pub pull_error: Option<String>,
    pub transitions: Vec<PhaseTransition>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.pull_error.is_none()
    }
}

/// Run the plan's command without pushing or pulling
pub fn execute_only(
    plan: &RunPlan,
    shell: &dyn RemoteShell,
    cancel: &CancelToken,
) -> Result<ShellOutcome, ShellError> {
    let started = Instant::now();
    let outcome = shell.execute(&plan.shell_request(), cancel)?;
    tracing::info!(
        host = %plan.host.host,
        exit_code = outcome.exit_code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "remote command finished without sync"
    );
    Ok(outcome)
}

/// Drives one push/execute/pull cycle. Each instance runs at most once.
pub struct ExecutionOrchestrator<'a> {
    sync: &'a dyn FileSync,
    shell: &'a dyn RemoteShell,
    cancel: CancelToken,
    tracker: PhaseTracker,
}

impl<'a> ExecutionOrchestrator<'a> {
    pub fn new(sync: &'a dyn FileSync, shell: &'a dyn RemoteShell, cancel: CancelToken) -> Self {
        Self {
            sync,
            shell,
            cancel,
            tracker: PhaseTracker::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    pub fn history(&self) -> &[PhaseTransition] {
        self.tracker.history()
    }

    pub fn run(&mut self, plan: &RunPlan) -> Result<RunOutcome, RunError> {
        let host = plan.host.host.as_str();

        self.tracker.transition(Phase::Pushing)?;
        let started = Instant::now();
        if let Err(source) = self.sync.sync(&plan.sync_request(Direction::Push), &self.cancel) {
            self.tracker.transition(Phase::Aborted)?;
            tracing::error!(host, error = %source, "push failed, not executing");
            return Err(RunError::SyncFailed { source });
        }
        tracing::info!(host, elapsed_ms = started.elapsed().as_millis() as u64, "pushed workspace");

        self.tracker.transition(Phase::Executing)?;
        let executed = self.execute(plan);

        self.tracker.transition(Phase::Pulling)?;
        let pull_error = self.pull(plan).err().map(|e| {
            tracing::warn!(host, error = %e, "failed to pull results back");
            e.to_string()
        });

        let shell_outcome = match executed {
            Ok(outcome) => outcome,
            Err(e) => {
                self.tracker.transition(Phase::Aborted)?;
                return Err(RunError::Shell(e));
            }
        };
        self.tracker.transition(Phase::Done)?;

        let cancelled =
            self.cancel.is_cancelled() || shell_outcome.map_or(true, |o| o.cancelled);
        let command_exit_code = shell_outcome.filter(|o| !o.cancelled).map(|o| o.exit_code);

        Ok(RunOutcome {
            host: host.to_string(),
            exit_code: command_exit_code.unwrap_or(EXIT_CODE_CANCELLED),
            command_exit_code,
            cancelled,
            pull_error,
            transitions: self.tracker.history().to_vec(),
        })
    }

    /// Run the command unless cancellation arrived during the push
    fn execute(&self, plan: &RunPlan) -> Result<Option<ShellOutcome>, ShellError> {
        if self.cancel.is_cancelled() {
            tracing::warn!(host = %plan.host.host, "cancelled before execution");
            return Ok(None);
        }

        let started = Instant::now();
        let outcome = self.shell.execute(&plan.shell_request(), &self.cancel)?;
        tracing::info!(
            host = %plan.host.host,
            exit_code = outcome.exit_code,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "remote command finished"
        );
        if outcome.cancelled {
            tracing::warn!(host = %plan.host.host, "remote command cancelled");
        } else if outcome.exit_code != 0 {
            tracing::warn!(
                host = %plan.host.host,
                exit_code = outcome.exit_code,
                "remote command exited with non-zero status"
            );
        }
        Ok(Some(outcome))
    }

    fn pull(&self, plan: &RunPlan) -> Result<(), SyncError> {
        if self.cancel.is_immediate_exit() {
            return Err(SyncError::Interrupted {
                direction: Direction::Pull,
            });
        }

        let mut request = plan.sync_request(Direction::Pull);
        if self.cancel.is_cancelled() {
            request.options.timeout = Some(plan.options.pull_grace);
        }
        let started = Instant::now();
        self.sync.sync(&request, &self.cancel)?;
        tracing::info!(
            host = %plan.host.host,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pulled results"
        );
        Ok(())
    }
}
