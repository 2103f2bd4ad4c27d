//! Running the same command on every configured host
//!
//! Each host gets its own orchestrator on its own thread; nothing mutable is
//! shared between host runs except the cancel token. Pushing to every host
//! is sequential.

use std::thread;

use crate::orchestrator::{ExecutionOrchestrator, RunError, RunOutcome, RunPlan};
use crate::signal::CancelToken;
use crate::sync::SyncSpec;
use crate::transport::{FileSync, RemoteShell, SyncError, SyncOptions, SyncOutcome, SyncRequest};

/// Result of one host's run
#[derive(Debug)]
pub struct HostRun {
    pub host: String,
    pub result: Result<RunOutcome, RunError>,
}

impl HostRun {
    /// Exit code this host contributes, using `error_code` for failed runs
    pub fn exit_code(&self, error_code: impl Fn(&RunError) -> i32) -> i32 {
        match &self.result {
            Ok(outcome) => outcome.exit_code,
            Err(e) => error_code(e),
        }
    }
}

/// Run every plan in parallel. Results come back in plan order.
pub fn run_on_all_hosts(
    plans: &[RunPlan],
    sync: &dyn FileSync,
    shell: &dyn RemoteShell,
    cancel: &CancelToken,
) -> Vec<HostRun> {
    thread::scope(|scope| {
        let handles: Vec<_> = plans
            .iter()
            .map(|plan| {
                let cancel = cancel.clone();
                scope.spawn(move || {
                    let mut orchestrator = ExecutionOrchestrator::new(sync, shell, cancel);
                    HostRun {
                        host: plan.host.host.clone(),
                        result: orchestrator.run(plan),
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// Result of one host's push
#[derive(Debug)]
pub struct HostPush {
    pub host: String,
    pub result: Result<SyncOutcome, SyncError>,
}

/// Push to each spec's host in order. A failed host does not stop the
/// others; cancellation does.
pub fn push_to_all_hosts(
    specs: &[SyncSpec],
    options: SyncOptions,
    sync: &dyn FileSync,
    cancel: &CancelToken,
) -> Vec<HostPush> {
    let mut pushes = Vec::with_capacity(specs.len());
    for spec in specs {
        if cancel.is_cancelled() {
            tracing::warn!(host = %spec.host.host, "cancelled, skipping remaining hosts");
            break;
        }
        let result = sync.sync(&SyncRequest::new(spec.clone(), options), cancel);
        if let Err(e) = &result {
            tracing::error!(host = %spec.host.host, error = %e, "push failed");
        }
        pushes.push(HostPush {
            host: spec.host.host.clone(),
            result,
        });
    }
    pushes
}

/// First non-zero exit code in host order, or zero
pub fn combined_exit_code(runs: &[HostRun], error_code: impl Fn(&RunError) -> i32) -> i32 {
    runs.iter()
        .map(|run| run.exit_code(&error_code))
        .find(|code| *code != 0)
        .unwrap_or(0)
}
