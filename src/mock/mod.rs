//! In-process collaborators for tests
//!
//! [`MockFileSync`] and [`MockShell`] record every request and can be told
//! to fail, so orchestration paths can be exercised without rsync or ssh.

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::signal::CancelToken;
use crate::sync::Direction;
use crate::transport::{
    FileSync, RemoteShell, ShellError, ShellOutcome, ShellRequest, SyncError, SyncOutcome,
    SyncRequest,
};

/// Exit code of a process stopped by SIGTERM
const TERMINATED_EXIT_CODE: i32 = 128 + 15;

/// Recording [`FileSync`] with per-direction failure injection
#[derive(Debug, Default)]
pub struct MockFileSync {
    requests: Mutex<Vec<SyncRequest>>,
    failing: HashSet<Direction>,
    changed: Vec<String>,
    delay: Option<Duration>,
}

impl MockFileSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every transfer in `direction`
    pub fn failing_on(mut self, direction: Direction) -> Self {
        self.failing.insert(direction);
        self
    }

    /// Paths reported as changed by every transfer
    pub fn with_changed<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Make each transfer take `delay`, honoring immediate-exit requests
    /// and request timeouts like the real transfer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn directions(&self) -> Vec<Direction> {
        self.requests().iter().map(SyncRequest::direction).collect()
    }
}

impl FileSync for MockFileSync {
    fn sync(&self, request: &SyncRequest, cancel: &CancelToken) -> Result<SyncOutcome, SyncError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let direction = request.direction();

        if let Some(delay) = self.delay {
            let start = Instant::now();
            while start.elapsed() < delay {
                if cancel.is_immediate_exit() {
                    return Err(SyncError::Interrupted { direction });
                }
                if let Some(limit) = request.options.timeout {
                    if start.elapsed() >= limit {
                        return Err(SyncError::TimedOut {
                            direction,
                            after: limit,
                        });
                    }
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        if self.failing.contains(&direction) {
            return Err(SyncError::Failed {
                direction,
                host: request.spec.host.host.clone(),
                code: Some(12),
            });
        }

        Ok(SyncOutcome {
            changed: self.changed.clone(),
        })
    }
}

/// What [`MockShell`] does when asked to run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellBehavior {
    /// Exit with the given code
    Exit(i32),
    /// Fail to start
    SpawnFailure,
    /// Deliver `signals` interrupts to the run while the command is running,
    /// then report the command as terminated
    Interrupt { signals: u8 },
}

/// Recording [`RemoteShell`]
#[derive(Debug)]
pub struct MockShell {
    requests: Mutex<Vec<ShellRequest>>,
    behavior: ShellBehavior,
}

impl MockShell {
    pub fn new(behavior: ShellBehavior) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            behavior,
        }
    }

    pub fn exiting(code: i32) -> Self {
        Self::new(ShellBehavior::Exit(code))
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }
}

impl Default for MockShell {
    fn default() -> Self {
        Self::exiting(0)
    }
}

impl RemoteShell for MockShell {
    fn execute(
        &self,
        request: &ShellRequest,
        cancel: &CancelToken,
    ) -> Result<ShellOutcome, ShellError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match self.behavior {
            ShellBehavior::Exit(code) => Ok(ShellOutcome::exited(code)),
            ShellBehavior::SpawnFailure => Err(ShellError::Spawn {
                program: "ssh".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock spawn failure"),
            }),
            ShellBehavior::Interrupt { signals } => {
                for _ in 0..signals {
                    cancel.cancel();
                }
                if request.interactive {
                    return Ok(ShellOutcome::exited(0));
                }
                Ok(ShellOutcome::cancelled(TERMINATED_EXIT_CODE))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSpec;
    use crate::sync::SyncSpec;
    use crate::transport::SyncOptions;
    use std::path::PathBuf;

    fn request(direction: Direction) -> SyncRequest {
        SyncRequest::new(
            SyncSpec {
                direction,
                local_root: PathBuf::from("/w"),
                remote_root: "work".to_string(),
                host: HostSpec::new("a.example.com"),
                forced_includes: Vec::new(),
                parent_includes: Vec::new(),
                parent_excludes: Vec::new(),
                include_patterns: Vec::new(),
                exclude_patterns: Vec::new(),
                subpath: None,
            },
            SyncOptions::default(),
        )
    }

    #[test]
    fn test_file_sync_records_and_fails_by_direction() {
        let sync = MockFileSync::new().failing_on(Direction::Pull);
        let cancel = CancelToken::new();

        assert!(sync.sync(&request(Direction::Push), &cancel).is_ok());
        assert!(matches!(
            sync.sync(&request(Direction::Pull), &cancel),
            Err(SyncError::Failed { .. })
        ));
        assert_eq!(sync.directions(), vec![Direction::Push, Direction::Pull]);
    }

    #[test]
    fn test_file_sync_delay_honors_immediate_exit() {
        let sync = MockFileSync::new().with_delay(Duration::from_secs(10));
        let cancel = CancelToken::new();
        cancel.cancel();
        cancel.cancel();

        let start = Instant::now();
        let err = sync.sync(&request(Direction::Pull), &cancel).unwrap_err();
        assert!(matches!(err, SyncError::Interrupted { .. }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_shell_interrupt_cancels_token() {
        let shell = MockShell::new(ShellBehavior::Interrupt { signals: 1 });
        let cancel = CancelToken::new();
        let outcome = shell
            .execute(&ShellRequest::new(HostSpec::new("a.example.com"), "make"), &cancel)
            .unwrap();

        assert!(outcome.cancelled);
        assert!(cancel.is_cancelled());
        assert!(!cancel.is_immediate_exit());
        assert_eq!(shell.commands(), vec!["make"]);
    }
}
