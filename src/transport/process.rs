//! Child process supervision shared by the rsync and ssh collaborators

use std::io;
use std::process::{Child, ExitStatus};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a supervised child ended
#[derive(Debug)]
pub(crate) enum Finished {
    Exited(ExitStatus),
    /// Stopped because the stop condition fired
    Stopped(ExitStatus),
    TimedOut(ExitStatus),
}

/// Wait for `child`, terminating it when `stop` returns true or `timeout`
/// elapses
pub(crate) fn supervise(
    child: &mut Child,
    stop: impl Fn() -> bool,
    timeout: Option<Duration>,
    grace: Duration,
) -> io::Result<Finished> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Finished::Exited(status));
        }
        if stop() {
            return terminate(child, grace).map(Finished::Stopped);
        }
        if timeout.is_some_and(|limit| start.elapsed() >= limit) {
            return terminate(child, grace).map(Finished::TimedOut);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM, then SIGKILL once `grace` has passed
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    let start = Instant::now();
    while start.elapsed() < grace {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let _ = child.kill();
    child.wait()
}

/// Exit code of a finished process, using the shell's `128 + signal`
/// convention for signal deaths
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
