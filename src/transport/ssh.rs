//! Remote shell over the `ssh` binary

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::process::{exit_code, supervise, Finished};
use super::{PortForward, RemoteShell, ShellError, ShellOutcome, ShellRequest};
use crate::host::HostSpec;
use crate::signal::CancelToken;

/// ssh's own exit status for connection and protocol failures
pub const SSH_CONNECTION_FAILURE: i32 = 255;

/// Default time between SIGTERM and SIGKILL for a cancelled session
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Options for an ssh invocation, without the host name or command.
///
/// Password prompts are always disabled so a missing key fails fast instead
/// of hanging a non-interactive run.
pub fn ssh_args(host: &HostSpec, tty: bool, verbose: bool, forwards: &[PortForward]) -> Vec<String> {
    let mut args = Vec::new();

    if tty {
        args.push("-t".to_string());
    }
    if host.supports_gssapi_auth {
        args.push("-K".to_string());
    } else {
        args.push("-o".to_string());
        args.push("GSSAPIAuthentication=no".to_string());
    }
    args.push(if verbose { "-v" } else { "-q" }.to_string());
    args.push("-o".to_string());
    args.push("BatchMode=yes".to_string());
    args.push("-p".to_string());
    args.push(host.port.to_string());

    for forward in forwards {
        args.push("-L".to_string());
        args.push(forward.ssh_spec());
    }

    args.extend(host.extra_ssh_args.iter().cloned());
    args
}

/// [`RemoteShell`] that runs `ssh` with inherited stdio
#[derive(Debug, Clone)]
pub struct SshShell {
    program: String,
    grace: Duration,
}

impl SshShell {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
            grace: DEFAULT_TERMINATION_GRACE,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Full argument list: options, host, command
    pub fn build_args(&self, request: &ShellRequest) -> Vec<String> {
        let mut args = ssh_args(&request.host, true, request.verbose, &request.forwards);
        args.push(request.host.host.clone());
        args.push(request.command.clone());
        args
    }
}

impl Default for SshShell {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteShell for SshShell {
    fn execute(
        &self,
        request: &ShellRequest,
        cancel: &CancelToken,
    ) -> Result<ShellOutcome, ShellError> {
        let args = self.build_args(request);
        tracing::debug!(
            host = %request.host.host,
            "executing:\n{} {} <<EOS\n{}\nEOS",
            self.program,
            shell_words::join(&args[..args.len() - 2]),
            request.command
        );

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ShellError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let outcome = if request.interactive {
            ShellOutcome::exited(exit_code(child.wait()?))
        } else {
            match supervise(&mut child, || cancel.is_cancelled(), None, self.grace)? {
                Finished::Exited(status) => ShellOutcome::exited(exit_code(status)),
                Finished::Stopped(status) | Finished::TimedOut(status) => {
                    ShellOutcome::cancelled(exit_code(status))
                }
            }
        };

        if outcome.exit_code == SSH_CONNECTION_FAILURE && !outcome.cancelled {
            tracing::warn!(host = %request.host.host, "ssh exited with 255, the connection may have failed");
        }
        tracing::info!(
            exit_code = outcome.exit_code,
            cancelled = outcome.cancelled,
            "execution done in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }
}
