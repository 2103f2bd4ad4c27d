//! File transfer over the `rsync` binary

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::process::{supervise, Finished};
use super::ssh::{ssh_args, DEFAULT_TERMINATION_GRACE};
use super::{FileSync, SyncError, SyncOutcome, SyncRequest};
use crate::signal::CancelToken;
use crate::sync::Direction;

/// [`FileSync`] that runs `rsync` over ssh
#[derive(Debug, Clone)]
pub struct RsyncFileSync {
    program: String,
    ssh_program: String,
    grace: Duration,
}

impl RsyncFileSync {
    pub fn new() -> Self {
        Self {
            program: "rsync".to_string(),
            ssh_program: "ssh".to_string(),
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

    /// Remote shell passed to `rsync -e`. Never allocates a tty.
    fn remote_shell(&self, request: &SyncRequest) -> String {
        let mut command = vec![self.ssh_program.clone()];
        command.extend(ssh_args(
            &request.spec.host,
            false,
            request.options.verbose,
            &[],
        ));
        shell_words::join(command)
    }

    /// Argument list for one transfer.
    ///
    /// Includes come before excludes; rsync applies the first matching rule.
    pub fn build_args(&self, request: &SyncRequest) -> Vec<String> {
        let spec = &request.spec;
        let options = &request.options;

        let mut args = vec![
            "-arlpmchz".to_string(),
            "--copy-unsafe-links".to_string(),
            "--force".to_string(),
            "-e".to_string(),
            self.remote_shell(request),
        ];
        if options.dry_run {
            args.push("-n".to_string());
            args.push("-i".to_string());
        }
        if options.verbose {
            args.push("-v".to_string());
        }

        if spec.direction == Direction::Push {
            // Local deletions propagate; the remote tree may not exist yet.
            args.push("--delete".to_string());
            if options.mirror {
                args.push("--delete-after".to_string());
                args.push("--delete-excluded".to_string());
            }
            args.push("--rsync-path".to_string());
            args.push(format!(
                "mkdir -p {} && rsync",
                shell_words::quote(&spec.remote_root)
            ));
        }

        for pattern in spec.all_includes() {
            args.push(format!("--include={}", pattern));
        }
        for pattern in spec.all_excludes() {
            args.push(format!("--exclude={}", pattern));
        }

        let local = spec.local_root.display().to_string();
        let remote = format!("{}:{}", spec.host.host, spec.remote_root);
        match (spec.direction, &spec.subpath) {
            (Direction::Pull, Some(subpath)) => {
                args.push(format!(
                    "{}/{}",
                    remote.trim_end_matches('/'),
                    subpath.display()
                ));
                args.push(format!("{}/", subpath_destination(request).display()));
            }
            (Direction::Push, _) => {
                args.push(format!("{}/", local.trim_end_matches('/')));
                args.push(remote);
            }
            (Direction::Pull, None) => {
                args.push(format!("{}/", remote.trim_end_matches('/')));
                args.push(local);
            }
        }
        args
    }
}

/// Local directory a subpath pull lands in: the subpath's parent
fn subpath_destination(request: &SyncRequest) -> PathBuf {
    let spec = &request.spec;
    match spec.subpath.as_deref().and_then(|p| p.parent()) {
        Some(parent) => spec.local_root.join(parent),
        None => spec.local_root.clone(),
    }
}

impl Default for RsyncFileSync {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSync for RsyncFileSync {
    fn sync(&self, request: &SyncRequest, cancel: &CancelToken) -> Result<SyncOutcome, SyncError> {
        let direction = request.direction();
        if request.spec.subpath.is_some() && !request.options.dry_run {
            fs::create_dir_all(subpath_destination(request))?;
        }
        let args = self.build_args(request);
        tracing::info!(
            direction = %direction,
            local = %request.spec.local_root.display(),
            remote = %format!("{}:{}", request.spec.host.host, request.spec.remote_root),
            "syncing files"
        );
        tracing::debug!("starting sync with command {} {}", self.program, shell_words::join(&args));

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(if request.options.dry_run {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain itemized output on a separate thread so a full pipe never
        // blocks the transfer.
        let reader = child.stdout.take().map(|stdout| {
            std::thread::spawn(move || {
                BufReader::new(stdout)
                    .lines()
                    .map_while(Result::ok)
                    .filter_map(|line| parse_itemized_line(&line))
                    .collect::<Vec<_>>()
            })
        });

        let finished = supervise(
            &mut child,
            || cancel.is_immediate_exit(),
            request.options.timeout,
            self.grace,
        )?;
        let changed = reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match finished {
            Finished::Exited(status) if status.success() => {
                tracing::info!(
                    direction = %direction,
                    changed = changed.len(),
                    "sync done in {:.2} seconds",
                    start.elapsed().as_secs_f64()
                );
                Ok(SyncOutcome { changed })
            }
            Finished::Exited(status) => Err(SyncError::Failed {
                direction,
                host: request.spec.host.host.clone(),
                code: status.code(),
            }),
            Finished::Stopped(_) => Err(SyncError::Interrupted { direction }),
            Finished::TimedOut(_) => Err(SyncError::TimedOut {
                direction,
                after: request.options.timeout.unwrap_or_default(),
            }),
        }
    }
}

/// Path named by one line of `rsync -i` output, if the line is an item
pub fn parse_itemized_line(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix("*deleting") {
        let path = rest.trim();
        return (!path.is_empty()).then(|| path.to_string());
    }

    let (code, path) = line.split_once(' ')?;
    if code.len() != 11 || !code.starts_with(['<', '>', 'c', 'h', '.']) {
        return None;
    }
    let path = path.trim_end();
    if path.is_empty() || path == "./" {
        return None;
    }
    Some(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSpec;
    use crate::sync::SyncSpec;
    use crate::transport::SyncOptions;
    use std::path::PathBuf;

    fn spec(direction: Direction) -> SyncSpec {
        SyncSpec {
            direction,
            local_root: PathBuf::from("/home/dev/project"),
            remote_root: ".remotes/project_1234abcd".to_string(),
            host: HostSpec::new("build.example.com"),
            forced_includes: match direction {
                Direction::Push => vec!["/.remoteenv".to_string()],
                Direction::Pull => Vec::new(),
            },
            parent_includes: vec!["build/".to_string()],
            parent_excludes: vec!["build/*".to_string()],
            include_patterns: vec!["build/report.html".to_string()],
            exclude_patterns: vec!["build".to_string(), ".remote.toml".to_string()],
            subpath: None,
        }
    }

    fn args(direction: Direction, options: SyncOptions) -> Vec<String> {
        RsyncFileSync::new().build_args(&SyncRequest::new(spec(direction), options))
    }

    #[test]
    fn test_push_args() {
        let args = args(Direction::Push, SyncOptions::default());
        assert_eq!(args[0], "-arlpmchz");
        assert!(args[4].starts_with("ssh -K -q -o "));
        assert!(!args[4].contains("-t"));
        assert!(args.contains(&"--delete".to_string()));
        assert!(!args.contains(&"--delete-excluded".to_string()));
        assert!(args.contains(&"mkdir -p .remotes/project_1234abcd && rsync".to_string()));
        assert_eq!(
            &args[args.len() - 2..],
            &["/home/dev/project/", "build.example.com:.remotes/project_1234abcd"]
        );
    }

    #[test]
    fn test_includes_precede_excludes() {
        let args = args(Direction::Push, SyncOptions::default());
        let position = |arg: &str| args.iter().position(|a| a == arg).unwrap();

        assert!(position("--include=/.remoteenv") < position("--include=build/"));
        assert!(position("--include=build/") < position("--include=build/report.html"));
        assert!(position("--include=build/report.html") < position("--exclude=build/*"));
        assert!(position("--exclude=build/*") < position("--exclude=build"));
    }

    #[test]
    fn test_pull_args() {
        let args = args(Direction::Pull, SyncOptions::default());
        assert!(!args.contains(&"--delete".to_string()));
        assert!(!args.contains(&"--rsync-path".to_string()));
        assert!(!args.contains(&"--include=/.remoteenv".to_string()));
        assert_eq!(
            &args[args.len() - 2..],
            &["build.example.com:.remotes/project_1234abcd/", "/home/dev/project"]
        );
    }

    #[test]
    fn test_subpath_pull_args() {
        let mut spec = spec(Direction::Pull);
        spec.parent_includes.clear();
        spec.parent_excludes.clear();
        spec.include_patterns.clear();
        spec.exclude_patterns.clear();
        spec.subpath = Some(PathBuf::from("crates/core/target/report.txt"));
        let args =
            RsyncFileSync::new().build_args(&SyncRequest::new(spec, SyncOptions::default()));

        assert!(!args.iter().any(|a| a.starts_with("--include") || a.starts_with("--exclude")));
        assert_eq!(
            &args[args.len() - 2..],
            &[
                "build.example.com:.remotes/project_1234abcd/crates/core/target/report.txt",
                "/home/dev/project/crates/core/target/"
            ]
        );
    }

    #[test]
    fn test_mirror_and_dry_run_flags() {
        let options = SyncOptions {
            dry_run: true,
            mirror: true,
            verbose: true,
            timeout: None,
        };
        let args = args(Direction::Push, options);
        for flag in ["-n", "-i", "-v", "--delete-after", "--delete-excluded"] {
            assert!(args.contains(&flag.to_string()), "missing {flag}");
        }
        assert!(args[4].contains("-v"));
    }

    #[test]
    fn test_parse_itemized_lines() {
        assert_eq!(parse_itemized_line(">f+++++++++ src/main.rs").as_deref(), Some("src/main.rs"));
        assert_eq!(parse_itemized_line("cd+++++++++ build/").as_deref(), Some("build/"));
        assert_eq!(parse_itemized_line("*deleting   old.txt").as_deref(), Some("old.txt"));
        assert_eq!(parse_itemized_line(".d..t...... ./"), None);
        assert_eq!(parse_itemized_line("sending incremental file list"), None);
        assert_eq!(parse_itemized_line(""), None);
    }
}
