//! Explaining what a run would do
//!
//! The report is computed locally: configuration provenance, the selected
//! host and directory, both sync specs, the files the push rules select and
//! the rendered command. An optional dry-run transfer adds what rsync itself
//! reports as changed.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use remote_patterns::PatternError;
use serde::Serialize;
use walkdir::WalkDir;

use crate::command::RemoteCommand;
use crate::config::ConfigSource;
use crate::host::{HostSelector, HostSpec};
use crate::session::Session;
use crate::signal::CancelToken;
use crate::sync::SyncSpec;
use crate::transport::{FileSync, SyncOptions, SyncRequest};

/// Errors building an explain report
#[derive(Debug, thiserror::Error)]
pub enum ExplainError {
    #[error("failed to walk workspace: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Selection(#[from] crate::host::SelectionError),
}

/// Dry-run transfer result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRun {
    pub changed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything `explain` prints
#[derive(Debug, Clone, Serialize)]
pub struct ExplainReport {
    pub workspace_root: PathBuf,
    pub initiated: bool,
    pub sources: Vec<ConfigSource>,
    /// 1-based position of the selected host
    pub host_index: usize,
    pub host: HostSpec,
    pub remote_directory: String,
    pub push: SyncSpec,
    pub pull: SyncSpec,
    /// Workspace files the push rules select
    pub pushed_files: Vec<String>,
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<DryRun>,
}

impl ExplainReport {
    pub fn build(
        session: &Session,
        selector: &HostSelector,
        command: Option<&RemoteCommand>,
    ) -> Result<Self, ExplainError> {
        let (index, host) = session.select_host(selector)?;
        let push = session.plan_sync(host, crate::sync::Direction::Push)?;
        let pull = session.plan_sync(host, crate::sync::Direction::Pull)?;
        let remote_directory = session.remote_directory(host);
        let pushed_files = selected_files(&push)?;

        let command = command.map(|c| {
            let c = c.clone().in_subdir(session.working_subdir());
            c.render(&remote_directory, false)
        });

        Ok(Self {
            workspace_root: session.root().path().to_path_buf(),
            initiated: session.root().is_initiated(),
            sources: session.config().sources.clone(),
            host_index: index + 1,
            host: host.clone(),
            remote_directory,
            push,
            pull,
            pushed_files,
            command,
            dry_run: None,
        })
    }

    /// Ask the file-sync collaborator what a push would change
    pub fn with_dry_run(mut self, sync: &dyn FileSync, cancel: &CancelToken) -> Self {
        let options = SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        };
        let result = sync.sync(&SyncRequest::new(self.push.clone(), options), cancel);
        self.dry_run = Some(match result {
            Ok(outcome) => DryRun {
                changed: outcome.changed,
                error: None,
            },
            Err(e) => DryRun {
                changed: Vec::new(),
                error: Some(e.to_string()),
            },
        });
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let mut out = String::new();
        let list = |out: &mut String, title: &str, items: &[String]| {
            let _ = writeln!(out, "  {}:", title);
            if items.is_empty() {
                let _ = writeln!(out, "    (none)");
            }
            for item in items {
                let _ = writeln!(out, "    - {}", item);
            }
        };

        let _ = writeln!(out, "Workspace: {}", self.workspace_root.display());
        if !self.initiated {
            let _ = writeln!(out, "  (no workspace config, using global defaults)");
        }
        let _ = writeln!(out, "Configuration files:");
        for source in &self.sources {
            let digest = &source.digest[..source.digest.len().min(12)];
            let _ = writeln!(out, "  {:<9} {} ({})", source.role.to_string(), source.path, digest);
        }

        let _ = writeln!(out, "Host #{}: {}", self.host_index, self.host);
        let _ = writeln!(
            out,
            "  port {}, gssapi {}",
            self.host.port, self.host.supports_gssapi_auth
        );
        let _ = writeln!(out, "Remote directory: {}", self.remote_directory);

        for spec in [&self.push, &self.pull] {
            let _ = writeln!(out, "{} rules:", spec.direction);
            list(&mut out, "include", &spec.all_includes());
            list(&mut out, "exclude", &spec.all_excludes());
        }

        let _ = writeln!(out, "Files pushed ({}):", self.pushed_files.len());
        for file in &self.pushed_files {
            let _ = writeln!(out, "  {}", file);
        }

        if let Some(command) = &self.command {
            let _ = writeln!(out, "Remote script:");
            for line in command.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }

        if let Some(dry_run) = &self.dry_run {
            match &dry_run.error {
                Some(error) => {
                    let _ = writeln!(out, "Dry run failed: {}", error);
                }
                None => {
                    let _ = writeln!(out, "Dry run:");
                    list(&mut out, "changed", &dry_run.changed);
                }
            }
        }
        out
    }
}

/// Workspace files a sync spec selects, relative to the local root.
///
/// Excluded directories are not descended into, as rsync does.
pub fn selected_files(spec: &SyncSpec) -> Result<Vec<String>, ExplainError> {
    let matcher = spec.matcher()?;
    let root = spec.local_root.as_path();
    let relative = |path: &Path| {
        path.strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| {
            let rel = relative(entry.path());
            rel.as_os_str().is_empty() || matcher.is_synced(&rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        files.push(relative(entry.path()).to_string_lossy().into_owned());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLayer, ConfigResolver, LayerRole};
    use crate::mock::MockFileSync;
    use crate::transport::RsyncFileSync;
    use crate::workspace::WorkspaceRoot;
    use std::fs;
    use tempfile::TempDir;

    fn session(dir: &TempDir, workspace: &str) -> Session {
        let layer =
            ConfigLayer::parse(LayerRole::Workspace, &dir.path().join(".remote.toml"), workspace)
                .unwrap();
        let config = ConfigResolver::merge(None, Some(&layer), None).unwrap();
        Session::from_parts(WorkspaceRoot::new(dir.path(), true), config, PathBuf::new())
    }

    fn populate(dir: &TempDir) {
        let files = [
            ".remote.toml",
            ".remoteenv",
            "src/main.rs",
            "src/lib.rs",
            "build/out.o",
            "build/report.html",
            "notes.log",
        ];
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
    }

    #[test]
    fn test_selected_files_apply_rules() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let session = session(
            &dir,
            "[[hosts]]\nhost = \"a.example.com\"\ndirectory = \"work\"\n\n[push]\nexclude = [\"build/\", \"*.log\"]\n",
        );

        let report = ExplainReport::build(&session, &HostSelector::Default, None).unwrap();
        assert_eq!(report.pushed_files, vec![".remoteenv", "src/lib.rs", "src/main.rs"]);
        assert_eq!(report.remote_directory, "work");
        assert_eq!(report.host_index, 1);
    }

    #[test]
    fn test_env_file_pushed_despite_wildcard() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let session = session(&dir, "[[hosts]]\nhost = \"a.example.com\"\n\n[both]\nexclude = [\"*\"]\n");

        let report = ExplainReport::build(&session, &HostSelector::Default, None).unwrap();
        assert_eq!(report.pushed_files, vec![".remoteenv"]);
    }

    #[test]
    fn test_nested_include_survives_excluded_parent() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let session = session(
            &dir,
            "[[hosts]]\nhost = \"a.example.com\"\n\n[push]\nexclude = [\"*\"]\ninclude = [\"src/main.rs\"]\n",
        );

        let report = ExplainReport::build(&session, &HostSelector::Default, None).unwrap();
        assert_eq!(report.pushed_files, vec![".remoteenv", "src/main.rs"]);

        let args = RsyncFileSync::new()
            .build_args(&SyncRequest::new(report.push.clone(), SyncOptions::default()));
        let position = |arg: &str| args.iter().position(|a| a == arg).unwrap();
        assert!(position("--include=src/") < position("--include=src/main.rs"));
        assert!(position("--include=src/main.rs") < position("--exclude=src/*"));
        assert!(position("--exclude=src/*") < position("--exclude=*"));
    }

    #[test]
    fn test_report_renders_command_and_dry_run() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let session = session(&dir, "[[hosts]]\nhost = \"a.example.com\"\ndirectory = \"work\"\n");
        let sync = MockFileSync::new().with_changed(["src/main.rs"]);

        let report = ExplainReport::build(
            &session,
            &HostSelector::Default,
            Some(&RemoteCommand::new(["make"])),
        )
        .unwrap()
        .with_dry_run(&sync, &CancelToken::new());

        assert!(report.command.as_deref().unwrap().starts_with("cd work\n"));
        assert_eq!(report.dry_run.as_ref().unwrap().changed, vec!["src/main.rs"]);
        assert!(sync.requests()[0].options.dry_run);

        let human = report.to_human();
        assert!(human.contains("Remote directory: work"));
        assert!(human.contains("    - src/main.rs"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["host"]["host"], "a.example.com");
        assert_eq!(json["push"]["direction"], "push");
    }

    #[test]
    fn test_unknown_host_selector() {
        let dir = TempDir::new().unwrap();
        let session = session(&dir, "[[hosts]]\nhost = \"a.example.com\"\n");
        let err = ExplainReport::build(&session, &HostSelector::Index(5), None).unwrap_err();
        assert!(matches!(err, ExplainError::Selection(_)));
    }
}
