//! Per-invocation context: workspace, merged config and cwd
//!
//! Discovery order: the global layer first (it decides whether uninitiated
//! workspaces are allowed), then the workspace root, then the remaining
//! layers.

use std::fs;
use std::path::{Path, PathBuf};

use remote_patterns::PatternError;

use crate::command::RemoteCommand;
use crate::config::{ConfigPaths, ConfigResolver, EffectiveConfig};
use crate::error::RemoteError;
use crate::host::{HostSelector, HostSpec, SelectionError};
use crate::orchestrator::{RunOptions, RunPlan};
use crate::sync::{Direction, SyncPlanner, SyncSpec};
use crate::workspace::{WorkspaceError, WorkspaceLocator, WorkspaceRoot, GLOBAL_CONFIG};

/// Everything resolved for one command invocation
#[derive(Debug, Clone)]
pub struct Session {
    root: WorkspaceRoot,
    config: EffectiveConfig,
    /// Position of the cwd inside the workspace
    working_subdir: PathBuf,
}

impl Session {
    /// Locate the workspace around `cwd` and load its configuration
    pub fn discover(cwd: &Path, home: &Path) -> Result<Self, RemoteError> {
        let global = ConfigResolver::load_global(&home.join(GLOBAL_CONFIG))?;
        let allow_uninitiated = global
            .as_ref()
            .and_then(|layer| layer.general.as_ref())
            .is_some_and(|general| general.allow_uninitiated_workspaces);

        let root = WorkspaceLocator::new(allow_uninitiated).locate(cwd)?;
        let paths = ConfigPaths::new(home, &root);
        let config =
            ConfigResolver::load_with_global(global.as_ref(), &paths.workspace, &paths.ignore)?;

        let cwd = fs::canonicalize(cwd).map_err(|source| WorkspaceError::Io {
            path: cwd.to_path_buf(),
            source,
        })?;
        let working_subdir = root.relative(&cwd).unwrap_or_default();

        tracing::debug!(
            root = %root.path().display(),
            subdir = %working_subdir.display(),
            initiated = root.is_initiated(),
            "resolved workspace"
        );
        Ok(Self::from_parts(root, config, working_subdir))
    }

    pub fn from_parts(root: WorkspaceRoot, config: EffectiveConfig, working_subdir: PathBuf) -> Self {
        Self {
            root,
            config,
            working_subdir,
        }
    }

    pub fn root(&self) -> &WorkspaceRoot {
        &self.root
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn working_subdir(&self) -> &Path {
        &self.working_subdir
    }

    /// Pick a host, returning its 0-based position and spec
    pub fn select_host(&self, selector: &HostSelector) -> Result<(usize, &HostSpec), SelectionError> {
        self.config.hosts.select(selector)
    }

    pub fn planner(&self) -> SyncPlanner<'_> {
        SyncPlanner::new(&self.config, &self.root)
    }

    pub fn remote_directory(&self, host: &HostSpec) -> String {
        host.remote_directory(&self.config.general, &self.root)
    }

    pub fn plan_sync(&self, host: &HostSpec, direction: Direction) -> Result<SyncSpec, PatternError> {
        self.planner().plan(host, direction)
    }

    /// Plan a full cycle of `command` on `host`. Wrapped commands start in
    /// the remote counterpart of the cwd.
    pub fn run_plan(
        &self,
        host: &HostSpec,
        command: RemoteCommand,
        options: RunOptions,
    ) -> Result<RunPlan, PatternError> {
        let planner = self.planner();
        let command = if command.is_raw() {
            command
        } else {
            command.in_subdir(&self.working_subdir)
        };

        Ok(RunPlan {
            host: host.clone(),
            push: planner.plan(host, Direction::Push)?,
            pull: planner.plan(host, Direction::Pull)?,
            command,
            options,
        })
    }

    /// One plan per configured host, in host order
    pub fn run_plans_for_all(
        &self,
        command: &RemoteCommand,
        options: &RunOptions,
    ) -> Result<Vec<RunPlan>, RemoteError> {
        if self.config.hosts.is_empty() {
            return Err(SelectionError::NoHostsConfigured.into());
        }
        self.config
            .hosts
            .iter()
            .map(|host| Ok(self.run_plan(host, command.clone(), options.clone())?))
            .collect()
    }

    /// Plan a pull of `path`, taken relative to the cwd, with no rules
    pub fn plan_subpath_pull(&self, host: &HostSpec, path: &Path) -> Result<SyncSpec, RemoteError> {
        if path.is_absolute() || path.as_os_str().is_empty() {
            return Err(RemoteError::Usage(format!(
                "expected a path inside the workspace, got '{}'",
                path.display()
            )));
        }
        Ok(self
            .planner()
            .plan_subpath(host, &self.working_subdir.join(path)))
    }

    /// One push spec per configured host, in host order
    pub fn push_specs_for_all(&self) -> Result<Vec<SyncSpec>, RemoteError> {
        if self.config.hosts.is_empty() {
            return Err(SelectionError::NoHostsConfigured.into());
        }
        let planner = self.planner();
        self.config
            .hosts
            .iter()
            .map(|host| Ok(planner.plan(host, Direction::Push)?))
            .collect()
    }

    /// Message reported once the remote workspace is gone
    pub fn deleted_message(&self, host: &HostSpec) -> String {
        format!(
            "Successfully deleted {} on host {}",
            self.remote_directory(host),
            host.host
        )
    }

    /// Command removing the host's remote workspace directory
    pub fn delete_command(&self, host: &HostSpec) -> RemoteCommand {
        RemoteCommand::raw(format!(
            "rm -rf {}",
            shell_words::quote(&self.remote_directory(host))
        ))
    }
}
