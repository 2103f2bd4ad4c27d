//! Effective configuration with provenance
//!
//! The effective config captures the merged configuration plus the files
//! that contributed to it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use remote_patterns::SyncRules;
use serde::Serialize;

use super::layer::{ConfigLayer, LayerRole};
use super::merge::{merge_hosts, merge_patterns};
use super::{ConfigError, GeneralConfig};
use crate::host::HostList;
use crate::workspace::{WorkspaceRoot, GLOBAL_CONFIG, WORKSPACE_MARKER};

/// A contributing config file with provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSource {
    pub role: LayerRole,
    pub path: String,
    /// SHA-256 digest of raw file bytes
    pub digest: String,
}

impl From<&ConfigLayer> for ConfigSource {
    fn from(layer: &ConfigLayer) -> Self {
        Self {
            role: layer.role,
            path: layer.path.display().to_string(),
            digest: layer.digest.clone(),
        }
    }
}

/// Paths of the three configuration files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub global: PathBuf,
    pub workspace: PathBuf,
    pub ignore: PathBuf,
}

impl ConfigPaths {
    /// Well-known locations for a home directory and workspace root
    pub fn new(home: &Path, root: &WorkspaceRoot) -> Self {
        Self {
            global: home.join(GLOBAL_CONFIG),
            workspace: root.marker_file(),
            ignore: root.ignore_file(),
        }
    }
}

/// Fully merged configuration used for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    /// When this config was computed
    pub created_at: DateTime<Utc>,

    pub general: GeneralConfig,

    /// Hosts in merge order
    pub hosts: HostList,

    /// Merged push/pull/both blocks. `both` is not yet folded into the
    /// directional blocks.
    pub rules: SyncRules,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Loads and merges configuration layers
pub struct ConfigResolver;

impl ConfigResolver {
    /// Load all three layers and merge them.
    ///
    /// The global and ignore files are optional. The workspace file is
    /// required unless the global layer allows uninitiated workspaces and
    /// configures at least one host.
    pub fn load(
        global_path: &Path,
        workspace_path: &Path,
        ignore_path: &Path,
    ) -> Result<EffectiveConfig, ConfigError> {
        let global = Self::load_global(global_path)?;
        Self::load_with_global(global.as_ref(), workspace_path, ignore_path)
    }

    /// Load only the global layer.
    ///
    /// Workspace discovery needs `allow_uninitiated_workspaces` before the
    /// workspace root, and therefore the other two paths, is known.
    pub fn load_global(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
        ConfigLayer::load(LayerRole::Global, path)
    }

    /// Load the workspace and ignore layers on top of an already loaded
    /// global layer
    pub fn load_with_global(
        global: Option<&ConfigLayer>,
        workspace_path: &Path,
        ignore_path: &Path,
    ) -> Result<EffectiveConfig, ConfigError> {
        let workspace = ConfigLayer::load(LayerRole::Workspace, workspace_path)?;
        if workspace.is_none() && !Self::uninitiated_allowed(global) {
            return Err(ConfigError::MissingWorkspaceConfig {
                path: workspace_path.to_path_buf(),
            });
        }

        let ignore = ConfigLayer::load(LayerRole::Ignore, ignore_path)?;
        Self::merge(global, workspace.as_ref(), ignore.as_ref())
    }

    /// Merge parsed layers in precedence order: global, workspace, ignore
    pub fn merge(
        global: Option<&ConfigLayer>,
        workspace: Option<&ConfigLayer>,
        ignore: Option<&ConfigLayer>,
    ) -> Result<EffectiveConfig, ConfigError> {
        let general = global
            .and_then(|layer| layer.general.clone())
            .unwrap_or_default();

        let mut hosts = Vec::new();
        let mut rules = SyncRules::default();
        let mut sources = Vec::new();

        for layer in [global, workspace, ignore].into_iter().flatten() {
            hosts = merge_hosts(hosts, layer.hosts.as_ref());
            rules.push = merge_patterns(rules.push, layer.push.as_ref());
            rules.pull = merge_patterns(rules.pull, layer.pull.as_ref());
            rules.both = merge_patterns(rules.both, layer.both.as_ref());
            sources.push(ConfigSource::from(layer));
        }

        // The workspace config never travels.
        rules.both.exclude.push(WORKSPACE_MARKER.to_string());

        let hosts = HostList::new(hosts)?;
        tracing::debug!(
            hosts = hosts.len(),
            layers = sources.len(),
            "merged configuration"
        );

        Ok(EffectiveConfig {
            created_at: Utc::now(),
            general,
            hosts,
            rules,
            sources,
        })
    }

    fn uninitiated_allowed(global: Option<&ConfigLayer>) -> bool {
        global.is_some_and(|layer| {
            let allowed = layer
                .general
                .as_ref()
                .is_some_and(|g| g.allow_uninitiated_workspaces);
            let has_hosts = layer.hosts.as_ref().is_some_and(|b| !b.value().is_empty());
            allowed && has_hosts
        })
    }
}
