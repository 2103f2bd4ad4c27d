//! Sync planning
//!
//! Turns the effective configuration, a host and a direction into a
//! [`SyncSpec`]: the roots on both ends plus the include and exclude
//! patterns handed to the file-sync collaborator.

use std::fmt;
use std::path::{Path, PathBuf};

use remote_patterns::{
    IgnoreFile, PatternError, PatternMatcher, RuleScope, VcsPatterns,
};
use serde::Serialize;

use crate::config::EffectiveConfig;
use crate::host::HostSpec;
use crate::workspace::{WorkspaceRoot, ENV_INIT_FILE, VCS_IGNORE_FILE};

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local workspace to remote directory
    Push,
    /// Remote directory back to the local workspace
    Pull,
}

impl Direction {
    pub fn scope(self) -> RuleScope {
        match self {
            Direction::Push => RuleScope::Push,
            Direction::Pull => RuleScope::Pull,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// Everything the file-sync collaborator needs for one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSpec {
    pub direction: Direction,
    pub local_root: PathBuf,
    /// Remote directory, relative to the remote home unless absolute
    pub remote_root: String,
    pub host: HostSpec,
    /// Includes that no user pattern can filter out
    pub forced_includes: Vec<String>,
    /// Directories leading to a nested include
    pub parent_includes: Vec<String>,
    /// Contents of excluded directories opened only for a nested include
    pub parent_excludes: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Pull just this workspace-relative path, with no rules applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpath: Option<PathBuf>,
}

impl SyncSpec {
    /// Includes in transfer order: forced, parent directories, user
    pub fn all_includes(&self) -> Vec<String> {
        self.forced_includes
            .iter()
            .chain(&self.parent_includes)
            .chain(&self.include_patterns)
            .cloned()
            .collect()
    }

    /// Excludes in transfer order: parent directory contents, user
    pub fn all_excludes(&self) -> Vec<String> {
        self.parent_excludes
            .iter()
            .chain(&self.exclude_patterns)
            .cloned()
            .collect()
    }

    /// Local evaluator of the same rules the transfer applies
    pub fn matcher(&self) -> Result<PatternMatcher, PatternError> {
        PatternMatcher::new(&self.all_includes(), &self.all_excludes())
    }
}

/// Directory prefixes of an include pattern, outermost first.
///
/// `src/bin/main.rs` yields `src/` and `src/bin/`; an anchored pattern keeps
/// its leading `/`. Nothing is yielded from a `**` component onwards.
fn ancestor_dirs(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    let (mut prefix, body) = match pattern.strip_prefix('/') {
        Some(rest) => ("/".to_string(), rest),
        None => (String::new(), pattern),
    };
    let components: Vec<&str> = body
        .trim_end_matches('/')
        .split('/')
        .filter(|c| !c.is_empty())
        .collect();

    let mut dirs = Vec::new();
    for component in components.iter().take(components.len().saturating_sub(1)) {
        if component.contains("**") {
            break;
        }
        prefix.push_str(component);
        prefix.push('/');
        dirs.push(prefix.clone());
    }
    dirs
}

/// Rules that let rsync reach nested includes under excluded directories.
///
/// rsync never descends into an excluded directory, so each directory on
/// the way to a nested include is included explicitly. When the user's
/// excludes would have dropped that directory, its other contents are
/// excluded again.
fn parent_rules(
    include: &[String],
    exclude: &[String],
) -> Result<(Vec<String>, Vec<String>), PatternError> {
    let user_excludes = PatternMatcher::new(&[], exclude)?;
    let mut includes: Vec<String> = Vec::new();
    let mut excludes = Vec::new();

    for dir in include.iter().flat_map(|p| ancestor_dirs(p)) {
        if includes.contains(&dir) {
            continue;
        }
        if user_excludes.is_excluded(Path::new(dir.trim_matches('/')), true) {
            excludes.push(format!("{}*", dir));
        }
        includes.push(dir);
    }
    Ok((includes, excludes))
}

/// Builds [`SyncSpec`]s for one workspace
pub struct SyncPlanner<'a> {
    config: &'a EffectiveConfig,
    root: &'a WorkspaceRoot,
    vcs: Box<dyn VcsPatterns + 'a>,
}

impl<'a> SyncPlanner<'a> {
    /// Planner reading VCS patterns from the workspace's ignore file
    pub fn new(config: &'a EffectiveConfig, root: &'a WorkspaceRoot) -> Self {
        Self {
            config,
            root,
            vcs: Box::new(IgnoreFile::in_root(root.path(), VCS_IGNORE_FILE)),
        }
    }

    pub fn with_vcs(mut self, vcs: impl VcsPatterns + 'a) -> Self {
        self.vcs = Box::new(vcs);
        self
    }

    /// Plan a transfer of the workspace to or from `host`
    pub fn plan(&self, host: &HostSpec, direction: Direction) -> Result<SyncSpec, PatternError> {
        let rules = self
            .config
            .rules
            .resolve(direction.scope(), self.vcs.as_ref())?;

        let forced_includes = match direction {
            Direction::Push => vec![format!("/{}", ENV_INIT_FILE)],
            Direction::Pull => Vec::new(),
        };

        let (parent_includes, parent_excludes) = parent_rules(&rules.include, &rules.exclude)?;

        let spec = SyncSpec {
            direction,
            local_root: self.root.path().to_path_buf(),
            remote_root: host.remote_directory(&self.config.general, self.root),
            host: host.clone(),
            forced_includes,
            parent_includes,
            parent_excludes,
            include_patterns: rules.include,
            exclude_patterns: rules.exclude,
            subpath: None,
        };

        tracing::debug!(
            direction = %direction,
            remote = %spec.remote_root,
            includes = spec.include_patterns.len(),
            excludes = spec.exclude_patterns.len(),
            parents = spec.parent_includes.len(),
            "planned sync"
        );
        Ok(spec)
    }

    /// Plan a pull of one workspace-relative path. No rules apply.
    pub fn plan_subpath(&self, host: &HostSpec, subpath: &Path) -> SyncSpec {
        tracing::debug!(path = %subpath.display(), "planned subpath pull");
        SyncSpec {
            direction: Direction::Pull,
            local_root: self.root.path().to_path_buf(),
            remote_root: host.remote_directory(&self.config.general, self.root),
            host: host.clone(),
            forced_includes: Vec::new(),
            parent_includes: Vec::new(),
            parent_excludes: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            subpath: Some(subpath.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLayer, ConfigResolver, LayerRole};
    use remote_patterns::NoVcsPatterns;

    fn config(workspace: &str) -> EffectiveConfig {
        let layer =
            ConfigLayer::parse(LayerRole::Workspace, Path::new("/w/.remote.toml"), workspace)
                .unwrap();
        ConfigResolver::merge(None, Some(&layer), None).unwrap()
    }

    #[test]
    fn test_push_spec_unions_both_block() {
        let config = config(
            r#"
[[hosts]]
host = "a.example.com"
directory = "work/project"

[push]
exclude = ["env"]

[both]
exclude = ["build"]
"#,
        );
        let root = WorkspaceRoot::new("/w", true);
        let planner = SyncPlanner::new(&config, &root).with_vcs(NoVcsPatterns);
        let host = &config.hosts.as_slice()[0];

        let spec = planner.plan(host, Direction::Push).unwrap();
        assert_eq!(spec.local_root, PathBuf::from("/w"));
        assert_eq!(spec.remote_root, "work/project");
        assert_eq!(spec.exclude_patterns, vec!["env", "build", ".remote.toml"]);
    }

    #[test]
    fn test_env_init_forced_on_push_only() {
        let config = config("[[hosts]]\nhost = \"a.example.com\"\n\n[both]\nexclude = [\"*\"]\n");
        let root = WorkspaceRoot::new("/w", true);
        let planner = SyncPlanner::new(&config, &root).with_vcs(NoVcsPatterns);
        let host = &config.hosts.as_slice()[0];

        let push = planner.plan(host, Direction::Push).unwrap();
        assert_eq!(push.forced_includes, vec!["/.remoteenv"]);
        let matcher = push.matcher().unwrap();
        assert!(matcher.is_synced(Path::new(".remoteenv"), false));
        assert!(matcher.is_excluded(Path::new("main.rs"), false));

        let pull = planner.plan(host, Direction::Pull).unwrap();
        assert!(pull.forced_includes.is_empty());
        assert!(pull.matcher().unwrap().is_excluded(Path::new(".remoteenv"), false));
    }

    #[test]
    fn test_vcs_patterns_follow_flag() {
        let config = config(
            "[[hosts]]\nhost = \"a.example.com\"\n\n[pull]\ninclude_vcs_ignore_patterns = true\n",
        );
        let root = WorkspaceRoot::new("/w", true);
        let planner =
            SyncPlanner::new(&config, &root).with_vcs(vec!["*.pyc".to_string()]);
        let host = &config.hosts.as_slice()[0];

        let pull = planner.plan(host, Direction::Pull).unwrap();
        assert!(pull.exclude_patterns.contains(&"*.pyc".to_string()));

        let push = planner.plan(host, Direction::Push).unwrap();
        assert!(!push.exclude_patterns.contains(&"*.pyc".to_string()));
    }

    #[test]
    fn test_reads_gitignore_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "# build output\ntarget/\n").unwrap();
        let config = config(
            "[[hosts]]\nhost = \"a.example.com\"\n\n[both]\ninclude_vcs_ignore_patterns = true\n",
        );
        let root = WorkspaceRoot::new(dir.path(), true);
        let host = &config.hosts.as_slice()[0];

        let spec = SyncPlanner::new(&config, &root)
            .plan(host, Direction::Push)
            .unwrap();
        assert_eq!(spec.exclude_patterns.last().map(String::as_str), Some("target/"));
    }

    #[test]
    fn test_ancestor_dirs() {
        assert_eq!(ancestor_dirs("src/bin/main.rs"), vec!["src/", "src/bin/"]);
        assert_eq!(ancestor_dirs("/a/b/c"), vec!["/a/", "/a/b/"]);
        assert_eq!(ancestor_dirs("docs/api/"), vec!["docs/"]);
        assert_eq!(ancestor_dirs("a/**/b.txt"), vec!["a/"]);
        assert!(ancestor_dirs("*.html").is_empty());
        assert!(ancestor_dirs("/.remoteenv").is_empty());
    }

    #[test]
    fn test_nested_include_under_excluded_parent() {
        let config = config(
            r#"
[[hosts]]
host = "a.example.com"

[push]
exclude = ["build/"]
include = ["build/report.html"]
"#,
        );
        let root = WorkspaceRoot::new("/w", true);
        let planner = SyncPlanner::new(&config, &root).with_vcs(NoVcsPatterns);
        let host = &config.hosts.as_slice()[0];

        let spec = planner.plan(host, Direction::Push).unwrap();
        assert_eq!(spec.parent_includes, vec!["build/"]);
        assert_eq!(spec.parent_excludes, vec!["build/*"]);
        assert_eq!(
            spec.all_includes(),
            vec!["/.remoteenv", "build/", "build/report.html"]
        );

        let matcher = spec.matcher().unwrap();
        assert!(matcher.is_synced(Path::new("build"), true));
        assert!(matcher.is_synced(Path::new("build/report.html"), false));
        assert!(matcher.is_excluded(Path::new("build/out.o"), false));
        assert!(matcher.is_excluded(Path::new("build/cache"), true));
    }

    #[test]
    fn test_parent_of_synced_directory_not_reexcluded() {
        let config = config(
            "[[hosts]]\nhost = \"a.example.com\"\n\n[push]\nexclude = [\"*.log\"]\ninclude = [\"logs/keep.log\"]\n",
        );
        let root = WorkspaceRoot::new("/w", true);
        let planner = SyncPlanner::new(&config, &root).with_vcs(NoVcsPatterns);
        let host = &config.hosts.as_slice()[0];

        let spec = planner.plan(host, Direction::Push).unwrap();
        assert_eq!(spec.parent_includes, vec!["logs/"]);
        assert!(spec.parent_excludes.is_empty());
        let matcher = spec.matcher().unwrap();
        assert!(matcher.is_synced(Path::new("logs/keep.log"), false));
        assert!(matcher.is_excluded(Path::new("logs/other.log"), false));
        assert!(matcher.is_synced(Path::new("logs/readme.md"), false));
    }

    #[test]
    fn test_subpath_pull_has_no_rules() {
        let config = config("[[hosts]]\nhost = \"a.example.com\"\ndirectory = \"work\"\n\n[both]\nexclude = [\"*\"]\n");
        let root = WorkspaceRoot::new("/w", true);
        let planner = SyncPlanner::new(&config, &root).with_vcs(NoVcsPatterns);
        let host = &config.hosts.as_slice()[0];

        let spec = planner.plan_subpath(host, Path::new("target/report.txt"));
        assert_eq!(spec.direction, Direction::Pull);
        assert_eq!(spec.subpath.as_deref(), Some(Path::new("target/report.txt")));
        assert!(spec.all_includes().is_empty());
        assert!(spec.all_excludes().is_empty());
        assert_eq!(spec.remote_root, "work");
    }
}
