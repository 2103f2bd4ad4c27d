//! Local evaluation of include/exclude rules with rsync-style globs.
//!
//! Pattern semantics:
//! - `*` matches within one path component, `**` crosses components
//! - a leading `/` anchors the pattern at the workspace root
//! - a trailing `/` restricts the pattern to directories
//! - an unanchored pattern matches at any depth
//!
//! A path matched by an include pattern is synced regardless of excludes.
//! Otherwise it is skipped when an exclude matches it or any of its parent
//! directories.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::{PatternError, PatternSet};

/// Compiled form of one pattern list.
#[derive(Debug, Clone)]
struct RuleList {
    any: GlobSet,
    dirs_only: GlobSet,
}

impl RuleList {
    fn compile(patterns: &[String]) -> Result<Self, PatternError> {
        let mut any = GlobSetBuilder::new();
        let mut dirs_only = GlobSetBuilder::new();

        for pattern in patterns {
            let Some((glob, dir_only)) = rsync_glob(pattern) else {
                continue;
            };
            let compiled = GlobBuilder::new(&glob)
                .literal_separator(true)
                .build()
                .map_err(|source| PatternError::InvalidGlob {
                    pattern: pattern.clone(),
                    source,
                })?;
            if dir_only {
                dirs_only.add(compiled);
            } else {
                any.add(compiled);
            }
        }

        let build = |builder: GlobSetBuilder, pattern: &str| {
            builder.build().map_err(|source| PatternError::InvalidGlob {
                pattern: pattern.to_string(),
                source,
            })
        };

        Ok(Self {
            any: build(any, "<file patterns>")?,
            dirs_only: build(dirs_only, "<directory patterns>")?,
        })
    }

    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        self.any.is_match(path) || (is_dir && self.dirs_only.is_match(path))
    }

    fn matches_parent(&self, path: &Path) -> bool {
        path.ancestors()
            .skip(1)
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.matches(a, true))
    }
}

/// Translate an rsync-style pattern into a glob plus a directory-only flag.
fn rsync_glob(pattern: &str) -> Option<(String, bool)> {
    let pattern = pattern.trim();
    let dir_only = pattern.len() > 1 && pattern.ends_with('/');
    let body = pattern.trim_end_matches('/');

    let (anchored, body) = match body.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    if body.is_empty() {
        return None;
    }

    let glob = if anchored || body == "**" || body.starts_with("**/") {
        body.to_string()
    } else {
        format!("**/{}", body)
    };
    Some((glob, dir_only))
}

/// Evaluates a resolved [`PatternSet`] against workspace-relative paths.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    include: RuleList,
    exclude: RuleList,
}

impl PatternMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        Ok(Self {
            include: RuleList::compile(include)?,
            exclude: RuleList::compile(exclude)?,
        })
    }

    pub fn from_set(set: &PatternSet) -> Result<Self, PatternError> {
        Self::new(&set.include, &set.exclude)
    }

    /// Whether a workspace-relative path would be transferred.
    pub fn is_synced(&self, path: &Path, is_dir: bool) -> bool {
        if self.include.matches(path, is_dir) {
            return true;
        }
        !(self.exclude.matches(path, is_dir) || self.exclude.matches_parent(path))
    }

    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        !self.is_synced(path, is_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(include: &[&str], exclude: &[&str]) -> PatternMatcher {
        let to_vec = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        PatternMatcher::new(&to_vec(include), &to_vec(exclude)).unwrap()
    }

    #[test]
    fn test_empty_rules_sync_everything() {
        let m = matcher(&[], &[]);
        assert!(m.is_synced(Path::new("src/main.rs"), false));
        assert!(m.is_synced(Path::new(".git"), true));
    }

    #[test]
    fn test_unanchored_name_matches_at_any_depth() {
        let m = matcher(&[], &["build"]);
        assert!(m.is_excluded(Path::new("build"), true));
        assert!(m.is_excluded(Path::new("build/out/app"), false));
        assert!(m.is_excluded(Path::new("sub/build/x.o"), false));
        assert!(m.is_synced(Path::new("builder.rs"), false));
    }

    #[test]
    fn test_star_stays_within_component() {
        let m = matcher(&[], &["*.log"]);
        assert!(m.is_excluded(Path::new("debug.log"), false));
        assert!(m.is_excluded(Path::new("a/b/debug.log"), false));
        assert!(m.is_synced(Path::new("log/readme"), false));
    }

    #[test]
    fn test_anchored_pattern_matches_only_at_root() {
        let m = matcher(&[], &["/target"]);
        assert!(m.is_excluded(Path::new("target/debug/app"), false));
        assert!(m.is_synced(Path::new("crates/x/target/debug/app"), false));
    }

    #[test]
    fn test_trailing_slash_matches_directories_only() {
        let m = matcher(&[], &["out/"]);
        assert!(m.is_excluded(Path::new("out"), true));
        assert!(m.is_excluded(Path::new("out/report.txt"), false));
        assert!(m.is_synced(Path::new("out"), false));
    }

    #[test]
    fn test_double_star_crosses_directories() {
        let m = matcher(&[], &["docs/**/*.tmp"]);
        assert!(m.is_excluded(Path::new("docs/a/b/c.tmp"), false));
        assert!(m.is_synced(Path::new("docs/c.txt"), false));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let m = matcher(&["/.remoteenv", "*.keep"], &["*"]);
        assert!(m.is_synced(Path::new(".remoteenv"), false));
        assert!(m.is_synced(Path::new("data.keep"), false));
        assert!(m.is_excluded(Path::new("main.rs"), false));
    }

    #[test]
    fn test_invalid_glob_is_reported() {
        let err = PatternMatcher::new(&[], &["[unclosed".to_string()]).unwrap_err();
        assert!(err.to_string().contains("[unclosed"));
    }
}
