//! Include/exclude rules for workspace synchronization.
//!
//! A [`PatternSet`] holds the rules of one block (`push`, `pull` or `both`).
//! [`SyncRules`] bundles the three blocks and resolves the effective rules for
//! a transfer direction, optionally folding in the patterns of the workspace's
//! VCS ignore file. [`PatternMatcher`] evaluates the resolved rules locally
//! with rsync-style semantics.

mod matcher;
mod set;
mod vcs;

pub use matcher::PatternMatcher;
pub use set::{PatternSet, RuleScope, SyncRules};
pub use vcs::{parse_ignore_lines, IgnoreFile, NoVcsPatterns, VcsPatterns};

/// Errors raised while resolving or compiling patterns.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to read ignore file {path}: {source}")]
    IgnoreFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
