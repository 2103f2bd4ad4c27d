//! Pattern sets and their merge/resolve rules.

use serde::{Deserialize, Serialize};

use crate::{PatternError, VcsPatterns};

/// Include/exclude rules for one config block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSet {
    /// Patterns of files that are not transferred.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Patterns of files that are transferred even when excluded.
    #[serde(default)]
    pub include: Vec<String>,

    /// Append the VCS ignore file's patterns to `exclude`.
    ///
    /// `None` means the layer did not set the flag.
    #[serde(
        default,
        alias = "include_vsc_ignore_patterns",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_vcs_ignore_patterns: Option<bool>,
}

impl PatternSet {
    /// Build a set from exclude patterns only.
    pub fn excluding<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Merge `other` on top of `self`.
    ///
    /// List fields concatenate with `self` first. The VCS flag takes the
    /// value of `other` only when `other` sets it explicitly.
    pub fn merge(&self, other: &PatternSet) -> PatternSet {
        let mut merged = self.clone();
        merged.exclude.extend(other.exclude.iter().cloned());
        merged.include.extend(other.include.iter().cloned());
        if other.include_vcs_ignore_patterns.is_some() {
            merged.include_vcs_ignore_patterns = other.include_vcs_ignore_patterns;
        }
        merged
    }

    /// Whether the VCS ignore patterns should be folded in.
    pub fn uses_vcs_ignore(&self) -> bool {
        self.include_vcs_ignore_patterns.unwrap_or(false)
    }

    /// True when the set has no patterns, which means "sync everything".
    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.include.is_empty()
    }
}

/// Which block of [`SyncRules`] a resolution targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Push,
    Pull,
    Both,
}

/// The three pattern blocks of a merged configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRules {
    pub push: PatternSet,
    pub pull: PatternSet,
    pub both: PatternSet,
}

impl SyncRules {
    /// Resolve the effective rules for a scope.
    ///
    /// `Push` and `Pull` are unioned with `both` (direction entries first).
    /// The VCS flag is set when either block sets it, and in that case the
    /// provider's patterns are appended to `exclude`. The provider is not
    /// consulted otherwise.
    pub fn resolve(
        &self,
        scope: RuleScope,
        vcs: &dyn VcsPatterns,
    ) -> Result<PatternSet, PatternError> {
        let directional = match scope {
            RuleScope::Push => Some(&self.push),
            RuleScope::Pull => Some(&self.pull),
            RuleScope::Both => None,
        };

        let mut resolved = match directional {
            Some(set) => {
                let mut union = set.clone();
                union.exclude.extend(self.both.exclude.iter().cloned());
                union.include.extend(self.both.include.iter().cloned());
                union.include_vcs_ignore_patterns =
                    Some(set.uses_vcs_ignore() || self.both.uses_vcs_ignore());
                union
            }
            None => {
                let mut both = self.both.clone();
                both.include_vcs_ignore_patterns = Some(self.both.uses_vcs_ignore());
                both
            }
        };

        if resolved.uses_vcs_ignore() {
            resolved.exclude.extend(vcs.patterns()?);
        }

        Ok(resolved)
    }
}
