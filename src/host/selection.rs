//! Host list indexing and selection
//!
//! Selection rules:
//! - no selector: the host flagged `default`, otherwise the first host
//! - numeric selector: 1-based position in merge order
//! - anything else: exact, case-sensitive label match

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::HostSpec;
use crate::config::ConfigError;

/// How the user picked a host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostSelector {
    #[default]
    Default,
    /// 1-based position
    Index(usize),
    Label(String),
}

impl FromStr for HostSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse() {
                return Ok(Self::Index(index));
            }
        }
        Ok(Self::Label(s.to_string()))
    }
}

impl fmt::Display for HostSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Index(index) => write!(f, "#{}", index),
            Self::Label(label) => write!(f, "'{}'", label),
        }
    }
}

/// Host selection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no host matches {selector} ({available} configured)")]
    HostNotFound { selector: String, available: usize },

    #[error("no hosts configured")]
    NoHostsConfigured,
}

/// Ordered host list with a label index. Rebuilt after every merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HostList {
    hosts: Vec<HostSpec>,
    #[serde(skip)]
    by_label: HashMap<String, usize>,
}

impl HostList {
    /// Index `hosts`, rejecting duplicate labels
    pub fn new(hosts: Vec<HostSpec>) -> Result<Self, ConfigError> {
        let mut by_label = HashMap::new();
        for (i, host) in hosts.iter().enumerate() {
            if let Some(label) = &host.label {
                if by_label.insert(label.clone(), i).is_some() {
                    return Err(ConfigError::DuplicateLabel {
                        label: label.clone(),
                    });
                }
            }
        }
        Ok(Self { hosts, by_label })
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HostSpec> {
        self.hosts.iter()
    }

    pub fn as_slice(&self) -> &[HostSpec] {
        &self.hosts
    }

    /// Position of the host flagged default, if any
    pub fn default_index(&self) -> Option<usize> {
        self.hosts.iter().position(|h| h.default)
    }

    /// Pick a host, returning its 0-based position and spec
    pub fn select(&self, selector: &HostSelector) -> Result<(usize, &HostSpec), SelectionError> {
        if self.hosts.is_empty() {
            return Err(SelectionError::NoHostsConfigured);
        }

        let index = match selector {
            HostSelector::Default => Some(self.default_index().unwrap_or(0)),
            HostSelector::Index(n) => n.checked_sub(1).filter(|i| *i < self.hosts.len()),
            HostSelector::Label(label) => self.by_label.get(label).copied(),
        };

        index
            .map(|i| (i, &self.hosts[i]))
            .ok_or_else(|| SelectionError::HostNotFound {
                selector: selector.to_string(),
                available: self.hosts.len(),
            })
    }
}

impl<'a> IntoIterator for &'a HostList {
    type Item = &'a HostSpec;
    type IntoIter = std::slice::Iter<'a, HostSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
