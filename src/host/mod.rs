//! Remote host configuration
//!
//! A [`HostSpec`] is one `[[hosts]]` entry. Merged host lists live in a
//! [`HostList`] which indexes labels and implements host selection.

mod selection;

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::GeneralConfig;
use crate::workspace::WorkspaceRoot;

pub use selection::{HostList, HostSelector, SelectionError};

/// Accepted host names: dot-separated runs of word characters and dashes
const HOST_PATTERN: &str = r"^[-\w]+(\.[-\w]+)*$";

static HOST_RE: OnceLock<Result<Regex, String>> = OnceLock::new();

/// Compiled [`HOST_PATTERN`], built on first use
fn host_regex() -> Result<&'static Regex, String> {
    HOST_RE
        .get_or_init(|| Regex::new(HOST_PATTERN).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(Clone::clone)
}

/// Length of the path hash in generated directory names
const PATH_HASH_LEN: usize = 8;

/// A single remote target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSpec {
    /// SSH host name or alias
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote directory relative to the remote home. Generated from the
    /// general settings when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,

    /// Name usable with `--host`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub default: bool,

    /// Pass `-K` to ssh
    #[serde(default = "default_gssapi")]
    pub supports_gssapi_auth: bool,

    /// Extra arguments appended to every ssh invocation
    #[serde(default)]
    pub extra_ssh_args: Vec<String>,
}

fn default_port() -> u16 {
    22
}

fn default_gssapi() -> bool {
    true
}

impl HostSpec {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            directory: None,
            label: None,
            default: false,
            supports_gssapi_auth: default_gssapi(),
            extra_ssh_args: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    pub fn with_gssapi(mut self, enabled: bool) -> Self {
        self.supports_gssapi_auth = enabled;
        self
    }

    pub fn with_extra_ssh_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_ssh_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Check field values that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if !host_regex()?.is_match(&self.host) {
            return Err(format!("host: '{}' is not a valid host name", self.host));
        }
        if self.port == 0 {
            return Err("port: must be in 1..=65535".to_string());
        }
        if let Some(label) = &self.label {
            if label.is_empty() {
                return Err("label: must not be empty".to_string());
            }
        }
        if let Some(directory) = &self.directory {
            if directory.trim().is_empty() {
                return Err("directory: must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Remote directory for `root` on this host
    pub fn remote_directory(&self, general: &GeneralConfig, root: &WorkspaceRoot) -> String {
        match &self.directory {
            Some(directory) => directory.clone(),
            None => generated_directory(general, root),
        }
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, self.host),
            None => write!(f, "{}", self.host),
        }
    }
}

/// Remote directory for a host without an explicit `directory`.
///
/// Flat mode yields `<remote_root>/<name>_<hash>` where the hash is derived
/// from the absolute local path, so distinct workspaces with the same name
/// never collide. Mirrored mode yields `<remote_root>/<absolute path>`.
pub fn generated_directory(general: &GeneralConfig, root: &WorkspaceRoot) -> String {
    let local = root.path().to_string_lossy();
    let leaf = if general.use_relative_remote_paths {
        local.trim_start_matches('/').to_string()
    } else {
        let digest = hex::encode(Sha256::digest(local.as_bytes()));
        format!("{}_{}", root.name(), &digest[..PATH_HASH_LEN])
    };

    let base = general.remote_root.trim_end_matches('/');
    if base.is_empty() {
        leaf
    } else {
        format!("{}/{}", base, leaf)
    }
}
