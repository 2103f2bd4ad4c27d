//! Parsing and validation of a single configuration layer
//!
//! Three files feed the effective configuration: the global defaults, the
//! workspace config and the workspace ignore file. Each parses into a
//! [`ConfigLayer`] whose blocks are tagged as [`Block::Replace`] or
//! [`Block::Extend`] so the merge never has to inspect raw keys.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use remote_patterns::PatternSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{ConfigError, GeneralConfig};
use crate::host::HostSpec;

/// Which file a layer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerRole {
    Global,
    Workspace,
    Ignore,
}

impl std::fmt::Display for LayerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Workspace => write!(f, "workspace"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// How a layer's block combines with the block accumulated so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum Block<T> {
    /// Discard whatever lower layers defined
    Replace(T),
    /// Append onto lower layers, keeping their entries first
    Extend(T),
}

impl<T> Block<T> {
    pub fn value(&self) -> &T {
        match self {
            Block::Replace(v) | Block::Extend(v) => v,
        }
    }

    pub fn is_extend(&self) -> bool {
        matches!(self, Block::Extend(_))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerDocument {
    general: Option<GeneralConfig>,
    hosts: Option<Vec<HostSpec>>,
    push: Option<PatternSet>,
    pull: Option<PatternSet>,
    both: Option<PatternSet>,
    extends: Option<ExtendsDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtendsDocument {
    hosts: Option<Vec<HostSpec>>,
    push: Option<PatternSet>,
    pull: Option<PatternSet>,
    both: Option<PatternSet>,
}

impl ExtendsDocument {
    fn is_empty(&self) -> bool {
        self.hosts.is_none() && self.push.is_none() && self.pull.is_none() && self.both.is_none()
    }
}

/// One parsed configuration file. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigLayer {
    pub role: LayerRole,
    pub path: PathBuf,
    /// SHA-256 of the raw file bytes
    pub digest: String,
    pub general: Option<GeneralConfig>,
    pub hosts: Option<Block<Vec<HostSpec>>>,
    pub push: Option<Block<PatternSet>>,
    pub pull: Option<Block<PatternSet>>,
    pub both: Option<Block<PatternSet>>,
}

impl ConfigLayer {
    /// Load a layer from disk. A missing file is not an error.
    pub fn load(role: LayerRole, path: &Path) -> Result<Option<Self>, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let digest = hex::encode(Sha256::digest(&bytes));
        let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: format!("invalid UTF-8: {}", e),
        })?;

        let mut layer = Self::parse(role, path, &contents)?;
        layer.digest = digest;
        tracing::debug!(role = %role, path = %path.display(), "loaded config layer");
        Ok(Some(layer))
    }

    /// Parse and validate layer contents
    pub fn parse(role: LayerRole, path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let document: LayerDocument = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string().trim_end().to_string(),
        })?;

        Self::from_document(role, path, document)
    }

    fn from_document(
        role: LayerRole,
        path: &Path,
        document: LayerDocument,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        };
        let extends = document.extends.unwrap_or_default();

        match role {
            LayerRole::Global => {
                if !extends.is_empty() {
                    return Err(invalid(
                        "extends: only allowed in workspace files".to_string(),
                    ));
                }
                if let Some(hosts) = &document.hosts {
                    if hosts.iter().any(|h| h.directory.is_some()) {
                        return Err(invalid(
                            "hosts: cannot specify directory in global host config".to_string(),
                        ));
                    }
                }
            }
            LayerRole::Workspace => {
                if document.general.is_some() {
                    return Err(invalid("general: only allowed in the global config".to_string()));
                }
            }
            LayerRole::Ignore => {
                if document.general.is_some() {
                    return Err(invalid("general: not allowed in an ignore file".to_string()));
                }
                if document.hosts.is_some() || extends.hosts.is_some() {
                    return Err(invalid("hosts: not allowed in an ignore file".to_string()));
                }
            }
        }

        for (prefix, hosts) in [("hosts", &document.hosts), ("extends.hosts", &extends.hosts)] {
            if let Some(hosts) = hosts {
                validate_hosts(prefix, hosts).map_err(invalid)?;
            }
        }

        // Ignore-file blocks always extend, whichever form they were written in.
        let plain = |value| match role {
            LayerRole::Ignore => Block::Extend(value),
            _ => Block::Replace(value),
        };
        let combine = |name: &str, base: Option<_>, ext: Option<_>| match (base, ext) {
            (Some(_), Some(_)) => Err(invalid(format!(
                "{}: specified for both overwrite and extend",
                name
            ))),
            (Some(v), None) => Ok(Some(plain(v))),
            (None, Some(v)) => Ok(Some(Block::Extend(v))),
            (None, None) => Ok(None),
        };

        let hosts = match (document.hosts, extends.hosts) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "hosts: specified for both overwrite and extend".to_string(),
                ))
            }
            (Some(h), None) => Some(Block::Replace(h)),
            (None, Some(h)) => Some(Block::Extend(h)),
            (None, None) => None,
        };

        Ok(Self {
            role,
            path: path.to_path_buf(),
            digest: String::new(),
            general: document.general,
            hosts,
            push: combine("push", document.push, extends.push)?,
            pull: combine("pull", document.pull, extends.pull)?,
            both: combine("both", document.both, extends.both)?,
        })
    }
}

fn validate_hosts(prefix: &str, hosts: &[HostSpec]) -> Result<(), String> {
    for (i, host) in hosts.iter().enumerate() {
        host.validate()
            .map_err(|reason| format!("{}.{}: {}", prefix, i, reason))?;
    }
    if hosts.iter().filter(|h| h.default).count() > 1 {
        return Err(format!("{}: can only have one default", prefix));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(role: LayerRole, text: &str) -> Result<ConfigLayer, ConfigError> {
        ConfigLayer::parse(role, Path::new("/root/.remote.toml"), text)
    }

    #[test]
    fn test_parse_global_layer() {
        let layer = parse(
            LayerRole::Global,
            r#"
[general]
allow_uninitiated_workspaces = true
remote_root = "my-remotes"

[[hosts]]
host = "test-host.example.com"
port = 2022
label = "bar"
default = true

[push]
exclude = ["env", ".git"]
"#,
        )
        .unwrap();

        let general = layer.general.unwrap();
        assert!(general.allow_uninitiated_workspaces);
        assert_eq!(general.remote_root, "my-remotes");

        let hosts = layer.hosts.unwrap();
        assert!(!hosts.is_extend());
        assert_eq!(hosts.value()[0].port, 2022);
        assert_eq!(hosts.value()[0].label.as_deref(), Some("bar"));
        assert_eq!(
            layer.push,
            Some(Block::Replace(PatternSet::excluding(["env", ".git"])))
        );
    }

    #[test]
    fn test_workspace_extends_blocks() {
        let layer = parse(
            LayerRole::Workspace,
            r#"
[[extends.hosts]]
host = "other-host.example.com"
directory = ".remotes/other-workspace"

[extends.push]
exclude = ["build"]

[pull]
exclude = ["logs"]
"#,
        )
        .unwrap();

        assert!(layer.hosts.as_ref().unwrap().is_extend());
        assert!(layer.push.as_ref().unwrap().is_extend());
        assert!(!layer.pull.as_ref().unwrap().is_extend());
        assert!(layer.both.is_none());
    }

    #[test]
    fn test_overwrite_and_extend_same_block_rejected() {
        let err = parse(
            LayerRole::Workspace,
            r#"
[[hosts]]
host = "a.example.com"

[[extends.hosts]]
host = "b.example.com"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("both overwrite and extend"));
    }

    #[test]
    fn test_global_host_directory_rejected() {
        let err = parse(
            LayerRole::Global,
            r#"
[[hosts]]
host = "other-host.example.com"
directory = ".remotes/other-workspace"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot specify directory"));
    }

    #[test]
    fn test_workspace_general_rejected() {
        let err = parse(
            LayerRole::Workspace,
            "[general]\nremote_root = \"my-remotes\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_ignore_layer_restrictions() {
        let err = parse(LayerRole::Ignore, "[[hosts]]\nhost = \"a.example.com\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = parse(LayerRole::Ignore, "[general]\nremote_root = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_ignore_layer_blocks_always_extend() {
        let layer = parse(
            LayerRole::Ignore,
            "[push]\nexclude = [\"a\"]\n\n[extends.pull]\nexclude = [\"b\"]\n",
        )
        .unwrap();
        assert!(layer.push.unwrap().is_extend());
        assert!(layer.pull.unwrap().is_extend());
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let err = parse(
            LayerRole::Global,
            "[[hosts]]\nhost = \"a.example.com\"\nmeow = \"mewo\"\n",
        )
        .unwrap_err();
        match err {
            ConfigError::Parse { message, .. } => assert!(message.contains("meow")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_reports_location() {
        let err = parse(LayerRole::Workspace, "[push\nexclude = 1\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("/root/.remote.toml"));
        assert!(message.contains("line 1"));
    }

    #[test]
    fn test_multiple_defaults_rejected() {
        let err = parse(
            LayerRole::Workspace,
            r#"
[[hosts]]
host = "a.example.com"
default = true

[[hosts]]
host = "b.example.com"
default = true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("can only have one default"));
    }

    #[test]
    fn test_invalid_host_name_rejected() {
        let err = parse(LayerRole::Workspace, "[[hosts]]\nhost = \"bad host!\"\n").unwrap_err();
        assert!(err.to_string().contains("hosts.0"));
    }

    #[test]
    fn test_legacy_vcs_flag_name() {
        let layer = parse(
            LayerRole::Workspace,
            "[pull]\ninclude_vsc_ignore_patterns = true\n",
        )
        .unwrap();
        assert_eq!(
            layer.pull.unwrap().value().include_vcs_ignore_patterns,
            Some(true)
        );
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let layer = ConfigLayer::load(LayerRole::Global, &dir.path().join("defaults.toml")).unwrap();
        assert!(layer.is_none());
    }

    #[test]
    fn test_load_records_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".remote.toml");
        fs::write(&path, "[push]\nexclude = [\"env\"]\n").unwrap();

        let layer = ConfigLayer::load(LayerRole::Workspace, &path).unwrap().unwrap();
        assert_eq!(layer.digest.len(), 64);
        assert_eq!(layer.path, path);
    }
}
