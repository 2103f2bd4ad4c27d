//! Sources of version-control ignore patterns.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::PatternError;

/// Supplies the ordered ignore patterns of a workspace's VCS ignore file.
pub trait VcsPatterns {
    fn patterns(&self) -> Result<Vec<String>, PatternError>;
}

/// An ignore file on disk (`.gitignore` style). A missing file yields no
/// patterns.
#[derive(Debug, Clone)]
pub struct IgnoreFile {
    path: PathBuf,
}

impl IgnoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ignore file named `file_name` at the root of a workspace.
    pub fn in_root(root: &Path, file_name: &str) -> Self {
        Self::new(root.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VcsPatterns for IgnoreFile {
    fn patterns(&self) -> Result<Vec<String>, PatternError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_ignore_lines(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PatternError::IgnoreFile {
                path: self.path.display().to_string(),
                source: e,
            }),
        }
    }
}

/// No VCS integration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcsPatterns;

impl VcsPatterns for NoVcsPatterns {
    fn patterns(&self) -> Result<Vec<String>, PatternError> {
        Ok(Vec::new())
    }
}

impl VcsPatterns for Vec<String> {
    fn patterns(&self) -> Result<Vec<String>, PatternError> {
        Ok(self.clone())
    }
}

/// Extract patterns from ignore-file contents, skipping blanks and comments.
pub fn parse_ignore_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
