#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

/// Read-only directory of shipped `.wav` assets and their previews.
#[derive(Debug, Clone)]
pub struct PrebuiltAssetDir {
    root: PathBuf,
}

impl PrebuiltAssetDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_readable(&self) -> bool {
        self.root.read_dir().is_ok()
    }

    /// Resolves a caller-supplied relative name to an existing file that,
    /// after following `..` and symlinks, is still under the root.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty() || filename.contains('\0') {
            return None;
        }
        let root = self.root.canonicalize().ok()?;
        let candidate = root.join(filename).canonicalize().ok()?;
        if candidate == root || !candidate.starts_with(&root) || !candidate.is_file() {
            tracing::debug!(%filename, "asset request rejected");
            return None;
        }
        Some(candidate)
    }
}
