#![forbid(unsafe_code)]

use std::path::PathBuf;

use crate::UnixTimeMs;

/// A tone file written to the scratch directory for one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub file_path: PathBuf,
    pub created_at: UnixTimeMs,
}

impl GeneratedArtifact {
    pub fn new(file_path: PathBuf, created_at: UnixTimeMs) -> Self {
        Self {
            file_path,
            created_at,
        }
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
