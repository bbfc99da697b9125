//! Artifact persistence.
//!
//! Writes validated artifact sets to a per-thread directory. Paths are
//! relative and sanitized; anything absolute or containing `..` is
//! rejected before a single byte is written.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Errors from artifact persistence.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsafe artifact path: {0}")]
    UnsafePath(String),
}

/// Writes generated artifacts under a root directory, one subdirectory
/// per thread.
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    /// Create a writer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write all artifacts for a thread, returning the thread directory.
    ///
    /// The whole set is checked before anything is written, so a bad path
    /// never leaves a partial artifact directory behind.
    pub fn write_all(
        &self,
        thread_id: &str,
        artifacts: &BTreeMap<String, String>,
    ) -> Result<PathBuf, ArtifactError> {
        for path in artifacts.keys() {
            check_relative(path)?;
        }

        let dir = self.root.join(thread_id);
        std::fs::create_dir_all(&dir)?;

        for (path, content) in artifacts {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, content)?;
        }

        tracing::info!(thread_id = %thread_id, count = artifacts.len(), dir = %dir.display(), "artifacts written");
        Ok(dir)
    }
}

fn check_relative(path: &str) -> Result<(), ArtifactError> {
    let p = Path::new(path);
    let safe = !path.is_empty()
        && !path.contains('\\')
        && p.components().all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(ArtifactError::UnsafePath(path.to_string()))
    }
}
