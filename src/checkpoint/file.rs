//! File-backed checkpoint store.
//!
//! One pretty-printed JSON file per thread under a checkpoint directory.
//! Saves write to a temp file and rename into place, so a concurrent load
//! never observes a partially written snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CheckpointError, CheckpointStore};
use crate::engine::WorkflowState;

/// Checkpoint store persisting one JSON file per thread.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        // Thread ids are uuids; anything else could escape the directory
        let valid = !thread_id.is_empty()
            && thread_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self.dir.join(format!("{thread_id}.json")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        let path = self.path_for(thread_id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        let path = self.path_for(&state.thread_id)?;
        let content = serde_json::to_vec_pretty(state)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
