//! Durable workflow checkpoints.
//!
//! Maps a thread identifier to the latest [`WorkflowState`] snapshot so a
//! generation session can resume across invocations. Saves are
//! last-writer-wins per thread; the engine's per-thread locking guarantees
//! a single writer, so stores need no optimistic-concurrency checks.

mod file;

pub use file::FileCheckpointStore;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::engine::WorkflowState;

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),
}

/// Trait for checkpoint stores.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest snapshot for a thread, if one exists.
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError>;

    /// Persist a snapshot. A concurrent `load` for the same thread must
    /// observe either the previous snapshot or this one, never a partial
    /// write.
    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError>;
}

/// In-memory checkpoint store, used in tests and one-shot runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: RwLock<HashMap<String, WorkflowState>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<WorkflowState>, CheckpointError> {
        Ok(self.states.read().get(thread_id).cloned())
    }

    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        self.states.write().insert(state.thread_id.clone(), state.clone());
        Ok(())
    }
}
