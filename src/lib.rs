//! # mcpforge
//!
//! Generation workflow engine - turn API documentation into a working MCP
//! integration module through a sequenced, checkpointed pipeline of
//! language-model calls.
//!
//! The pipeline runs documentation acquisition, scoping, planning, code
//! generation and validation as an explicit state machine. Every stage
//! transition is checkpointed so interrupted runs resume where they left
//! off, and failed or completed threads can be continued with a follow-up
//! message that reuses the already-acquired documentation.
//!
//! ## Quick Start
//!
//! ```bash
//! # Install
//! cargo install mcpforge
//!
//! # Generate from a documentation URL
//! mcpforge generate --doc-url https://example.com/openapi.json \
//!     "expose the weather endpoints as MCP tools"
//!
//! # Refine an earlier run
//! mcpforge continue <thread-id> "add the forecast endpoint too"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::return_self_not_must_use)]

pub mod artifacts;
pub mod checkpoint;
pub mod completion;
pub mod core;
pub mod docs;
pub mod engine;
pub mod validate;

pub use artifacts::ArtifactWriter;
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use completion::{CompletionError, CompletionRequest, CompletionService, OpenRouterProvider};
pub use core::Config;
pub use docs::{DocumentSource, NormalizedDoc};
pub use engine::{
    CancelFlag, FailureKind, GenerationRequest, Stage, WorkflowEngine, WorkflowState,
};
pub use validate::{validate, ValidationReport};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name used for config and data directories.
pub const APP_NAME: &str = "mcpforge";
