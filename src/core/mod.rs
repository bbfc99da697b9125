//! Core types and functionality for mcpforge.
//!
//! This module contains configuration loading and the retry policy used
//! for completion-service calls.

mod config;
mod retry;

pub use config::{CompletionConfig, Config, EngineConfig, StorageConfig};
pub use retry::{retry_async, RetryConfig, RetryResult};
