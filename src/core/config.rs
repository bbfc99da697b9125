//! Configuration management for mcpforge.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::retry::RetryConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow engine settings
    pub engine: EngineConfig,

    /// Completion service settings
    pub completion: CompletionConfig,

    /// Checkpoint and artifact storage settings
    pub storage: StorageConfig,
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum code-generation/validation cycles per planning pass.
    pub max_attempts: u32,

    /// How many malformed planning responses to tolerate before failing.
    /// Distinct from `max_attempts`, which governs code generation.
    pub planning_retries: u32,

    /// Retries for transient completion-service errors (rate limit,
    /// timeout, transport) per stage invocation.
    pub completion_retries: u32,

    /// Initial backoff delay between completion retries, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay between completion retries, in milliseconds.
    pub max_backoff_ms: u64,
}

/// Completion service settings.
///
/// The API key is never stored in the config file; it is read from the
/// `OPENROUTER_API_KEY` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of the OpenAI-compatible completion API.
    pub base_url: String,

    /// Model used for the planning stage.
    pub planning_model: String,

    /// Model used for the code generation stage.
    pub codegen_model: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Storage locations for checkpoints and generated artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for workflow checkpoints. Defaults to the platform data dir.
    pub checkpoint_dir: Option<PathBuf>,

    /// Directory for generated artifacts. Defaults to the platform data dir.
    pub artifacts_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.mcpforge.toml` in current directory
    /// 2. `~/.config/mcpforge/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        // Try local config first
        let local_config = PathBuf::from(".mcpforge.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        // Try global config
        if let Some(config_dir) = dirs::config_dir() {
            let global_config = config_dir.join("mcpforge").join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        // Return defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the data directory path (for checkpoints and artifacts).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("mcpforge"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            completion: CompletionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            planning_retries: 2,
            completion_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            planning_model: "deepseek/deepseek-r1-zero:free".to_string(),
            codegen_model: "qwen/qwen2.5-72b-instruct:free".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    /// Retry policy for completion-service calls derived from this config.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.completion_retries,
            initial_delay: std::time::Duration::from_millis(self.initial_backoff_ms),
            max_delay: std::time::Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl StorageConfig {
    /// Resolve the checkpoint directory, falling back to the data dir.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir
            .clone()
            .or_else(|| Config::data_dir().map(|d| d.join("checkpoints")))
            .unwrap_or_else(|| PathBuf::from(".mcpforge/checkpoints"))
    }

    /// Resolve the artifacts directory, falling back to the data dir.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts_dir
            .clone()
            .or_else(|| Config::data_dir().map(|d| d.join("artifacts")))
            .unwrap_or_else(|| PathBuf::from(".mcpforge/artifacts"))
    }
}
