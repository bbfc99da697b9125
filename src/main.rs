//! mcpforge - generate MCP integration modules from API documentation.
//!
//! Drives the workflow engine from the command line: start a generation
//! thread from a documentation URL or file, continue an earlier thread
//! with a follow-up message, or inspect a thread's stored state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcpforge::checkpoint::{CheckpointStore, FileCheckpointStore};
use mcpforge::completion::OpenRouterProvider;
use mcpforge::engine::{GenerationRequest, Stage, WorkflowEngine, WorkflowState};
use mcpforge::{Config, DocumentSource};

/// Generate MCP integration modules from API documentation
#[derive(Parser)]
#[command(name = "mcpforge")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new generation thread
    Generate {
        /// Natural-language request describing the integration to build
        message: String,

        /// URL of the API documentation to acquire
        #[arg(long, conflicts_with = "doc_file")]
        doc_url: Option<String>,

        /// Local file containing the API documentation
        #[arg(long)]
        doc_file: Option<PathBuf>,
    },

    /// Continue an existing thread with a follow-up message
    Continue {
        /// Thread to continue
        thread_id: String,

        /// Follow-up request
        message: String,
    },

    /// Show the stored state of a thread
    Status {
        /// Thread to inspect
        thread_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    let config = Config::load()?;

    match cli.command {
        Commands::Generate { message, doc_url, doc_file } => {
            let source = match (doc_url, doc_file) {
                (Some(url), None) => DocumentSource::Url(url),
                (None, Some(path)) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let content_type = content_type_hint(&path);
                    DocumentSource::Inline { text, content_type }
                }
                _ => anyhow::bail!("provide exactly one of --doc-url or --doc-file"),
            };

            let engine = build_engine(&config)?;
            let state = engine
                .submit(GenerationRequest { thread_id: None, message, source: Some(source) })
                .await?;
            print_state(&state, &config);
        }

        Commands::Continue { thread_id, message } => {
            let engine = build_engine(&config)?;
            let state = engine
                .submit(GenerationRequest { thread_id: Some(thread_id), message, source: None })
                .await?;
            print_state(&state, &config);
        }

        Commands::Status { thread_id } => {
            let checkpoints = FileCheckpointStore::new(config.storage.checkpoint_dir())?;
            match checkpoints.load(&thread_id).await? {
                Some(state) => print_state(&state, &config),
                None => anyhow::bail!("no thread found with id {thread_id}"),
            }
        }
    }

    Ok(())
}

fn build_engine(config: &Config) -> Result<WorkflowEngine> {
    let completion = OpenRouterProvider::from_config(&config.completion)?;
    let checkpoints = FileCheckpointStore::new(config.storage.checkpoint_dir())?;
    Ok(WorkflowEngine::new(config, Arc::new(completion), Arc::new(checkpoints)))
}

fn content_type_hint(path: &std::path::Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "json" => Some("application/json".to_string()),
        "yaml" | "yml" => Some("application/yaml".to_string()),
        "md" | "markdown" => Some("text/markdown".to_string()),
        _ => None,
    }
}

fn print_state(state: &WorkflowState, config: &Config) {
    println!("thread:   {}", state.thread_id);
    println!("stage:    {}", state.stage);
    println!("attempts: {}", state.attempt_count);

    if let Some(scope) = &state.scope {
        println!("service:  {}", scope.service_name);
    }

    match state.stage {
        Stage::Stored => {
            let dir = config.storage.artifacts_dir().join(&state.thread_id);
            println!("artifacts written to {}", dir.display());
            for path in state.generated_artifacts.keys() {
                println!("  {path}");
            }
        }
        Stage::Failed => {
            if let Some(error) = &state.error {
                println!("error:    {error}");
            }
            if let Some(report) = &state.validation_result {
                for defect in &report.defects {
                    println!("  defect: {defect}");
                }
            }
        }
        _ => {}
    }
}
