//! Durable workflow state.
//!
//! [`WorkflowState`] is the unit of durable progress: created on the first
//! request for a thread, mutated exclusively by the engine as stages
//! complete, and held by the checkpoint store between runs.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::planning::ImplementationPlan;
use super::scope::ScopeSummary;
use crate::completion::ChatMessage;
use crate::docs::NormalizedDoc;
use crate::validate::ValidationReport;

/// Position in the workflow state machine.
///
/// Transitions only move forward (or to `Failed`); the sole backward edge
/// is `Validating -> CodeGeneration` in the bounded correction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    DocProcessing,
    Scoping,
    Planning,
    CodeGeneration,
    Validating,
    Stored,
    Failed,
}

impl Stage {
    /// Whether this stage is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stored | Self::Failed)
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::DocProcessing => "doc_processing",
            Self::Scoping => "scoping",
            Self::Planning => "planning",
            Self::CodeGeneration => "code_generation",
            Self::Validating => "validating",
            Self::Stored => "stored",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a workflow reached the `Failed` terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Documentation URL could not be fetched.
    Unreachable,
    /// Documentation format was not recognized.
    UnsupportedFormat,
    /// Documentation carried no usable content.
    EmptyDocumentation,
    /// Planning produced malformed output beyond the retry bound.
    PlanningExhausted,
    /// Completion service failed unrecoverably.
    CompletionFailed,
    /// Completion provider rejected credentials.
    Unauthenticated,
    /// Validation kept failing through all code-generation attempts.
    ValidationExhausted,
    /// Generated artifacts could not be written to storage.
    StorageFailed,
    /// State was malformed or the thread is unknown.
    StateCorruption,
    /// The run was cancelled between stages.
    Cancelled,
}

/// Terminal failure details carried in the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for WorkflowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Durable state of one generation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Opaque identifier, stable across resumptions.
    pub thread_id: String,

    /// Current position in the state machine.
    pub stage: Stage,

    /// Most recent natural-language instruction.
    pub latest_user_message: String,

    /// Prior instructions and stage results, append-only; replayed to the
    /// completion service as context in insertion order.
    pub message_history: Vec<ChatMessage>,

    /// Normalized documentation; immutable once acquisition succeeds.
    pub documentation: Option<NormalizedDoc>,

    /// What will be built, derived once documentation is available.
    pub scope: Option<ScopeSummary>,

    /// Structured output of the planning stage.
    pub implementation_plan: Option<ImplementationPlan>,

    /// Generated files keyed by relative path.
    pub generated_artifacts: BTreeMap<String, String>,

    /// Result of the last validator run.
    pub validation_result: Option<ValidationReport>,

    /// Code-generation cycles consumed for the current plan.
    pub attempt_count: u32,

    /// Last fatal error, if any.
    pub error: Option<WorkflowFailure>,

    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,

    /// Last mutation timestamp (Unix epoch seconds).
    pub updated_at: u64,
}

impl WorkflowState {
    /// Create state for a new thread in the `Received` stage.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let now = current_timestamp();
        Self {
            thread_id: uuid::Uuid::new_v4().to_string(),
            stage: Stage::Received,
            message_history: vec![ChatMessage::user(message.clone())],
            latest_user_message: message,
            documentation: None,
            scope: None,
            implementation_plan: None,
            generated_artifacts: BTreeMap::new(),
            validation_result: None,
            attempt_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a new user instruction and make it the latest message.
    pub fn record_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.message_history.push(ChatMessage::user(message.clone()));
        self.latest_user_message = message;
        self.touch();
    }

    /// Append an assistant result to the history.
    pub fn record_result(&mut self, content: impl Into<String>) {
        self.message_history.push(ChatMessage::assistant(content));
    }

    /// Transition to `Failed` with a recorded cause.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) {
        let failure = WorkflowFailure { kind, message: message.into() };
        tracing::warn!(thread_id = %self.thread_id, stage = %self.stage, error = %failure, "workflow failed");
        self.error = Some(failure);
        self.stage = Stage::Failed;
        self.touch();
    }

    /// Re-enter the machine at `Planning` for a continuation request,
    /// reusing previously acquired documentation.
    pub fn reenter_planning(&mut self) {
        self.stage = Stage::Planning;
        self.attempt_count = 0;
        self.validation_result = None;
        self.error = None;
        self.touch();
    }

    /// Whether the state is in a terminal stage.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Update the mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }
}

/// Get the current Unix timestamp in seconds.
fn current_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
