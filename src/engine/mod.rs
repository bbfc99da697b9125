//! The generation workflow engine.
//!
//! Drives a request through documentation acquisition, scoping, planning,
//! code generation and validation, persisting a checkpoint after every
//! stage transition. Retry policy lives here — never in the stages — so
//! each attempt is observable in the durable state trail.

mod codegen;
mod planning;
mod scope;
mod state;

pub use codegen::{parse_artifacts, CodegenStage, REQUIRED_ARTIFACTS};
pub use planning::{
    parse_plan, AuthRequirements, ImplementationPlan, PlannedParameter, PlannedTool, PlanningStage,
};
pub use scope::{derive_scope, ScopeSummary};
pub use state::{FailureKind, Stage, WorkflowFailure, WorkflowState};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::artifacts::ArtifactWriter;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::completion::{CompletionError, CompletionService};
use crate::core::{retry_async, Config, RetryConfig};
use crate::docs::{acquire, AcquisitionError, DocumentSource, NormalizedDoc};
use crate::validate::validate;

/// Errors the engine cannot record inside the workflow state itself.
///
/// Stage-local failures become a `WorkflowFailure` in the returned state;
/// these are infrastructure failures around the state.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// One generation request at the engine boundary.
///
/// `source` is required when `thread_id` is absent (new thread) and
/// ignored on continuations, where the stored documentation is reused.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Existing thread to continue, or `None` to start a new one.
    pub thread_id: Option<String>,

    /// Natural-language instruction driving this run.
    pub message: String,

    /// Documentation source for a new thread.
    pub source: Option<DocumentSource>,
}

impl GenerationRequest {
    /// Request a new thread.
    pub fn new_thread(message: impl Into<String>, source: DocumentSource) -> Self {
        Self { thread_id: None, message: message.into(), source: Some(source) }
    }

    /// Continue an existing thread.
    pub fn continuation(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { thread_id: Some(thread_id.into()), message: message.into(), source: None }
    }
}

/// Cooperative cancellation flag, checked between stages.
///
/// An in-flight completion call is allowed to finish; its result is
/// discarded when cancellation was requested, so the durable state never
/// lands in an ambiguous intermediate condition.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The workflow engine.
///
/// Exclusively owns a thread's [`WorkflowState`] while a run is active;
/// between runs the checkpoint store holds it. A per-thread async lock
/// enforces the single-writer discipline, so interleaved continuation
/// requests for one thread serialize instead of racing.
pub struct WorkflowEngine {
    completion: Arc<dyn CompletionService>,
    checkpoints: Arc<dyn CheckpointStore>,
    artifacts: ArtifactWriter,
    http: reqwest::Client,
    planning: PlanningStage,
    codegen: CodegenStage,
    retry: RetryConfig,
    max_attempts: u32,
    planning_retries: u32,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkflowEngine {
    /// Create an engine from configuration and its collaborators.
    pub fn new(
        config: &Config,
        completion: Arc<dyn CompletionService>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            completion,
            checkpoints,
            artifacts: ArtifactWriter::new(config.storage.artifacts_dir()),
            http: reqwest::Client::new(),
            planning: PlanningStage::new(config.completion.planning_model.clone()),
            codegen: CodegenStage::new(config.completion.codegen_model.clone()),
            retry: config.engine.retry_config(),
            max_attempts: config.engine.max_attempts.max(1),
            planning_retries: config.engine.planning_retries,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process one request to a terminal (or cancelled) state.
    pub async fn submit(&self, request: GenerationRequest) -> Result<WorkflowState, EngineError> {
        self.submit_with_cancel(request, CancelFlag::new()).await
    }

    /// Process one request with cooperative cancellation.
    pub async fn submit_with_cancel(
        &self,
        request: GenerationRequest,
        cancel: CancelFlag,
    ) -> Result<WorkflowState, EngineError> {
        let GenerationRequest { thread_id, message, source } = request;

        match thread_id {
            None => {
                let source = source.ok_or_else(|| {
                    EngineError::InvalidRequest(
                        "a documentation source is required for a new thread".to_string(),
                    )
                })?;

                let mut state = WorkflowState::new(message);
                tracing::info!(thread_id = %state.thread_id, "starting new generation thread");

                let lock = self.thread_lock(&state.thread_id);
                let result = async {
                    let _guard = lock.lock().await;
                    self.checkpoints.save(&state).await?;
                    self.run(&mut state, Some(&source), &cancel).await
                }
                .await;
                self.release_thread_lock(&state.thread_id);
                result?;
                Ok(state)
            }
            Some(id) => {
                let lock = self.thread_lock(&id);
                let result = async {
                    let _guard = lock.lock().await;

                    let Some(mut state) = self.checkpoints.load(&id).await? else {
                        // Unknown thread: nothing durable to mutate, return a
                        // synthetic failed snapshot without persisting it
                        tracing::warn!(thread_id = %id, "continuation for unknown thread");
                        let mut state = WorkflowState::new(message);
                        state.thread_id = id.clone();
                        state.fail(FailureKind::StateCorruption, "unknown thread");
                        return Ok(state);
                    };

                    state.record_message(message);
                    if state.is_terminal() {
                        if state.documentation.is_none() {
                            state.fail(
                                FailureKind::StateCorruption,
                                "cannot continue a thread that never acquired documentation",
                            );
                            self.checkpoints.save(&state).await?;
                            return Ok(state);
                        }
                        tracing::info!(thread_id = %state.thread_id, "continuing terminal thread at planning");
                        state.reenter_planning();
                    }

                    self.checkpoints.save(&state).await?;
                    self.run(&mut state, source.as_ref(), &cancel).await?;
                    Ok(state)
                }
                .await;
                self.release_thread_lock(&id);
                result
            }
        }
    }

    /// Drive the state machine until a terminal stage.
    ///
    /// No stage begins before the previous stage's checkpoint save has
    /// completed, so a crash between stages resumes at the last saved
    /// stage rather than re-running finished work.
    async fn run(
        &self,
        state: &mut WorkflowState,
        source: Option<&DocumentSource>,
        cancel: &CancelFlag,
    ) -> Result<(), EngineError> {
        while !state.stage.is_terminal() {
            if cancel.is_cancelled() {
                state.fail(FailureKind::Cancelled, "run cancelled between stages");
            } else {
                tracing::debug!(thread_id = %state.thread_id, stage = %state.stage, "executing stage");
                self.step(state, source, cancel).await;
            }
            state.touch();
            self.checkpoints.save(state).await?;
        }
        Ok(())
    }

    /// Execute the current stage and set the next one.
    ///
    /// Completion calls that were in flight when cancellation was
    /// requested are allowed to finish, but their result is discarded.
    async fn step(
        &self,
        state: &mut WorkflowState,
        source: Option<&DocumentSource>,
        cancel: &CancelFlag,
    ) {
        match state.stage {
            Stage::Received => {
                state.stage = Stage::DocProcessing;
            }

            Stage::DocProcessing => {
                // Documentation is immutable once acquired for a thread
                if state.documentation.is_some() {
                    state.stage = Stage::Scoping;
                    return;
                }
                let Some(source) = source else {
                    state.fail(
                        FailureKind::StateCorruption,
                        "no documentation source available for acquisition",
                    );
                    return;
                };
                match acquire(&self.http, source).await {
                    Ok(doc) => {
                        tracing::info!(
                            thread_id = %state.thread_id,
                            endpoints = doc.endpoint_count(),
                            "documentation acquired"
                        );
                        state.documentation = Some(doc);
                        state.stage = Stage::Scoping;
                    }
                    Err(e) => state.fail(acquisition_failure_kind(&e), e.to_string()),
                }
            }

            Stage::Scoping => match &state.documentation {
                Some(doc) => {
                    state.scope = Some(derive_scope(doc, &state.latest_user_message));
                    state.stage = Stage::Planning;
                }
                None => {
                    state.fail(FailureKind::StateCorruption, "scoping without documentation");
                }
            },

            Stage::Planning => {
                let (Some(doc), Some(scope)) = (state.documentation.clone(), state.scope.clone())
                else {
                    state.fail(FailureKind::StateCorruption, "planning without scope");
                    return;
                };
                let planned = self.plan_with_retry(&doc, &scope, state).await;
                if cancel.is_cancelled() {
                    state.fail(
                        FailureKind::Cancelled,
                        "run cancelled during planning; result discarded",
                    );
                    return;
                }
                match planned {
                    Ok(plan) => {
                        state.record_result(format!(
                            "planned service '{}' with {} tool(s)",
                            plan.service_name,
                            plan.tools.len()
                        ));
                        state.implementation_plan = Some(plan);
                        state.stage = Stage::CodeGeneration;
                    }
                    Err(failure) => state.fail(failure.kind, failure.message),
                }
            }

            Stage::CodeGeneration => {
                let Some(plan) = state.implementation_plan.clone() else {
                    state.fail(FailureKind::StateCorruption, "code generation without a plan");
                    return;
                };
                // Counts generation cycles consumed for the current plan
                state.attempt_count += 1;
                let message = state.latest_user_message.clone();
                let defects =
                    state.validation_result.as_ref().map(|r| r.defects.clone()).unwrap_or_default();

                let result = retry_async(
                    &self.retry,
                    |e: &CompletionError| e.is_retryable(),
                    || self.codegen.run(self.completion.as_ref(), &plan, &message, &defects),
                )
                .await
                .into_result();

                if cancel.is_cancelled() {
                    state.fail(
                        FailureKind::Cancelled,
                        "run cancelled during code generation; result discarded",
                    );
                    return;
                }

                match result {
                    Ok(artifacts) => {
                        state.record_result(format!("generated {} artifact(s)", artifacts.len()));
                        state.generated_artifacts = artifacts;
                        state.stage = Stage::Validating;
                    }
                    Err(e) => state.fail(completion_failure_kind(&e), e.to_string()),
                }
            }

            Stage::Validating => {
                let Some(plan) = &state.implementation_plan else {
                    state.fail(FailureKind::StateCorruption, "validating without a plan");
                    return;
                };
                let report = validate(&state.generated_artifacts, plan);

                state.record_result(report.summary());
                if report.passed {
                    state.validation_result = Some(report);
                    match self.artifacts.write_all(&state.thread_id, &state.generated_artifacts) {
                        Ok(_) => state.stage = Stage::Stored,
                        Err(e) => state.fail(FailureKind::StorageFailed, e.to_string()),
                    }
                } else if state.attempt_count >= self.max_attempts {
                    let summary = report.summary();
                    state.validation_result = Some(report);
                    state.fail(
                        FailureKind::ValidationExhausted,
                        format!(
                            "{} code generation attempt(s) exhausted; {summary}",
                            state.attempt_count
                        ),
                    );
                } else {
                    tracing::warn!(
                        thread_id = %state.thread_id,
                        attempt = state.attempt_count,
                        defects = report.defects.len(),
                        "validation failed, regenerating"
                    );
                    state.validation_result = Some(report);
                    // Sole backward edge in the machine
                    state.stage = Stage::CodeGeneration;
                }
            }

            Stage::Stored | Stage::Failed => {}
        }
    }

    /// Planning with its own malformed-response bound, distinct from the
    /// code-generation attempt counter.
    async fn plan_with_retry(
        &self,
        doc: &NormalizedDoc,
        scope: &ScopeSummary,
        state: &WorkflowState,
    ) -> Result<ImplementationPlan, WorkflowFailure> {
        let mut malformed = 0u32;

        loop {
            let result = retry_async(
                &self.retry,
                |e: &CompletionError| e.is_retryable(),
                || {
                    self.planning.run(
                        self.completion.as_ref(),
                        doc,
                        scope,
                        &state.message_history,
                        &state.latest_user_message,
                    )
                },
            )
            .await
            .into_result();

            match result {
                Ok(plan) => return Ok(plan),
                Err(CompletionError::MalformedResponse(detail)) => {
                    malformed += 1;
                    if malformed > self.planning_retries {
                        return Err(WorkflowFailure {
                            kind: FailureKind::PlanningExhausted,
                            message: format!(
                                "planning produced malformed output {malformed} time(s): {detail}"
                            ),
                        });
                    }
                    tracing::warn!(attempt = malformed, detail = %detail, "malformed plan, retrying planning");
                }
                Err(e @ CompletionError::Unauthenticated(_)) => {
                    return Err(WorkflowFailure {
                        kind: FailureKind::Unauthenticated,
                        message: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(WorkflowFailure {
                        kind: FailureKind::CompletionFailed,
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    /// Per-thread lock handle.
    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.lock().entry(thread_id.to_string()).or_default().clone()
    }

    /// Drop the lock entry once no other run holds a handle to it.
    ///
    /// Handles are only cloned while the map mutex is held, so the strong
    /// count is stable here: 2 means the map and our own handle.
    fn release_thread_lock(&self, thread_id: &str) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get(thread_id) {
            if Arc::strong_count(entry) <= 2 {
                locks.remove(thread_id);
            }
        }
    }
}

fn acquisition_failure_kind(error: &AcquisitionError) -> FailureKind {
    match error {
        AcquisitionError::Unreachable(_) => FailureKind::Unreachable,
        AcquisitionError::UnsupportedFormat(_) => FailureKind::UnsupportedFormat,
        AcquisitionError::Empty => FailureKind::EmptyDocumentation,
    }
}

fn completion_failure_kind(error: &CompletionError) -> FailureKind {
    match error {
        CompletionError::Unauthenticated(_) => FailureKind::Unauthenticated,
        _ => FailureKind::CompletionFailed,
    }
}
