//! End-to-end workflow scenarios.
//!
//! Drives the engine with a scripted completion service and an in-memory
//! checkpoint store, so every path through the state machine is exercised
//! without the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use mcpforge::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use mcpforge::completion::{CompletionError, CompletionRequest, CompletionService};
use mcpforge::engine::{
    CancelFlag, FailureKind, GenerationRequest, Stage, WorkflowEngine,
};
use mcpforge::{Config, DocumentSource};

/// Completion service that replays a scripted sequence of responses.
struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    calls: AtomicUsize,
}

impl ScriptedCompletion {
    fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self { responses: Mutex::new(responses.into()), calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

const OPENAPI_DOC: &str = r#"{
    "openapi": "3.0.0",
    "info": {"title": "Petstore", "description": "A pet store API."},
    "paths": {
        "/pets": {
            "get": {
                "summary": "List all pets",
                "parameters": [
                    {"name": "limit", "in": "query", "description": "Page size"}
                ],
                "responses": {"200": {"description": "A list of pets"}}
            }
        }
    }
}"#;

const MARKDOWN_DOC: &str = "# Petstore\n\nA pet store API.\n\n## Pets\n\nGET /pets\n\nList all pets.\n";

fn plan_response() -> Result<String, CompletionError> {
    Ok(r#"{
        "service_name": "petstore",
        "description": "Pet store MCP server",
        "tools": [
            {
                "name": "list_pets",
                "description": "List all pets",
                "parameters": [{"name": "limit", "type": "integer", "description": "Page size", "required": false}],
                "returns": "A list of pets",
                "endpoint": "/pets",
                "method": "GET"
            }
        ],
        "auth": {"type": "none", "credentials": []},
        "dependencies": ["fastmcp", "httpx"]
    }"#
    .to_string())
}

fn good_artifacts_response() -> Result<String, CompletionError> {
    Ok(r##"{
        "files": {
            "main.py": "from fastmcp import FastMCP\nimport httpx\n\nmcp = FastMCP('petstore')\n\n@mcp.tool()\nasync def list_pets(limit: int = 10) -> str:\n    async with httpx.AsyncClient() as client:\n        response = await client.get('https://api.example.com/pets', params={'limit': limit})\n        return response.text\n\nif __name__ == '__main__':\n    mcp.run()\n",
            "requirements.txt": "fastmcp>=2.0\nhttpx>=0.27\n",
            ".env.example": "# no credentials required\n",
            "README.md": "# petstore MCP server\n\nRun `python main.py`.\n"
        }
    }"##
    .to_string())
}

/// Parses as an artifact set but fails validation: README.md is missing.
fn defective_artifacts_response() -> Result<String, CompletionError> {
    Ok(r#"{
        "files": {
            "main.py": "def list_pets():\n    pass\n",
            "requirements.txt": "fastmcp\nhttpx\n",
            ".env.example": "\n"
        }
    }"#
    .to_string())
}

fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.engine.initial_backoff_ms = 1;
    config.engine.max_backoff_ms = 5;
    config.storage.checkpoint_dir = Some(temp.path().join("checkpoints"));
    config.storage.artifacts_dir = Some(temp.path().join("artifacts"));
    config
}

fn engine_with(
    temp: &TempDir,
    responses: Vec<Result<String, CompletionError>>,
) -> (WorkflowEngine, Arc<ScriptedCompletion>, Arc<MemoryCheckpointStore>) {
    let config = test_config(temp);
    let completion = Arc::new(ScriptedCompletion::new(responses));
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(&config, completion.clone(), checkpoints.clone());
    (engine, completion, checkpoints)
}

fn inline_openapi() -> DocumentSource {
    DocumentSource::Inline {
        text: OPENAPI_DOC.to_string(),
        content_type: Some("application/json".to_string()),
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_single_endpoint_generation_succeeds() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, checkpoints) =
        engine_with(&temp, vec![plan_response(), good_artifacts_response()]);

    let state = engine
        .submit(GenerationRequest::new_thread("expose the pets endpoint", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Stored);
    assert_eq!(state.attempt_count, 1);
    assert!(state.error.is_none());
    assert_eq!(completion.calls(), 2);

    // Generated module references the planned tool
    assert!(state.generated_artifacts["main.py"].contains("list_pets"));
    assert!(state.generated_artifacts.contains_key("README.md"));

    // Artifacts landed on disk under the thread id
    let written = temp.path().join("artifacts").join(&state.thread_id).join("main.py");
    assert!(written.exists());

    // Terminal state is checkpointed
    let stored = checkpoints.load(&state.thread_id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Stored);
    assert_eq!(stored.generated_artifacts, state.generated_artifacts);
}

#[tokio::test]
async fn test_documentation_is_normalized_before_scoping() {
    let temp = TempDir::new().unwrap();
    let (engine, _, _) = engine_with(&temp, vec![plan_response(), good_artifacts_response()]);

    let state = engine
        .submit(GenerationRequest::new_thread("pets please", inline_openapi()))
        .await
        .unwrap();

    let doc = state.documentation.as_ref().unwrap();
    assert_eq!(doc.title, "Petstore");
    let endpoints: Vec<_> = doc.endpoints().collect();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].method, "GET");
    assert_eq!(endpoints[0].path, "/pets");

    let scope = state.scope.as_ref().unwrap();
    assert_eq!(scope.endpoint_count, 1);
    assert!(scope.capabilities.contains(&"GET /pets".to_string()));
}

#[tokio::test]
async fn test_markdown_and_openapi_yield_same_endpoints() {
    let temp = TempDir::new().unwrap();

    let (engine, _, _) = engine_with(&temp, vec![plan_response(), good_artifacts_response()]);
    let from_json = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    let (engine, _, _) = engine_with(&temp, vec![plan_response(), good_artifacts_response()]);
    let from_md = engine
        .submit(GenerationRequest::new_thread("pets", DocumentSource::inline(MARKDOWN_DOC)))
        .await
        .unwrap();

    let json_endpoints: Vec<_> = from_json
        .documentation
        .as_ref()
        .unwrap()
        .endpoints()
        .map(|e| (e.method.clone(), e.path.clone()))
        .collect();
    let md_endpoints: Vec<_> = from_md
        .documentation
        .as_ref()
        .unwrap()
        .endpoints()
        .map(|e| (e.method.clone(), e.path.clone()))
        .collect();
    assert_eq!(json_endpoints, md_endpoints);
}

#[tokio::test]
async fn test_stage_results_are_recorded_in_history() {
    let temp = TempDir::new().unwrap();
    let (engine, _, _) = engine_with(
        &temp,
        vec![plan_response(), defective_artifacts_response(), good_artifacts_response()],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();
    assert_eq!(state.stage, Stage::Stored);

    let results: Vec<_> = state
        .message_history
        .iter()
        .filter(|m| m.role == "assistant")
        .map(|m| m.content.as_str())
        .collect();
    assert!(results.iter().any(|c| c.contains("planned service")));
    assert!(results.iter().any(|c| c.contains("artifact(s)")));
    assert!(results.iter().any(|c| c.contains("validation failed")));
    assert!(results.iter().any(|c| c.contains("validation passed")));
}

// ============================================================================
// Acquisition failures
// ============================================================================

#[tokio::test]
async fn test_unreachable_documentation_fails_without_completion_calls() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(&temp, vec![]);

    let source = DocumentSource::Url("http://127.0.0.1:1/docs".to_string());
    let state = engine
        .submit(GenerationRequest::new_thread("pets", source))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::Unreachable);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn test_empty_documentation_fails() {
    let temp = TempDir::new().unwrap();
    let (engine, _, _) = engine_with(&temp, vec![]);

    let state = engine
        .submit(GenerationRequest::new_thread("pets", DocumentSource::inline("   \n  ")))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::EmptyDocumentation);
}

// ============================================================================
// Regeneration loop
// ============================================================================

#[tokio::test]
async fn test_validation_failure_regenerates_until_pass() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(
        &temp,
        vec![
            plan_response(),
            defective_artifacts_response(),
            defective_artifacts_response(),
            good_artifacts_response(),
        ],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Stored);
    assert_eq!(state.attempt_count, 3);
    assert_eq!(completion.calls(), 4);
    assert!(state.validation_result.as_ref().unwrap().passed);
}

#[tokio::test]
async fn test_validation_exhaustion_fails_with_defects_retained() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(
        &temp,
        vec![
            plan_response(),
            defective_artifacts_response(),
            defective_artifacts_response(),
            defective_artifacts_response(),
        ],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::ValidationExhausted);
    assert_eq!(state.attempt_count, 3);
    assert_eq!(completion.calls(), 4);

    // Last validator report survives for inspection
    let report = state.validation_result.as_ref().unwrap();
    assert!(!report.passed);
    assert!(!report.defects.is_empty());

    // Nothing was written for a failed thread
    assert!(!temp.path().join("artifacts").join(&state.thread_id).exists());
}

// ============================================================================
// Planning failures
// ============================================================================

#[tokio::test]
async fn test_malformed_plans_exhaust_planning_retries() {
    let temp = TempDir::new().unwrap();
    // planning_retries defaults to 2, so the third malformed reply is fatal
    let (engine, completion, _) = engine_with(
        &temp,
        vec![
            Ok("I cannot produce JSON today.".to_string()),
            Ok("{\"service_name\": \"\", \"tools\": []}".to_string()),
            Ok("still not a plan".to_string()),
        ],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::PlanningExhausted);
    assert_eq!(completion.calls(), 3);
}

#[tokio::test]
async fn test_transient_completion_errors_are_retried() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(
        &temp,
        vec![
            Err(CompletionError::RateLimited),
            Err(CompletionError::Timeout),
            plan_response(),
            good_artifacts_response(),
        ],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Stored);
    assert_eq!(completion.calls(), 4);
}

#[tokio::test]
async fn test_unauthenticated_fails_without_retry() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(
        &temp,
        vec![Err(CompletionError::Unauthenticated("invalid key".to_string()))],
    );

    let state = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::Unauthenticated);
    assert_eq!(completion.calls(), 1);
}

// ============================================================================
// Continuation
// ============================================================================

#[tokio::test]
async fn test_continuation_reenters_planning_with_stored_documentation() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let completion = Arc::new(ScriptedCompletion::new(vec![
        plan_response(),
        good_artifacts_response(),
        plan_response(),
        good_artifacts_response(),
    ]));
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(&config, completion.clone(), checkpoints.clone());

    let first = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();
    assert_eq!(first.stage, Stage::Stored);

    let second = engine
        .submit(GenerationRequest::continuation(first.thread_id.clone(), "add error handling"))
        .await
        .unwrap();

    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(second.stage, Stage::Stored);
    // Documentation is reused, never re-acquired
    assert_eq!(second.documentation, first.documentation);
    // Attempt counter was reset for the new planning pass
    assert_eq!(second.attempt_count, 1);
    // Conversation history accumulated across both runs
    assert!(second.message_history.len() > first.message_history.len());
    assert_eq!(second.latest_user_message, "add error handling");
    assert_eq!(completion.calls(), 4);
}

#[tokio::test]
async fn test_continuation_after_failure_retries_from_planning() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let completion = Arc::new(ScriptedCompletion::new(vec![
        Ok("not a plan".to_string()),
        Ok("not a plan".to_string()),
        Ok("not a plan".to_string()),
        plan_response(),
        good_artifacts_response(),
    ]));
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(&config, completion.clone(), checkpoints.clone());

    let failed = engine
        .submit(GenerationRequest::new_thread("pets", inline_openapi()))
        .await
        .unwrap();
    assert_eq!(failed.stage, Stage::Failed);
    assert_eq!(failed.error.as_ref().unwrap().kind, FailureKind::PlanningExhausted);

    let recovered = engine
        .submit(GenerationRequest::continuation(failed.thread_id.clone(), "try again"))
        .await
        .unwrap();

    assert_eq!(recovered.stage, Stage::Stored);
    assert!(recovered.error.is_none());
}

#[tokio::test]
async fn test_unknown_thread_continuation_is_state_corruption() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, checkpoints) = engine_with(&temp, vec![]);

    let state = engine
        .submit(GenerationRequest::continuation("no-such-thread", "hello"))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::StateCorruption);
    assert_eq!(completion.calls(), 0);
    // The synthetic failure is not persisted
    assert!(checkpoints.load("no-such-thread").await.unwrap().is_none());
}

// ============================================================================
// Cancellation and checkpointing
// ============================================================================

/// Completion service that requests cancellation while its call is in
/// flight, then answers normally.
struct CancellingCompletion {
    cancel: CancelFlag,
    inner: ScriptedCompletion,
}

#[async_trait]
impl CompletionService for CancellingCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.cancel.cancel();
        self.inner.complete(request).await
    }

    fn name(&self) -> &str {
        "cancelling"
    }
}

#[tokio::test]
async fn test_result_arriving_after_cancellation_is_discarded() {
    let temp = TempDir::new().unwrap();
    let config = test_config(&temp);
    let cancel = CancelFlag::new();
    let completion = Arc::new(CancellingCompletion {
        cancel: cancel.clone(),
        inner: ScriptedCompletion::new(vec![plan_response()]),
    });
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(&config, completion.clone(), checkpoints.clone());

    let state = engine
        .submit_with_cancel(GenerationRequest::new_thread("pets", inline_openapi()), cancel)
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::Cancelled);
    // The in-flight call completed, but its plan was discarded
    assert_eq!(completion.inner.calls(), 1);
    assert!(state.implementation_plan.is_none());
    let stored = checkpoints.load(&state.thread_id).await.unwrap().unwrap();
    assert!(stored.implementation_plan.is_none());
    assert_eq!(stored.error.as_ref().unwrap().kind, FailureKind::Cancelled);
}

#[tokio::test]
async fn test_cancelled_flag_fails_before_any_stage_runs() {
    let temp = TempDir::new().unwrap();
    let (engine, completion, _) = engine_with(&temp, vec![]);

    let cancel = CancelFlag::new();
    cancel.cancel();

    let state = engine
        .submit_with_cancel(GenerationRequest::new_thread("pets", inline_openapi()), cancel)
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    assert_eq!(state.error.as_ref().unwrap().kind, FailureKind::Cancelled);
    assert_eq!(completion.calls(), 0);
}

#[tokio::test]
async fn test_failed_state_is_checkpointed() {
    let temp = TempDir::new().unwrap();
    let (engine, _, checkpoints) = engine_with(&temp, vec![]);

    let state = engine
        .submit(GenerationRequest::new_thread("pets", DocumentSource::inline("")))
        .await
        .unwrap();

    assert_eq!(state.stage, Stage::Failed);
    let stored = checkpoints.load(&state.thread_id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Failed);
    assert_eq!(stored.error, state.error);
}

#[tokio::test]
async fn test_new_thread_without_source_is_rejected() {
    let temp = TempDir::new().unwrap();
    let (engine, _, _) = engine_with(&temp, vec![]);

    let request = GenerationRequest { thread_id: None, message: "pets".to_string(), source: None };
    let result = engine.submit(request).await;
    assert!(result.is_err());
}
