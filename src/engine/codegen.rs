//! Code generation stage.
//!
//! Converts an implementation plan into a set of source artifacts via one
//! completion call. On re-entry from a failed validation, the defect list
//! is fed back as corrective context.

use std::collections::BTreeMap;

use serde_json::Value;

use super::planning::{extract_json_object, ImplementationPlan};
use crate::completion::{ChatMessage, CompletionError, CompletionRequest, CompletionService};
use crate::validate::ValidationDefect;

/// Artifacts every generated server must include.
pub const REQUIRED_ARTIFACTS: &[&str] = &["main.py", "requirements.txt", ".env.example", "README.md"];

/// Code generation stage adapter, parameterized by model.
pub struct CodegenStage {
    model: String,
}

impl CodegenStage {
    /// Create a codegen stage using the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    /// Run one generation call and parse the artifact set.
    ///
    /// An empty artifact set parses successfully; deciding that it is
    /// unacceptable is the validator's job.
    pub async fn run(
        &self,
        service: &dyn CompletionService,
        plan: &ImplementationPlan,
        latest_message: &str,
        defects: &[ValidationDefect],
    ) -> Result<BTreeMap<String, String>, CompletionError> {
        let request = self.build_request(plan, latest_message, defects);
        let response = service.complete(request).await?;
        parse_artifacts(&response)
    }

    fn build_request(
        &self,
        plan: &ImplementationPlan,
        latest_message: &str,
        defects: &[ValidationDefect],
    ) -> CompletionRequest {
        let system = "You are an expert coding agent that implements MCP (Model Context \
                      Protocol) servers using FastMCP. You respond with a single JSON object \
                      and nothing else."
            .to_string();

        let plan_json = serde_json::to_string_pretty(plan).unwrap_or_default();

        let mut instruction = format!(
            r#"USER REQUEST: {latest_message}

IMPLEMENTATION PLAN:
{plan_json}

Generate complete, working code for an MCP server following the plan. The code must:
1. Use the FastMCP framework (`from mcp.server.fastmcp import FastMCP`)
2. Implement proper error handling
3. Include type annotations
4. Define one @mcp.tool() function per planned tool, named exactly as planned

Generate these files:
1. main.py - the MCP server implementation
2. requirements.txt - dependencies, one per line
3. .env.example - example environment variables
4. README.md - usage documentation

Return a JSON object with this structure:
{{
    "files": {{
        "main.py": "complete Python code here",
        "requirements.txt": "dependencies",
        ".env.example": "example environment variables",
        "README.md": "documentation"
    }}
}}"#
        );

        if !defects.is_empty() {
            instruction.push_str("\n\nYOUR PREVIOUS ATTEMPT WAS REJECTED. Fix these defects:\n");
            for defect in defects {
                instruction.push_str(&format!("- {defect}\n"));
            }
        }

        CompletionRequest {
            model: self.model.clone(),
            system,
            messages: vec![ChatMessage::user(instruction)],
            json_response: true,
            temperature: 0.2,
        }
    }
}

/// Parse a completion response into the artifact map, failing closed.
///
/// Accepts either `{"files": {path: content}}` or a bare `{path: content}`
/// object of string values.
pub fn parse_artifacts(response: &str) -> Result<BTreeMap<String, String>, CompletionError> {
    let json = extract_json_object(response)
        .ok_or_else(|| CompletionError::MalformedResponse("no JSON object in response".into()))?;

    let value: Value = serde_json::from_str(json)
        .map_err(|e| CompletionError::MalformedResponse(format!("artifacts did not parse: {e}")))?;

    let files = value.get("files").unwrap_or(&value);
    let files = files
        .as_object()
        .ok_or_else(|| CompletionError::MalformedResponse("files is not an object".into()))?;

    let mut artifacts = BTreeMap::new();
    for (path, content) in files {
        let content = content.as_str().ok_or_else(|| {
            CompletionError::MalformedResponse(format!("artifact {path} is not a string"))
        })?;
        artifacts.insert(path.clone(), content.to_string());
    }
    Ok(artifacts)
}
