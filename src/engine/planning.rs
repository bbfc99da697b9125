//! Planning stage.
//!
//! A stateless request/response adapter: builds a structured prompt from
//! the normalized documentation and conversation history, invokes the
//! completion service once, and parses the response into an
//! [`ImplementationPlan`]. Retry policy lives in the engine.

use serde::{Deserialize, Serialize};

use super::scope::ScopeSummary;
use crate::completion::{
    ChatMessage, CompletionError, CompletionRequest, CompletionService,
};
use crate::docs::NormalizedDoc;

/// Maximum characters of documentation context fed to the planner.
const DOC_CONTEXT_LIMIT: usize = 7000;

/// Structured implementation plan for an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    /// Name of the MCP service.
    pub service_name: String,

    /// Description of the service.
    #[serde(default)]
    pub description: String,

    /// Tools the server will expose.
    pub tools: Vec<PlannedTool>,

    /// Authentication requirements.
    #[serde(default)]
    pub auth: AuthRequirements,

    /// Package dependencies for the generated code.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One planned MCP tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTool {
    /// Tool function name.
    pub name: String,

    /// Tool description.
    #[serde(default)]
    pub description: String,

    /// Tool parameters.
    #[serde(default)]
    pub parameters: Vec<PlannedParameter>,

    /// What the tool returns.
    #[serde(default)]
    pub returns: String,

    /// API endpoint the tool calls.
    #[serde(default)]
    pub endpoint: String,

    /// HTTP method for the endpoint.
    #[serde(default)]
    pub method: String,
}

/// One parameter of a planned tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedParameter {
    /// Parameter name.
    pub name: String,

    /// Parameter type.
    #[serde(rename = "type", default)]
    pub param_type: String,

    /// Parameter description.
    #[serde(default)]
    pub description: String,
}

/// Authentication requirements for the generated server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthRequirements {
    /// Authentication scheme (API key, OAuth, none, ...).
    #[serde(rename = "type", default)]
    pub scheme: String,

    /// Required credential names.
    #[serde(default)]
    pub credentials: Vec<String>,
}

/// Planning stage adapter, parameterized by model.
pub struct PlanningStage {
    model: String,
}

impl PlanningStage {
    /// Create a planning stage using the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    /// Run one planning call and parse the response.
    pub async fn run(
        &self,
        service: &dyn CompletionService,
        doc: &NormalizedDoc,
        scope: &ScopeSummary,
        history: &[ChatMessage],
        latest_message: &str,
    ) -> Result<ImplementationPlan, CompletionError> {
        let request = self.build_request(doc, scope, history, latest_message);
        let response = service.complete(request).await?;
        parse_plan(&response)
    }

    fn build_request(
        &self,
        doc: &NormalizedDoc,
        scope: &ScopeSummary,
        history: &[ChatMessage],
        latest_message: &str,
    ) -> CompletionRequest {
        let system = "You are an expert planning agent that analyzes API documentation to \
                      create MCP (Model Context Protocol) servers. You respond with a single \
                      JSON object and nothing else."
            .to_string();

        let instruction = format!(
            r#"USER REQUEST: {latest_message}

SCOPE: {scope_summary}

API DOCUMENTATION:

{doc_context}

Your task:
1. Analyze the documentation above
2. Identify the endpoints and functionality to expose as MCP tools
3. Create an implementation plan for an MCP server using the FastMCP framework

Return a JSON object with this structure:
{{
    "service_name": "Name of the MCP service",
    "description": "Description of the service",
    "tools": [
        {{
            "name": "tool_name",
            "description": "Tool description",
            "parameters": [
                {{"name": "param_name", "type": "param_type", "description": "Parameter description"}}
            ],
            "returns": "Description of what the tool returns",
            "endpoint": "API endpoint to call",
            "method": "HTTP method"
        }}
    ],
    "auth": {{
        "type": "Type of authentication (API key, OAuth, none)",
        "credentials": ["List of required credential names"]
    }},
    "dependencies": ["List of Python package dependencies"]
}}"#,
            latest_message = latest_message,
            scope_summary = scope.summary,
            doc_context = doc.to_prompt_context(DOC_CONTEXT_LIMIT),
        );

        // Replay prior conversation so continuations carry their context
        let mut messages: Vec<ChatMessage> = history.to_vec();
        messages.push(ChatMessage::user(instruction));

        CompletionRequest {
            model: self.model.clone(),
            system,
            messages,
            json_response: true,
            temperature: 0.1,
        }
    }
}

/// Parse a completion response into a plan, failing closed.
///
/// An empty tool list counts as malformed: a plan that plans nothing
/// cannot drive code generation.
pub fn parse_plan(response: &str) -> Result<ImplementationPlan, CompletionError> {
    let json = extract_json_object(response)
        .ok_or_else(|| CompletionError::MalformedResponse("no JSON object in response".into()))?;

    let plan: ImplementationPlan = serde_json::from_str(json)
        .map_err(|e| CompletionError::MalformedResponse(format!("plan did not parse: {e}")))?;

    if plan.service_name.trim().is_empty() {
        return Err(CompletionError::MalformedResponse("plan has no service name".into()));
    }
    if plan.tools.is_empty() {
        return Err(CompletionError::MalformedResponse("plan has no tools".into()));
    }
    Ok(plan)
}

/// Slice out the outermost JSON object, tolerating code fences and
/// reasoning text around it.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
