//! OpenAPI schema normalization.
//!
//! Accepts OpenAPI/Swagger documents in JSON or YAML and extracts the
//! endpoint set. Anything that parses but lacks schema markers is rejected
//! as unsupported rather than silently treated as prose.

use serde_json::Value;

use super::{AcquisitionError, DocSection, EndpointDescriptor, NormalizedDoc, ParameterDescriptor};

const METHODS: &[&str] = &["get", "post", "put", "delete", "patch"];

/// Quick sniff for YAML OpenAPI markers at the top level.
pub fn has_yaml_markers(text: &str) -> bool {
    text.lines().take(20).any(|line| {
        let line = line.trim_start();
        line.starts_with("openapi:") || line.starts_with("swagger:")
    })
}

/// Parse an OpenAPI document (JSON or YAML) into a normalized doc.
pub fn parse(text: &str, from_yaml: bool) -> Result<NormalizedDoc, AcquisitionError> {
    let value: Value = if from_yaml {
        serde_yaml::from_str(text)
            .map_err(|e| AcquisitionError::UnsupportedFormat(format!("invalid YAML: {e}")))?
    } else {
        serde_json::from_str(text)
            .map_err(|e| AcquisitionError::UnsupportedFormat(format!("invalid JSON: {e}")))?
    };

    let obj = value
        .as_object()
        .ok_or_else(|| AcquisitionError::UnsupportedFormat("schema root is not an object".into()))?;

    let has_marker = obj.contains_key("openapi") || obj.contains_key("swagger");
    let paths = obj.get("paths").and_then(Value::as_object);
    if !has_marker && paths.is_none() {
        return Err(AcquisitionError::UnsupportedFormat(
            "document is not an OpenAPI schema (no openapi/swagger/paths markers)".into(),
        ));
    }

    let title = value
        .pointer("/info/title")
        .and_then(Value::as_str)
        .unwrap_or("API")
        .to_string();
    let description =
        value.pointer("/info/description").and_then(Value::as_str).unwrap_or_default();

    let mut sections = Vec::new();
    if !description.trim().is_empty() {
        sections.push(DocSection {
            name: "Overview".to_string(),
            content: description.trim().to_string(),
            endpoints: Vec::new(),
        });
    }

    if let Some(paths) = paths {
        for (path, methods) in paths {
            let Some(methods) = methods.as_object() else { continue };
            let mut endpoints = Vec::new();
            let mut notes = Vec::new();

            for (method, details) in methods {
                if !METHODS.contains(&method.to_ascii_lowercase().as_str()) {
                    continue;
                }
                let summary = details
                    .get("summary")
                    .or_else(|| details.get("description"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some(desc) = details.get("description").and_then(Value::as_str) {
                    if !desc.trim().is_empty() && desc != summary {
                        notes.push(desc.trim().to_string());
                    }
                }

                endpoints.push(EndpointDescriptor {
                    method: method.to_ascii_uppercase(),
                    path: path.clone(),
                    summary,
                    parameters: extract_parameters(details),
                    response: extract_response(details),
                });
            }

            if !endpoints.is_empty() || !notes.is_empty() {
                sections.push(DocSection {
                    name: path.clone(),
                    content: notes.join("\n"),
                    endpoints,
                });
            }
        }
    }

    let doc = NormalizedDoc { title, source_url: None, sections };
    if doc.is_empty() {
        return Err(AcquisitionError::Empty);
    }
    Ok(doc)
}

fn extract_parameters(details: &Value) -> Vec<ParameterDescriptor> {
    let mut parameters: Vec<ParameterDescriptor> = details
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| {
            params
                .iter()
                .filter_map(|p| {
                    let name = p.get("name").and_then(Value::as_str)?;
                    Some(ParameterDescriptor {
                        name: name.to_string(),
                        param_type: p
                            .pointer("/schema/type")
                            .or_else(|| p.get("type"))
                            .and_then(Value::as_str)
                            .unwrap_or("string")
                            .to_string(),
                        description: p
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        required: p.get("required").and_then(Value::as_bool).unwrap_or(false),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // Request body counts as one opaque parameter
    if details.get("requestBody").is_some() {
        parameters.push(ParameterDescriptor {
            name: "body".to_string(),
            param_type: "object".to_string(),
            description: "request body".to_string(),
            required: details
                .pointer("/requestBody/required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }

    parameters
}

fn extract_response(details: &Value) -> Option<String> {
    let responses = details.get("responses")?.as_object()?;
    let mut codes: Vec<&String> = responses.keys().collect();
    codes.sort();
    let first = codes.first()?;
    let description = responses
        .get(*first)
        .and_then(|r| r.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(if description.is_empty() {
        format!("HTTP {first}")
    } else {
        format!("HTTP {first}: {description}")
    })
}
