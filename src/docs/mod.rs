//! Documentation acquisition and normalization.
//!
//! Turns heterogeneous API documentation (OpenAPI schemas or free-form
//! markdown) into one normalized representation consumed by the planning
//! stage. Structured-schema detection takes precedence over free-text
//! parsing.

mod acquire;
mod markdown;
mod openapi;

pub use acquire::{acquire, normalize, DocumentSource};

use serde::{Deserialize, Serialize};

/// Errors from documentation acquisition.
///
/// Acquisition errors are fatal: the engine never retries them, the caller
/// must resubmit with corrected input.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("documentation source unreachable: {0}")]
    Unreachable(String),

    #[error("unsupported documentation format: {0}")]
    UnsupportedFormat(String),

    #[error("documentation is empty")]
    Empty,
}

/// Normalized API documentation.
///
/// Output is structurally identical whether the source was a typed schema
/// or prose describing the same endpoint set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDoc {
    /// Document title (API name where available).
    pub title: String,

    /// Source URL, if fetched rather than supplied inline.
    pub source_url: Option<String>,

    /// Named sections in document order.
    pub sections: Vec<DocSection>,
}

/// One named section of a normalized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSection {
    /// Section name (heading or path).
    pub name: String,

    /// Prose content of the section.
    pub content: String,

    /// Endpoint descriptors extracted from this section.
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
}

/// One API endpoint extracted from documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Uppercase HTTP method (GET, POST, ...).
    pub method: String,

    /// URL path, e.g. `/users/{id}`.
    pub path: String,

    /// Short human summary.
    #[serde(default)]
    pub summary: String,

    /// Request parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,

    /// Response shape summary, if known.
    #[serde(default)]
    pub response: Option<String>,
}

/// One endpoint parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name.
    pub name: String,

    /// Declared type (defaults to `string`).
    #[serde(default)]
    pub param_type: String,

    /// Parameter description.
    #[serde(default)]
    pub description: String,

    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
}

impl NormalizedDoc {
    /// Iterate all endpoints across sections.
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.sections.iter().flat_map(|s| s.endpoints.iter())
    }

    /// Total number of extracted endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints().count()
    }

    /// Whether the document carries neither prose nor endpoints.
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.content.trim().is_empty() && s.endpoints.is_empty())
    }

    /// Flatten the document into prompt context, truncated to `max_chars`.
    ///
    /// Endpoint descriptors are rendered first so truncation drops prose
    /// before it drops structure.
    pub fn to_prompt_context(&self, max_chars: usize) -> String {
        let mut out = format!("API: {}\n", self.title);

        for endpoint in self.endpoints() {
            out.push_str(&format!("- {} {}", endpoint.method, endpoint.path));
            if !endpoint.summary.is_empty() {
                out.push_str(&format!(" — {}", endpoint.summary));
            }
            for param in &endpoint.parameters {
                out.push_str(&format!(
                    "\n    param {} ({}){}",
                    param.name,
                    if param.param_type.is_empty() { "string" } else { &param.param_type },
                    if param.required { " required" } else { "" }
                ));
            }
            out.push('\n');
        }

        for section in &self.sections {
            let content = section.content.trim();
            if content.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {}\n{}\n", section.name, content));
        }

        if out.len() > max_chars {
            // Truncate on a char boundary
            let mut end = max_chars;
            while !out.is_char_boundary(end) {
                end -= 1;
            }
            out.truncate(end);
        }

        out
    }
}
