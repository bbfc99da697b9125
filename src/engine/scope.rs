//! Scope derivation.
//!
//! The scoping stage is deterministic: it never calls the completion
//! service, it only summarizes what will be built from the normalized
//! documentation and the user's request.

use serde::{Deserialize, Serialize};

use crate::docs::NormalizedDoc;

/// Short structured statement of what will be built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSummary {
    /// Slug-style service name derived from the documentation title.
    pub service_name: String,

    /// Number of endpoints the documentation describes.
    pub endpoint_count: usize,

    /// `METHOD path` capability strings, sorted for stable output.
    pub capabilities: Vec<String>,

    /// One-line human summary.
    pub summary: String,
}

/// Derive the scope from documentation and the driving request.
pub fn derive_scope(doc: &NormalizedDoc, request: &str) -> ScopeSummary {
    let mut capabilities: Vec<String> =
        doc.endpoints().map(|e| format!("{} {}", e.method, e.path)).collect();
    capabilities.sort();
    capabilities.dedup();

    let service_name = slugify(&doc.title);
    let summary = if capabilities.is_empty() {
        format!("Expose tools described in '{}' as an MCP server: {}", doc.title, request.trim())
    } else {
        format!(
            "Expose {} endpoint(s) from '{}' as MCP tools: {}",
            capabilities.len(),
            doc.title,
            request.trim()
        )
    };

    ScopeSummary { service_name, endpoint_count: capabilities.len(), capabilities, summary }
}

fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
