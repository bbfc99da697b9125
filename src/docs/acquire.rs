//! Fetching and format detection for documentation sources.

use super::{markdown, openapi, AcquisitionError, NormalizedDoc};

/// Where documentation comes from: a URL to fetch, or inline text.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// Fetch the document over HTTP(S).
    Url(String),

    /// Literal document text, with an optional content-type hint.
    Inline { text: String, content_type: Option<String> },
}

impl DocumentSource {
    /// Create an inline source without a content-type hint.
    pub fn inline(text: impl Into<String>) -> Self {
        Self::Inline { text: text.into(), content_type: None }
    }
}

/// Acquire and normalize documentation from a source.
///
/// Side-effect-free apart from the network fetch for URL sources. No
/// retries happen here; retry policy belongs to the workflow engine.
pub async fn acquire(
    client: &reqwest::Client,
    source: &DocumentSource,
) -> Result<NormalizedDoc, AcquisitionError> {
    match source {
        DocumentSource::Url(url) => {
            tracing::info!(url = %url, "fetching documentation");
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| AcquisitionError::Unreachable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(AcquisitionError::Unreachable(format!(
                    "{} returned HTTP {}",
                    url,
                    response.status()
                )));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response
                .text()
                .await
                .map_err(|e| AcquisitionError::Unreachable(e.to_string()))?;

            let mut doc = normalize(&body, content_type.as_deref(), Some(url))?;
            doc.source_url = Some(url.clone());
            Ok(doc)
        }
        DocumentSource::Inline { text, content_type } => {
            normalize(text, content_type.as_deref(), None)
        }
    }
}

/// Normalize raw documentation text into a [`NormalizedDoc`].
///
/// Detection is heuristic: structured-schema markers win over free-text
/// parsing. The content-type hint and URL extension weigh in but the body
/// has the final say.
pub fn normalize(
    text: &str,
    content_type: Option<&str>,
    url: Option<&str>,
) -> Result<NormalizedDoc, AcquisitionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AcquisitionError::Empty);
    }

    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if !looks_textual(&ct) {
            return Err(AcquisitionError::UnsupportedFormat(ct));
        }
    }

    let yaml_hint = content_type.map(|ct| ct.contains("yaml")).unwrap_or(false)
        || url.map(|u| u.ends_with(".yaml") || u.ends_with(".yml")).unwrap_or(false);

    // Structured schema first
    if trimmed.starts_with('{') || content_type.map(|ct| ct.contains("json")).unwrap_or(false) {
        return openapi::parse(trimmed, false);
    }
    if yaml_hint || openapi::has_yaml_markers(trimmed) {
        return openapi::parse(trimmed, true);
    }

    // Free-form prose fallback
    let doc = markdown::parse(trimmed);
    if doc.is_empty() {
        return Err(AcquisitionError::Empty);
    }
    Ok(doc)
}

fn looks_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("yaml")
        || content_type.contains("xml")
        || content_type.contains("markdown")
        || content_type.contains("octet-stream")
        || content_type.is_empty()
}
