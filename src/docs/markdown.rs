//! Free-form markdown/prose normalization.
//!
//! Splits a document into sections on `#`/`##` headings and extracts
//! `METHOD /path` endpoint lines, including those inside code spans.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DocSection, EndpointDescriptor, NormalizedDoc};

static ENDPOINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[\s`]*(GET|POST|PUT|DELETE|PATCH)\s+(/[^\s`]*)").unwrap()
});

/// Parse markdown (or plain prose) into a normalized doc.
pub fn parse(text: &str) -> NormalizedDoc {
    let mut title = String::new();
    let mut sections: Vec<DocSection> = Vec::new();
    let mut current_name = "Introduction".to_string();
    let mut current_content: Vec<&str> = Vec::new();

    let mut flush = |name: &str, content: &[&str], sections: &mut Vec<DocSection>| {
        let body = content.join("\n");
        if body.trim().is_empty() && sections.iter().any(|s| s.name == name) {
            return;
        }
        if body.trim().is_empty() && name == "Introduction" {
            return;
        }
        sections.push(DocSection {
            name: name.to_string(),
            endpoints: extract_endpoints(&body),
            content: body,
        });
    };

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("# ") {
            if title.is_empty() {
                title = heading.trim().to_string();
            }
            flush(&current_name, &current_content, &mut sections);
            current_name = heading.trim().to_string();
            current_content = Vec::new();
        } else if let Some(heading) = line.strip_prefix("## ") {
            flush(&current_name, &current_content, &mut sections);
            current_name = heading.trim().to_string();
            current_content = Vec::new();
        } else {
            current_content.push(line);
        }
    }
    flush(&current_name, &current_content, &mut sections);

    NormalizedDoc {
        title: if title.is_empty() { "API Documentation".to_string() } else { title },
        source_url: None,
        sections,
    }
}

fn extract_endpoints(content: &str) -> Vec<EndpointDescriptor> {
    let mut endpoints: Vec<EndpointDescriptor> = Vec::new();

    for capture in ENDPOINT_RE.captures_iter(content) {
        let method = capture[1].to_string();
        let path = capture[2].trim_end_matches('`').to_string();

        // Repeated mentions of the same endpoint collapse to one descriptor
        if endpoints.iter().any(|e| e.method == method && e.path == path) {
            continue;
        }

        endpoints.push(EndpointDescriptor {
            method,
            path,
            summary: String::new(),
            parameters: Vec::new(),
            response: None,
        });
    }

    endpoints
}
