//! Static validation of generated artifacts.
//!
//! Deterministic, side-effect-free acceptance checks run before the
//! engine advances to storage. An empty or unusable artifact set is a
//! validation failure that drives the bounded correction loop, never an
//! engine-level error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{ImplementationPlan, REQUIRED_ARTIFACTS};

/// Result of one validator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the artifact set was accepted.
    pub passed: bool,

    /// Defects found, empty when passed.
    pub defects: Vec<ValidationDefect>,
}

impl ValidationReport {
    /// One-line summary for logs and failure messages.
    pub fn summary(&self) -> String {
        if self.passed {
            "validation passed".to_string()
        } else {
            format!(
                "validation failed with {} defect(s): {}",
                self.defects.len(),
                self.defects.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
            )
        }
    }
}

/// One defect found in the generated artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDefect {
    /// Defect classification.
    pub kind: DefectKind,

    /// What exactly is wrong.
    pub detail: String,
}

impl std::fmt::Display for ValidationDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

/// Defect classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    /// No artifacts were generated at all.
    EmptyArtifactSet,
    /// A required artifact is missing.
    MissingArtifact,
    /// An artifact exists but has no content.
    EmptyArtifact,
    /// A planned tool does not appear in the entrypoint source.
    MissingCapability,
    /// A planned dependency is not declared in requirements.
    UnresolvedDependency,
    /// An artifact fails its syntactic check.
    InvalidSyntax,
}

/// Validate generated artifacts against the implementation plan.
pub fn validate(
    artifacts: &BTreeMap<String, String>,
    plan: &ImplementationPlan,
) -> ValidationReport {
    let mut defects = Vec::new();

    if artifacts.is_empty() || artifacts.values().all(|c| c.trim().is_empty()) {
        defects.push(ValidationDefect {
            kind: DefectKind::EmptyArtifactSet,
            detail: "no usable artifacts were generated".to_string(),
        });
        return ValidationReport { passed: false, defects };
    }

    for required in REQUIRED_ARTIFACTS {
        match artifacts.get(*required) {
            None => defects.push(ValidationDefect {
                kind: DefectKind::MissingArtifact,
                detail: format!("required file {required} is missing"),
            }),
            Some(content) if content.trim().is_empty() => defects.push(ValidationDefect {
                kind: DefectKind::EmptyArtifact,
                detail: format!("required file {required} is empty"),
            }),
            Some(_) => {}
        }
    }

    // Every planned tool must show up in the entrypoint source
    if let Some(main) = artifacts.get("main.py") {
        for tool in &plan.tools {
            if !main.contains(&tool.name) {
                defects.push(ValidationDefect {
                    kind: DefectKind::MissingCapability,
                    detail: format!("planned tool {} not found in main.py", tool.name),
                });
            }
        }
    }

    // Every planned dependency must be declared
    if let Some(requirements) = artifacts.get("requirements.txt") {
        for dependency in &plan.dependencies {
            let package = package_name(dependency);
            let declared = requirements
                .lines()
                .any(|line| package_name(line).eq_ignore_ascii_case(package));
            if !declared {
                defects.push(ValidationDefect {
                    kind: DefectKind::UnresolvedDependency,
                    detail: format!("dependency {package} not listed in requirements.txt"),
                });
            }
        }
    }

    // JSON artifacts must actually be JSON; source artifacts get a
    // bracket-balance sanity check
    for (path, content) in artifacts {
        if path.ends_with(".json") && serde_json::from_str::<serde_json::Value>(content).is_err() {
            defects.push(ValidationDefect {
                kind: DefectKind::InvalidSyntax,
                detail: format!("{path} is not valid JSON"),
            });
        } else if path.ends_with(".py") && !brackets_balanced(content) {
            defects.push(ValidationDefect {
                kind: DefectKind::InvalidSyntax,
                detail: format!("{path} has unbalanced brackets"),
            });
        }
    }

    ValidationReport { passed: defects.is_empty(), defects }
}

/// Check that `()`, `[]` and `{}` nest properly, skipping string literals
/// and line comments.
fn brackets_balanced(source: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\'' | '"' => {
                let quote = c;
                while let Some(next) = chars.next() {
                    if next == '\\' {
                        chars.next();
                    } else if next == quote {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }

    stack.is_empty()
}

/// Strip version pins and extras from a requirements line.
fn package_name(line: &str) -> &str {
    let line = line.trim();
    let end = line
        .find(|c: char| ['=', '<', '>', '~', '!', '[', ';', ' '].contains(&c))
        .unwrap_or(line.len());
    &line[..end]
}
