//! Memory Pack data models: the budgeted, ordered output of a query (§3, §4.H, §4.J).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single memory included in a pack, either from the baseline or retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPackEntry {
    pub path: String,
    pub title: String,
    pub content: String,
    pub token_count: usize,
    pub relevance_score: f32,
    pub source: EntrySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    Baseline,
    Retrieved,
}

impl MemoryPackEntry {
    /// Render as a markdown section; baseline entries show `(relevance: baseline)`
    /// instead of a numeric score even when `include_score` is requested.
    pub fn to_markdown(&self, include_score: bool) -> String {
        let header = if include_score && self.source == EntrySource::Retrieved {
            format!("### [{}] (relevance: {:.2})", self.path, self.relevance_score)
        } else if self.source == EntrySource::Baseline {
            format!("### [{}] (relevance: baseline)", self.path)
        } else {
            format!("### [{}]", self.path)
        };
        format!("{header}\n\n{}", self.content)
    }
}

/// The compiled Memory Pack returned from a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPack {
    pub generated_at: DateTime<Utc>,
    pub query: String,
    pub baseline_tokens: usize,
    pub retrieved_tokens: usize,
    pub total_tokens: usize,
    pub budget: usize,
    pub baseline_entries: Vec<MemoryPackEntry>,
    pub retrieved_entries: Vec<MemoryPackEntry>,
    pub included_paths: Vec<String>,
    pub excluded_paths: Vec<String>,
}

const SCOPE_ORDER: [&str; 5] = ["global", "agent", "project", "ephemeral", "other"];

impl MemoryPack {
    pub fn remaining_budget(&self) -> i64 {
        self.budget as i64 - self.total_tokens as i64
    }

    pub fn baseline_count(&self) -> usize {
        self.baseline_entries.len()
    }

    pub fn retrieved_count(&self) -> usize {
        self.retrieved_entries.len()
    }

    pub fn total_count(&self) -> usize {
        self.baseline_count() + self.retrieved_count()
    }

    /// Render the full pack as a Markdown document (§4.J render spec).
    pub fn to_markdown(&self, verbose: bool) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push("# Memory Pack".to_string());
        lines.push(format!("Generated: {}", self.generated_at.to_rfc3339()));
        lines.push(format!("Task: \"{}\"", self.query));
        lines.push(format!(
            "Baseline tokens: {} | Retrieved tokens: {} | Total: {}",
            self.baseline_tokens, self.retrieved_tokens, self.total_tokens
        ));
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());

        if !self.baseline_entries.is_empty() {
            lines.push("## Baseline (Always Included)".to_string());
            lines.push(String::new());
            for entry in &self.baseline_entries {
                lines.push(entry.to_markdown(false));
                lines.push(String::new());
            }
            lines.push("---".to_string());
            lines.push(String::new());
        }

        if !self.retrieved_entries.is_empty() {
            lines.push("## Retrieved Context".to_string());
            lines.push(String::new());

            let mut scope_groups: HashMap<&str, Vec<&MemoryPackEntry>> = HashMap::new();
            for entry in &self.retrieved_entries {
                let scope = entry.path.split('/').next().filter(|_| entry.path.contains('/')).unwrap_or("other");
                scope_groups.entry(scope).or_default().push(entry);
            }

            for scope in SCOPE_ORDER {
                if let Some(entries) = scope_groups.get(scope) {
                    let mut heading = scope.to_string();
                    if let Some(first) = heading.get_mut(0..1) {
                        first.make_ascii_uppercase();
                    }
                    lines.push(format!("### {heading}"));
                    lines.push(String::new());
                    for entry in entries {
                        let rendered = entry.to_markdown(verbose);
                        let rendered = rendered.replacen("### [", "#### [", 1);
                        lines.push(rendered);
                        lines.push(String::new());
                    }
                }
            }

            lines.push("---".to_string());
            lines.push(String::new());
        }

        lines.push("## Pack Statistics".to_string());
        lines.push(format!(
            "- Baseline: {} files, {} tokens",
            self.baseline_count(),
            self.baseline_tokens
        ));
        lines.push(format!(
            "- Retrieved: {} files, {} tokens",
            self.retrieved_count(),
            self.retrieved_tokens
        ));
        lines.push(format!("- Budget: {} tokens", self.budget));
        lines.push(format!("- Remaining: {} tokens", self.remaining_budget()));
        if !self.excluded_paths.is_empty() {
            lines.push(format!(
                "- Excluded: {} files (budget exceeded)",
                self.excluded_paths.len()
            ));
        }

        if verbose && !self.excluded_paths.is_empty() {
            lines.push(String::new());
            lines.push("### Excluded Files".to_string());
            for path in &self.excluded_paths {
                lines.push(format!("- {path}"));
            }
        }

        lines.join("\n")
    }
}

/// Pre-compiled, cacheable baseline pack (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselinePack {
    pub entries: Vec<MemoryPackEntry>,
    pub total_tokens: usize,
    pub generated_at: DateTime<Utc>,
    pub file_hashes: HashMap<String, String>,
}

impl BaselinePack {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A cached pack is valid only if the baseline file-hash snapshot matches exactly.
    pub fn is_valid(&self, current_hashes: &HashMap<String, String>) -> bool {
        &self.file_hashes == current_hashes
    }
}

/// Result of checking whether the baseline pack fits its token budget (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineValidation {
    pub total_tokens: usize,
    pub budget: usize,
    pub is_valid: bool,
    pub overflow_files: Vec<String>,
    pub overflow_tokens: usize,
}

impl BaselineValidation {
    pub fn message(&self) -> String {
        if self.is_valid {
            format!("Baseline valid: {}/{} tokens", self.total_tokens, self.budget)
        } else {
            format!(
                "Baseline exceeds budget: {}/{} tokens (overflow: {} tokens in {} files)",
                self.total_tokens,
                self.budget,
                self.overflow_tokens,
                self.overflow_files.len()
            )
        }
    }
}
