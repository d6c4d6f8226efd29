//! The on-disk `MemoryFile` and its persisted projection, `IndexedMemory`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Partition a memory by intended lifetime and authority. Dictates directory
/// placement: a memory's path first segment must equal its scope.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Baseline,
    Global,
    Agent,
    #[default]
    Project,
    Ephemeral,
    Deprecated,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Baseline => "baseline",
            Scope::Global => "global",
            Scope::Agent => "agent",
            Scope::Project => "project",
            Scope::Ephemeral => "ephemeral",
            Scope::Deprecated => "deprecated",
        }
    }

    pub fn parse_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "baseline" => Some(Scope::Baseline),
            "global" => Some(Scope::Global),
            "agent" => Some(Scope::Agent),
            "project" => Some(Scope::Project),
            "ephemeral" => Some(Scope::Ephemeral),
            "deprecated" => Some(Scope::Deprecated),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported confidence tier, distinct from `status`. Maps to a numeric
/// `confidence_score` used by the retrieval ranker (§4.I).
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Experimental,
    #[default]
    Active,
    Stable,
    Deprecated,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Experimental => "experimental",
            Confidence::Active => "active",
            Confidence::Stable => "stable",
            Confidence::Deprecated => "deprecated",
        }
    }

    pub fn parse_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "experimental" => Some(Confidence::Experimental),
            "active" => Some(Confidence::Active),
            "stable" => Some(Confidence::Stable),
            "deprecated" => Some(Confidence::Deprecated),
            _ => None,
        }
    }

    /// The weight this confidence tier contributes to the ranking score (§4.I).
    pub fn score(&self) -> f32 {
        match self {
            Confidence::Experimental => 0.4,
            Confidence::Active => 0.8,
            Confidence::Stable => 1.0,
            Confidence::Deprecated => 0.0,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status, independent of scope: a memory can be `active` in any scope, or
/// `deprecated` (excluded from default queries) regardless of its confidence tier.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Deprecated => "deprecated",
        }
    }

    pub fn parse_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "active" => Some(Status::Active),
            "deprecated" => Some(Status::Deprecated),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured YAML header at the top of a memory file (§3).
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHeader {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub scope: Scope,
    pub priority: f64,
    pub confidence: Confidence,
    #[serde(default)]
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    /// Unknown header keys are preserved but ignored by the core (§9).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

/// A single memory file: structured header plus Markdown body.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub header: MemoryHeader,
    /// Relative path from the memory root, e.g. `project/auth/jwt_rotation.md`.
    pub path: String,
    /// Title extracted from the first `# heading` line of the body.
    pub title: String,
    /// The Markdown body (everything after the frontmatter block).
    pub body: String,
    pub token_count: usize,
}

impl MemoryFile {
    /// First path segment, which must equal `header.scope` (an invariant enforced by
    /// the schema validator, not by this constructor).
    pub fn directory(&self) -> &str {
        self.path.split('/').next().unwrap_or("")
    }

    /// Serializes header + body back into the on-disk file format: `---\n<yaml>---\n\n<body>`.
    pub fn serialize(&self) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(&self.header)?;
        Ok(format!("---\n{yaml}---\n\n{}", self.body))
    }
}

/// The persisted projection of a `MemoryFile` in the Index Store (§3), carrying derived
/// fields invalidated by `file_hash` mismatch against the on-disk source of truth.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct IndexedMemory {
    pub id: String,
    pub path: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub scope: Scope,
    pub priority: f64,
    pub confidence: Confidence,
    pub status: Status,
    pub directory: String,
    pub file_hash: String,
    pub token_count: usize,
    pub composite_embedding: Vec<f32>,
    pub directory_embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
    pub created: Option<String>,
    pub last_used: Option<String>,
    pub usage_count: Option<u64>,
    pub supersedes: Option<String>,
    pub related: Vec<String>,
    pub expires: Option<String>,
}

impl IndexedMemory {
    fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    pub fn composite_embedding_bytes(&self) -> Option<Vec<u8>> {
        (!self.composite_embedding.is_empty()).then(|| Self::vector_to_bytes(&self.composite_embedding))
    }

    pub fn directory_embedding_bytes(&self) -> Option<Vec<u8>> {
        (!self.directory_embedding.is_empty()).then(|| Self::vector_to_bytes(&self.directory_embedding))
    }
}
