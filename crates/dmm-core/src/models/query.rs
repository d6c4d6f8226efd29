//! Query request/response data models: the HTTP-facing shapes of `/query` and related
//! endpoints (§3, §4.I, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filters narrowing a retrieval query (§4.I).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_priority: Option<f64>,
    #[serde(default)]
    pub include_deprecated: bool,
    #[serde(default)]
    pub exclude_deprecated: bool,
    #[serde(default)]
    pub exclude_ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token_count: Option<usize>,
}

/// Incoming query request body (`POST /query`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub budget: Option<usize>,
    #[serde(default)]
    pub baseline_budget: Option<usize>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub include_score: bool,
}

/// Per-phase timing breakdown attached to a query response (§4.I).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub embed_ms: f64,
    pub vector_search_ms: f64,
    pub rank_ms: f64,
    pub diversity_filter_ms: f64,
    pub assemble_ms: f64,
    pub total_ms: f64,
    pub candidates_considered: usize,
    pub candidates_returned: usize,
}

/// A single scored retrieval candidate, pre-assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub memory_id: String,
    pub path: String,
    pub similarity: f32,
    pub priority: f64,
    pub confidence_score: f32,
    pub score: f32,
    /// Reserved for future contradiction surfacing; always empty in this release.
    #[serde(default)]
    pub conflict_alerts: Vec<String>,
}

/// The full response body of `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub pack_markdown: String,
    pub total_tokens: usize,
    pub budget: usize,
    pub results: Vec<RetrievalResult>,
    pub stats: QueryStats,
    pub generated_at: DateTime<Utc>,
    /// Paths that scored high enough to keep but did not fit the remaining budget
    /// (§4.I stage 5 / §7 "Budget" — not an error, signaled here).
    #[serde(default)]
    pub excluded_for_budget: Vec<String>,
    /// Set only when the baseline pack itself exceeds `baseline_budget` (§4.H).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_overflow_tokens: Option<usize>,
}

/// Response body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub memory_root: String,
}

/// Response body of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub state: String,
    pub indexed_memories: usize,
    pub pending_proposals: usize,
    pub last_reindex_at: Option<DateTime<Utc>>,
    pub watcher_active: bool,
    pub embeddings_ready: bool,
}

/// Response body of `POST /reindex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexResponse {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: f64,
}
