//! Usage tracking data models: query logs, per-memory usage, and health rollups (§4.O).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One logged query, recorded for usage analytics and future ranking feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogEntry {
    pub query_id: String,
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
    pub returned_memory_ids: Vec<String>,
    pub total_tokens: usize,
    pub duration_ms: f64,
}

/// Accumulated usage statistics for a single memory (§4.O).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsageRecord {
    pub memory_id: String,
    pub times_retrieved: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retrieved_at: Option<DateTime<Utc>>,
    pub avg_rank_position: f64,
}

impl MemoryUsageRecord {
    /// Folds one more retrieval at `rank_position` (0-based) into the running average.
    pub fn record_retrieval(&mut self, rank_position: usize, at: DateTime<Utc>) {
        let n = self.times_retrieved as f64;
        self.avg_rank_position = (self.avg_rank_position * n + rank_position as f64) / (n + 1.0);
        self.times_retrieved += 1;
        self.last_retrieved_at = Some(at);
    }
}

/// Aggregate usage statistics across the whole memory root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_queries: u64,
    pub total_memories: usize,
    pub never_retrieved_count: usize,
    pub most_retrieved: Vec<MemoryUsageRecord>,
}

/// Per-memory health indicators surfaced for deprecation/reindex hygiene (§4.O).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealthReport {
    pub memory_id: String,
    pub path: String,
    pub is_stale: bool,
    pub is_unused: bool,
    pub days_since_last_use: Option<i64>,
    pub days_since_created: Option<i64>,
}
