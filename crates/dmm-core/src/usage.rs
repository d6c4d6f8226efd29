//! Usage Tracker (§4.O): records query and retrieval history and derives per-memory
//! health indicators (staleness, unused flags) for deprecation hygiene.

use chrono::Utc;

use crate::models::{MemoryHealthReport, QueryLogEntry, UsageStats};
use crate::storage::Storage;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// A memory not retrieved in this many days is flagged stale.
const STALE_AFTER_DAYS: i64 = 90;
/// A memory never retrieved and older than this many days is flagged unused.
const UNUSED_AFTER_DAYS: i64 = 30;

pub struct UsageTracker<'a> {
    storage: &'a Storage,
}

impl<'a> UsageTracker<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Records one completed query, then folds each returned memory's rank position
    /// into its running usage average.
    pub fn log_query(&self, entry: &QueryLogEntry) -> Result<(), UsageError> {
        self.storage.log_query(entry)?;
        for (rank, memory_id) in entry.returned_memory_ids.iter().enumerate() {
            self.storage.record_memory_retrieval(memory_id, rank)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<UsageStats, UsageError> {
        Ok(self.storage.usage_stats()?)
    }

    /// Builds a health report for every indexed memory, comparing `created`/`last_used`
    /// header fields against the current date (§4.O).
    pub fn health_report(&self) -> Result<Vec<MemoryHealthReport>, UsageError> {
        let now = Utc::now();
        let memories = self.storage.list_all_memories(true)?;

        Ok(memories
            .into_iter()
            .map(|memory| {
                let days_since_created = parse_date(memory.created.as_deref()).map(|d| (now - d).num_days());
                let days_since_last_use = parse_date(memory.last_used.as_deref()).map(|d| (now - d).num_days());

                let is_stale = days_since_last_use.map(|d| d > STALE_AFTER_DAYS).unwrap_or(false);
                let is_unused = memory.usage_count.unwrap_or(0) == 0 && days_since_created.map(|d| d > UNUSED_AFTER_DAYS).unwrap_or(false);

                MemoryHealthReport {
                    memory_id: memory.id,
                    path: memory.path,
                    is_stale,
                    is_unused,
                    days_since_last_use,
                    days_since_created,
                }
            })
            .collect())
    }
}

/// Parses a header date field, accepting either a full RFC 3339 timestamp or a bare
/// `YYYY-MM-DD` date (the format the schema validator and examples both use).
fn parse_date(value: Option<&str>) -> Option<chrono::DateTime<Utc>> {
    let value = value?;
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
