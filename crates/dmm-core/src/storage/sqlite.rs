//! SQLite Index Store Implementation (§4.E)
//!
//! Persists indexed memories, the write-proposal queue, usage analytics, and the query
//! log. Uses separate reader/writer connections so all methods take `&self`, making
//! `Storage` `Send + Sync` and usable behind a plain `Arc` from the daemon's handlers.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::{
    Confidence, IndexedMemory, MemoryUsageRecord, ProposalStatus, ProposalType, QueryLogEntry,
    Scope, Status, UsageStats, WriteProposal,
};

#[cfg(feature = "embeddings")]
use crate::embeddings::Embedding;

#[cfg(feature = "vector-search")]
use crate::search::VectorIndex;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("memory not found: {0}")]
    MemoryNotFound(String),
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
    #[cfg(feature = "vector-search")]
    #[error("vector search error: {0}")]
    VectorSearch(#[from] crate::search::VectorSearchError),
    #[error("invalid status transition: {0:?} -> {1:?}")]
    InvalidTransition(ProposalStatus, ProposalStatus),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Main storage struct with integrated vector index.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[cfg(feature = "vector-search")]
    vector_index: Mutex<VectorIndex>,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Default database path under the platform data directory, mirroring the
    /// memory root's own `directories::ProjectDirs` convention.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "dmm", "core")
            .ok_or_else(|| StorageError::Init("could not determine project directories".to_string()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("dmm.db"))
    }

    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        #[cfg(feature = "vector-search")]
        let vector_index = VectorIndex::new()
            .map_err(|e| StorageError::Init(format!("failed to create vector index: {e}")))?;

        let storage = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            #[cfg(feature = "vector-search")]
            vector_index: Mutex::new(vector_index),
        };

        #[cfg(feature = "vector-search")]
        storage.load_vector_index()?;

        Ok(storage)
    }

    #[cfg(feature = "vector-search")]
    fn load_vector_index(&self) -> Result<()> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT id, composite_embedding FROM memories WHERE composite_embedding IS NOT NULL")?;
        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(reader);

        let mut index = self.vector_index.lock().map_err(|_| StorageError::Init("vector index lock poisoned".into()))?;
        for (id, bytes) in rows {
            if let Some(embedding) = Embedding::from_bytes(&bytes) {
                index.add(&id, &embedding.vector)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Memories
    // ------------------------------------------------------------------

    pub fn upsert_memory(&self, memory: &IndexedMemory) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let tags = serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string());
        let related = serde_json::to_string(&memory.related).unwrap_or_else(|_| "[]".to_string());
        let composite_bytes = memory.composite_embedding_bytes();
        let directory_bytes = memory.directory_embedding_bytes();

        writer.execute(
            "INSERT INTO memories (
                id, path, title, body, tags, scope, priority, confidence, status, directory,
                file_hash, token_count, composite_embedding, directory_embedding, indexed_at,
                created, last_used, usage_count, supersedes, related, expires
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21)
            ON CONFLICT(path) DO UPDATE SET
                id = excluded.id, title = excluded.title, body = excluded.body, tags = excluded.tags,
                scope = excluded.scope, priority = excluded.priority, confidence = excluded.confidence,
                status = excluded.status, directory = excluded.directory, file_hash = excluded.file_hash,
                token_count = excluded.token_count, composite_embedding = excluded.composite_embedding,
                directory_embedding = excluded.directory_embedding, indexed_at = excluded.indexed_at,
                created = excluded.created, last_used = excluded.last_used, usage_count = excluded.usage_count,
                supersedes = excluded.supersedes, related = excluded.related, expires = excluded.expires",
            params![
                memory.id,
                memory.path,
                memory.title,
                memory.body,
                tags,
                memory.scope.as_str(),
                memory.priority,
                memory.confidence.as_str(),
                memory.status.as_str(),
                memory.directory,
                memory.file_hash,
                memory.token_count as i64,
                composite_bytes,
                directory_bytes,
                memory.indexed_at.to_rfc3339(),
                memory.created,
                memory.last_used,
                memory.usage_count.map(|c| c as i64),
                memory.supersedes,
                related,
                memory.expires,
            ],
        )?;
        drop(writer);

        #[cfg(feature = "vector-search")]
        {
            let mut index = self.vector_index.lock().map_err(|_| StorageError::Init("vector index lock poisoned".into()))?;
            if index.contains(&memory.id) {
                index.remove(&memory.id)?;
            }
            if !memory.composite_embedding.is_empty() {
                index.add(&memory.id, &memory.composite_embedding)?;
            }
        }

        Ok(())
    }

    pub fn delete_memory_by_path(&self, path: &str) -> Result<Option<String>> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let id: Option<String> = writer
            .query_row("SELECT id FROM memories WHERE path = ?1", params![path], |row| row.get(0))
            .optional()?;
        if let Some(id) = &id {
            writer.execute("DELETE FROM memories WHERE path = ?1", params![path])?;
            writer.execute("DELETE FROM usage_records WHERE memory_id = ?1", params![id])?;
        }
        drop(writer);

        #[cfg(feature = "vector-search")]
        if let Some(id) = &id {
            let mut index = self.vector_index.lock().map_err(|_| StorageError::Init("vector index lock poisoned".into()))?;
            if index.contains(id) {
                index.remove(id)?;
            }
        }

        Ok(id)
    }

    pub fn get_memory_by_path(&self, path: &str) -> Result<Option<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT * FROM memories WHERE path = ?1", params![path], row_to_memory)
            .optional()
            .map_err(StorageError::from)
    }

    pub fn get_memory_by_hash(&self, file_hash: &str) -> Result<Option<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT * FROM memories WHERE file_hash = ?1 LIMIT 1", params![file_hash], row_to_memory)
            .optional()
            .map_err(StorageError::from)
    }

    pub fn get_memory_by_id(&self, id: &str) -> Result<Option<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()
            .map_err(StorageError::from)
    }

    /// Just the stored `file_hash` for a path, without decoding embeddings (§4.E
    /// `get_file_hash`); used by the Indexer's skip-if-unchanged check.
    pub fn get_file_hash(&self, path: &str) -> Result<Option<String>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT file_hash FROM memories WHERE path = ?1", params![path], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)
    }

    pub fn get_memory_count(&self) -> Result<usize> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn set_system_meta(&self, key: &str, value: &str) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "INSERT INTO system_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_system_meta(&self, key: &str) -> Result<Option<String>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT value FROM system_meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)
    }

    pub fn list_all_memories(&self, include_deprecated: bool) -> Result<Vec<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let sql = if include_deprecated {
            "SELECT * FROM memories"
        } else {
            "SELECT * FROM memories WHERE status != 'deprecated'"
        };
        let mut stmt = reader.prepare(sql)?;
        let rows = stmt.query_map([], row_to_memory)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    pub fn list_by_directory(&self, directory: &str) -> Result<Vec<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT * FROM memories WHERE directory = ?1")?;
        let rows = stmt.query_map(params![directory], row_to_memory)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    /// Candidates sharing at least one tag with `tags`, for the reviewer's duplicate
    /// tag-overlap check (§4.L).
    pub fn find_by_tag_overlap(&self, tags: &[String]) -> Result<Vec<IndexedMemory>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let all = self.list_all_memories(false)?;
        Ok(all
            .into_iter()
            .filter(|m| m.tags.iter().any(|t| tags.contains(t)))
            .collect())
    }

    #[cfg(feature = "vector-search")]
    pub fn vector_search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(String, f32)>> {
        let index = self.vector_index.lock().map_err(|_| StorageError::Init("vector index lock poisoned".into()))?;
        Ok(index.search(query_embedding, top_k)?)
    }

    /// All `baseline`-scope, `active`-status memories (§4.E `get_baseline`).
    pub fn get_baseline(&self) -> Result<Vec<IndexedMemory>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT * FROM memories WHERE scope = 'baseline' AND status = 'active'")?;
        let rows = stmt.query_map([], row_to_memory)?.filter_map(|r| r.ok()).collect();
        Ok(rows)
    }

    /// Top-k directories by cosine similarity of their `directory_embedding` against
    /// `query_vec`, aggregated per directory (max similarity among its members), tied
    /// alphabetically (§4.E `search_by_directory`).
    #[cfg(feature = "embeddings")]
    pub fn search_by_directory(&self, query_vec: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let all = self.list_all_memories(false)?;
        let mut best: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
        for memory in &all {
            if memory.directory_embedding.is_empty() {
                continue;
            }
            let sim = crate::embeddings::cosine_similarity(query_vec, &memory.directory_embedding).max(0.0);
            best.entry(memory.directory.clone())
                .and_modify(|existing| {
                    if sim > *existing {
                        *existing = sim;
                    }
                })
                .or_insert(sim);
        }
        let mut ranked: Vec<(String, f32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Content candidates by cosine similarity over `composite_embedding`, restricted
    /// to `directories` when given, filtered by `SearchFilters` (§4.E `search_by_content`).
    #[cfg(feature = "embeddings")]
    pub fn search_by_content(
        &self,
        query_vec: &[f32],
        directories: Option<&[String]>,
        filters: &crate::models::SearchFilters,
        limit: usize,
    ) -> Result<Vec<(IndexedMemory, f32)>> {
        let include_deprecated = filters.include_deprecated && !filters.exclude_deprecated;
        let all = self.list_all_memories(include_deprecated)?;
        let mut scored: Vec<(IndexedMemory, f32)> = all
            .into_iter()
            .filter(|m| directories.map(|dirs| dirs.contains(&m.directory)).unwrap_or(true))
            .filter(|m| filters.scopes.is_empty() || filters.scopes.contains(&m.scope.as_str().to_string()))
            .filter(|m| filters.tags.is_empty() || filters.tags.iter().any(|t| m.tags.contains(t)))
            .filter(|m| filters.directory.as_deref().map(|d| m.directory == d).unwrap_or(true))
            .filter(|m| filters.min_priority.map(|min| m.priority >= min).unwrap_or(true))
            .filter(|m| !filters.exclude_ephemeral || m.scope != Scope::Ephemeral)
            .filter(|m| filters.max_token_count.map(|max| m.token_count <= max).unwrap_or(true))
            .filter(|m| !m.composite_embedding.is_empty())
            .map(|m| {
                let sim = crate::embeddings::cosine_similarity(query_vec, &m.composite_embedding).max(0.0);
                (m, sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    // ------------------------------------------------------------------
    // Proposals
    // ------------------------------------------------------------------

    pub fn insert_proposal(&self, proposal: &WriteProposal) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "INSERT INTO proposals (
                proposal_id, proposal_type, target_path, reason, content, patch, new_scope,
                proposed_by, created_at, status, memory_id, deprecation_reason, source_scope,
                reviewed_at, reviewer_notes, retry_count, committed_at, commit_error
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                proposal.proposal_id,
                proposal_type_str(proposal.proposal_type),
                proposal.target_path,
                proposal.reason,
                proposal.content,
                proposal.patch,
                proposal.new_scope,
                proposal.proposed_by,
                proposal.created_at.to_rfc3339(),
                proposal_status_str(proposal.status),
                proposal.memory_id,
                proposal.deprecation_reason,
                proposal.source_scope,
                proposal.reviewed_at.map(|t| t.to_rfc3339()),
                proposal.reviewer_notes,
                proposal.retry_count,
                proposal.committed_at.map(|t| t.to_rfc3339()),
                proposal.commit_error,
            ],
        )?;
        Ok(())
    }

    pub fn get_proposal(&self, proposal_id: &str) -> Result<Option<WriteProposal>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row("SELECT * FROM proposals WHERE proposal_id = ?1", params![proposal_id], row_to_proposal)
            .optional()
            .map_err(StorageError::from)
    }

    pub fn get_proposal_by_path(&self, target_path: &str) -> Result<Option<WriteProposal>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        reader
            .query_row(
                "SELECT * FROM proposals WHERE target_path = ?1 ORDER BY created_at DESC LIMIT 1",
                params![target_path],
                row_to_proposal,
            )
            .optional()
            .map_err(StorageError::from)
    }

    pub fn has_pending_for_path(&self, target_path: &str) -> Result<bool> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM proposals WHERE target_path = ?1 AND status IN ('pending', 'in_review')",
            params![target_path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn increment_retry(&self, proposal_id: &str) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "UPDATE proposals SET retry_count = retry_count + 1 WHERE proposal_id = ?1",
            params![proposal_id],
        )?;
        Ok(())
    }

    pub fn delete_proposal(&self, proposal_id: &str) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute("DELETE FROM proposals WHERE proposal_id = ?1", params![proposal_id])?;
        Ok(())
    }

    pub fn proposal_status_counts(&self) -> Result<Vec<(ProposalStatus, i64)>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT status, COUNT(*) FROM proposals GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_proposal_status(&status), count))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn audit_history_for_proposal(&self, proposal_id: &str) -> Result<Vec<(String, Option<String>, String, String, String)>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT proposal_id, memory_id, memory_path, action, committed_at FROM audit_history WHERE proposal_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![proposal_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn list_proposals_by_status(&self, status: ProposalStatus) -> Result<Vec<WriteProposal>> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT * FROM proposals WHERE status = ?1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map(params![proposal_status_str(status)], row_to_proposal)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Compare-and-swap status transition. Fails the row update (returns `Ok(false)`)
    /// if another caller already moved the proposal out of `from`.
    pub fn try_transition_proposal(
        &self,
        proposal_id: &str,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(StorageError::InvalidTransition(from, to));
        }
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let affected = writer.execute(
            "UPDATE proposals SET status = ?1 WHERE proposal_id = ?2 AND status = ?3",
            params![proposal_status_str(to), proposal_id, proposal_status_str(from)],
        )?;
        Ok(affected == 1)
    }

    pub fn update_proposal_review(
        &self,
        proposal_id: &str,
        status: ProposalStatus,
        reviewer_notes: Option<&str>,
    ) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "UPDATE proposals SET status = ?1, reviewed_at = ?2, reviewer_notes = ?3 WHERE proposal_id = ?4",
            params![proposal_status_str(status), Utc::now().to_rfc3339(), reviewer_notes, proposal_id],
        )?;
        Ok(())
    }

    pub fn update_proposal_commit(
        &self,
        proposal_id: &str,
        status: ProposalStatus,
        memory_id: Option<&str>,
        commit_error: Option<&str>,
    ) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "UPDATE proposals SET status = ?1, memory_id = ?2, committed_at = ?3, commit_error = ?4 WHERE proposal_id = ?5",
            params![
                proposal_status_str(status),
                memory_id,
                Utc::now().to_rfc3339(),
                commit_error,
                proposal_id,
            ],
        )?;
        Ok(())
    }

    pub fn record_audit_entry(&self, proposal_id: &str, memory_id: Option<&str>, memory_path: &str, action: &str) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        writer.execute(
            "INSERT INTO audit_history (proposal_id, memory_id, memory_path, action, committed_at) VALUES (?1,?2,?3,?4,?5)",
            params![proposal_id, memory_id, memory_path, action, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Usage tracking (§4.O)
    // ------------------------------------------------------------------

    pub fn log_query(&self, entry: &QueryLogEntry) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let memory_ids = serde_json::to_string(&entry.returned_memory_ids).unwrap_or_else(|_| "[]".to_string());
        writer.execute(
            "INSERT INTO query_log (query_id, query_text, timestamp, returned_memory_ids, total_tokens, duration_ms)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                entry.query_id,
                entry.query_text,
                entry.timestamp.to_rfc3339(),
                memory_ids,
                entry.total_tokens as i64,
                entry.duration_ms,
            ],
        )?;
        Ok(())
    }

    pub fn record_memory_retrieval(&self, memory_id: &str, rank_position: usize) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StorageError::Init("writer lock poisoned".into()))?;
        let existing: Option<(i64, f64)> = writer
            .query_row(
                "SELECT times_retrieved, avg_rank_position FROM usage_records WHERE memory_id = ?1",
                params![memory_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (times_retrieved, avg_rank_position) = match existing {
            Some((n, avg)) => (n as f64, avg),
            None => (0.0, 0.0),
        };
        let new_avg = (avg_rank_position * times_retrieved + rank_position as f64) / (times_retrieved + 1.0);

        writer.execute(
            "INSERT INTO usage_records (memory_id, times_retrieved, last_retrieved_at, avg_rank_position)
             VALUES (?1, 1, ?2, ?3)
             ON CONFLICT(memory_id) DO UPDATE SET
                times_retrieved = times_retrieved + 1,
                last_retrieved_at = excluded.last_retrieved_at,
                avg_rank_position = ?3",
            params![memory_id, Utc::now().to_rfc3339(), new_avg],
        )?;
        Ok(())
    }

    pub fn usage_stats(&self) -> Result<UsageStats> {
        let reader = self.reader.lock().map_err(|_| StorageError::Init("reader lock poisoned".into()))?;

        let total_queries: u64 = reader.query_row("SELECT COUNT(*) FROM query_log", [], |row| row.get(0))?;
        let total_memories: i64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        let retrieved_count: i64 = reader.query_row("SELECT COUNT(*) FROM usage_records", [], |row| row.get(0))?;

        let mut stmt = reader.prepare(
            "SELECT memory_id, times_retrieved, last_retrieved_at, avg_rank_position
             FROM usage_records ORDER BY times_retrieved DESC LIMIT 10",
        )?;
        let most_retrieved = stmt
            .query_map([], |row| {
                let last_retrieved_at: Option<String> = row.get(2)?;
                Ok(MemoryUsageRecord {
                    memory_id: row.get(0)?,
                    times_retrieved: row.get::<_, i64>(1)? as u64,
                    last_retrieved_at: last_retrieved_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
                    avg_rank_position: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(UsageStats {
            total_queries,
            total_memories: total_memories as usize,
            never_retrieved_count: (total_memories - retrieved_count).max(0) as usize,
            most_retrieved,
        })
    }
}

fn proposal_type_str(t: ProposalType) -> &'static str {
    match t {
        ProposalType::Create => "create",
        ProposalType::Update => "update",
        ProposalType::Deprecate => "deprecate",
        ProposalType::Promote => "promote",
    }
}

fn parse_proposal_type(s: &str) -> ProposalType {
    match s {
        "update" => ProposalType::Update,
        "deprecate" => ProposalType::Deprecate,
        "promote" => ProposalType::Promote,
        _ => ProposalType::Create,
    }
}

fn proposal_status_str(s: ProposalStatus) -> &'static str {
    match s {
        ProposalStatus::Pending => "pending",
        ProposalStatus::InReview => "in_review",
        ProposalStatus::Approved => "approved",
        ProposalStatus::Committed => "committed",
        ProposalStatus::Rejected => "rejected",
        ProposalStatus::Modified => "modified",
        ProposalStatus::Deferred => "deferred",
        ProposalStatus::Failed => "failed",
    }
}

fn parse_proposal_status(s: &str) -> ProposalStatus {
    match s {
        "in_review" => ProposalStatus::InReview,
        "approved" => ProposalStatus::Approved,
        "committed" => ProposalStatus::Committed,
        "rejected" => ProposalStatus::Rejected,
        "modified" => ProposalStatus::Modified,
        "deferred" => ProposalStatus::Deferred,
        "failed" => ProposalStatus::Failed,
        _ => ProposalStatus::Pending,
    }
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<IndexedMemory> {
    let tags: String = row.get("tags")?;
    let related: String = row.get("related")?;
    let indexed_at: String = row.get("indexed_at")?;
    let composite_bytes: Option<Vec<u8>> = row.get("composite_embedding")?;
    let directory_bytes: Option<Vec<u8>> = row.get("directory_embedding")?;
    let scope: String = row.get("scope")?;
    let confidence: String = row.get("confidence")?;
    let status: String = row.get("status")?;
    let usage_count: Option<i64> = row.get("usage_count")?;

    Ok(IndexedMemory {
        id: row.get("id")?,
        path: row.get("path")?,
        title: row.get("title")?,
        body: row.get("body")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        scope: Scope::parse_name(&scope).unwrap_or_default(),
        priority: row.get("priority")?,
        confidence: Confidence::parse_name(&confidence).unwrap_or_default(),
        status: Status::parse_name(&status).unwrap_or_default(),
        directory: row.get("directory")?,
        file_hash: row.get("file_hash")?,
        token_count: row.get::<_, i64>("token_count")? as usize,
        composite_embedding: composite_bytes.map(|b| decode_embedding(&b)).unwrap_or_default(),
        directory_embedding: directory_bytes.map(|b| decode_embedding(&b)).unwrap_or_default(),
        indexed_at: DateTime::parse_from_rfc3339(&indexed_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        created: row.get("created")?,
        last_used: row.get("last_used")?,
        usage_count: usage_count.map(|c| c as u64),
        supersedes: row.get("supersedes")?,
        related: serde_json::from_str(&related).unwrap_or_default(),
        expires: row.get("expires")?,
    })
}

#[cfg(feature = "embeddings")]
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    Embedding::from_bytes(bytes).map(|e| e.vector).unwrap_or_default()
}

#[cfg(not(feature = "embeddings"))]
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn row_to_proposal(row: &rusqlite::Row) -> rusqlite::Result<WriteProposal> {
    let proposal_type: String = row.get("proposal_type")?;
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;
    let committed_at: Option<String> = row.get("committed_at")?;

    Ok(WriteProposal {
        proposal_id: row.get("proposal_id")?,
        proposal_type: parse_proposal_type(&proposal_type),
        target_path: row.get("target_path")?,
        reason: row.get("reason")?,
        content: row.get("content")?,
        patch: row.get("patch")?,
        new_scope: row.get("new_scope")?,
        proposed_by: row.get("proposed_by")?,
        created_at: DateTime::parse_from_rfc3339(&created_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        status: parse_proposal_status(&status),
        memory_id: row.get("memory_id")?,
        deprecation_reason: row.get("deprecation_reason")?,
        source_scope: row.get("source_scope")?,
        reviewed_at: reviewed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        reviewer_notes: row.get("reviewer_notes")?,
        retry_count: row.get::<_, i64>("retry_count")? as u32,
        committed_at: committed_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        commit_error: row.get("commit_error")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Scope, Status};

    fn sample_memory(path: &str) -> IndexedMemory {
        IndexedMemory {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            title: "Sample".to_string(),
            body: "Body text".to_string(),
            tags: vec!["auth".to_string()],
            scope: Scope::Project,
            priority: 0.5,
            confidence: Confidence::Active,
            status: Status::Active,
            directory: "project".to_string(),
            file_hash: "abc123".to_string(),
            token_count: 10,
            composite_embedding: vec![],
            directory_embedding: vec![],
            indexed_at: Utc::now(),
            created: None,
            last_used: None,
            usage_count: None,
            supersedes: None,
            related: vec![],
            expires: None,
        }
    }

    #[test]
    fn upsert_and_fetch_roundtrip() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let memory = sample_memory("project/auth/jwt.md");
        storage.upsert_memory(&memory).unwrap();

        let fetched = storage.get_memory_by_path("project/auth/jwt.md").unwrap().unwrap();
        assert_eq!(fetched.id, memory.id);
        assert_eq!(fetched.tags, memory.tags);
    }

    #[test]
    fn delete_removes_row() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let memory = sample_memory("project/auth/jwt.md");
        storage.upsert_memory(&memory).unwrap();
        storage.delete_memory_by_path("project/auth/jwt.md").unwrap();
        assert!(storage.get_memory_by_path("project/auth/jwt.md").unwrap().is_none());
    }

    #[test]
    fn proposal_transition_dag_rejects_invalid_moves() {
        assert!(ProposalStatus::Pending.can_transition_to(ProposalStatus::InReview));
        assert!(!ProposalStatus::Pending.can_transition_to(ProposalStatus::Committed));
        assert!(ProposalStatus::Deferred.can_transition_to(ProposalStatus::Pending));
    }

    #[test]
    fn tag_overlap_finds_shared_tag() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        storage.upsert_memory(&sample_memory("project/auth/jwt.md")).unwrap();
        let matches = storage.find_by_tag_overlap(&["auth".to_string()]).unwrap();
        assert_eq!(matches.len(), 1);
    }
}
