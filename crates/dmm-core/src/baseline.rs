//! Baseline Manager (§4.H): maintains the always-included baseline pack, cached on
//! disk and invalidated by `file_hash` drift.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;

use crate::models::{BaselinePack, BaselineValidation, EntrySource, IndexedMemory, MemoryPackEntry};
use crate::storage::Storage;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct BaselineManager<'a> {
    storage: &'a Storage,
    cache_path: PathBuf,
    cache: std::sync::Mutex<Option<BaselinePack>>,
}

impl<'a> BaselineManager<'a> {
    pub fn new(storage: &'a Storage, memory_root: &std::path::Path) -> Self {
        Self {
            storage,
            cache_path: memory_root.join(".dmm").join("packs").join("baseline.json"),
            cache: std::sync::Mutex::new(None),
        }
    }

    /// Deterministic ordering: `identity.md` first, `hard_constraints.md` second, the
    /// rest alphabetical by filename (§4.H).
    fn ordered(mut members: Vec<IndexedMemory>) -> Vec<IndexedMemory> {
        members.sort_by(|a, b| baseline_rank(a).cmp(&baseline_rank(b)).then_with(|| a.path.cmp(&b.path)));
        members
    }

    fn current_hashes(members: &[IndexedMemory]) -> HashMap<String, String> {
        members.iter().map(|m| (m.path.clone(), m.file_hash.clone())).collect()
    }

    fn build_pack(members: &[IndexedMemory]) -> BaselinePack {
        let entries: Vec<MemoryPackEntry> = members
            .iter()
            .map(|m| MemoryPackEntry {
                path: m.path.clone(),
                title: m.title.clone(),
                content: m.body.clone(),
                token_count: m.token_count,
                relevance_score: 1.0,
                source: EntrySource::Baseline,
            })
            .collect();
        let total_tokens = entries.iter().map(|e| e.token_count).sum();
        BaselinePack {
            entries,
            total_tokens,
            generated_at: Utc::now(),
            file_hashes: Self::current_hashes(members),
        }
    }

    /// Returns the current baseline pack, regenerating only if the on-disk hash
    /// snapshot has drifted from the in-memory or cached copy.
    pub fn get_baseline_pack(&self) -> Result<BaselinePack, BaselineError> {
        let members = Self::ordered(self.storage.get_baseline()?);
        let current_hashes = Self::current_hashes(&members);

        {
            let cache = self.cache.lock().expect("baseline cache lock poisoned");
            if let Some(pack) = cache.as_ref() {
                if pack.is_valid(&current_hashes) {
                    return Ok(pack.clone());
                }
            }
        }

        if let Some(pack) = self.load_disk_cache() {
            if pack.is_valid(&current_hashes) {
                *self.cache.lock().expect("baseline cache lock poisoned") = Some(pack.clone());
                return Ok(pack);
            }
        }

        let pack = Self::build_pack(&members);
        self.write_disk_cache(&pack)?;
        *self.cache.lock().expect("baseline cache lock poisoned") = Some(pack.clone());
        Ok(pack)
    }

    fn load_disk_cache(&self) -> Option<BaselinePack> {
        let raw = std::fs::read_to_string(&self.cache_path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn write_disk_cache(&self, pack: &BaselinePack) -> Result<(), BaselineError> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(pack).unwrap_or_default();
        std::fs::write(&self.cache_path, json)?;
        Ok(())
    }

    /// Clears both the in-memory and on-disk cache. Called after a baseline commit or
    /// a full reindex (§4.H).
    pub fn invalidate_cache(&self) -> Result<(), BaselineError> {
        *self.cache.lock().expect("baseline cache lock poisoned") = None;
        if self.cache_path.exists() {
            std::fs::remove_file(&self.cache_path)?;
        }
        Ok(())
    }

    /// Checks the baseline pack against `budget`; overbudget is reported, not enforced
    /// (§4.H).
    pub fn validate_baseline_budget(&self, budget: usize) -> Result<BaselineValidation, BaselineError> {
        let pack = self.get_baseline_pack()?;
        let total_tokens = pack.total_tokens;

        if total_tokens <= budget {
            return Ok(BaselineValidation {
                total_tokens,
                budget,
                is_valid: true,
                overflow_files: Vec::new(),
                overflow_tokens: 0,
            });
        }

        let mut by_priority: Vec<&MemoryPackEntry> = pack.entries.iter().collect();
        let members = self.storage.get_baseline()?;
        let priority_of: HashMap<&str, f64> = members.iter().map(|m| (m.path.as_str(), m.priority)).collect();
        by_priority.sort_by(|a, b| {
            priority_of.get(b.path.as_str()).partial_cmp(&priority_of.get(a.path.as_str())).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut running = 0usize;
        let mut overflow_files = Vec::new();
        for entry in by_priority {
            running += entry.token_count;
            if running > budget {
                overflow_files.push(entry.path.clone());
            }
        }

        Ok(BaselineValidation {
            total_tokens,
            budget,
            is_valid: false,
            overflow_tokens: total_tokens.saturating_sub(budget),
            overflow_files,
        })
    }
}

fn baseline_rank(memory: &IndexedMemory) -> u8 {
    let filename = memory.path.rsplit('/').next().unwrap_or(&memory.path);
    match filename {
        "identity.md" => 0,
        "hard_constraints.md" => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Scope, Status};
    use std::path::PathBuf;

    fn baseline_memory(path: &str, hash: &str) -> IndexedMemory {
        IndexedMemory {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            title: "T".to_string(),
            body: "body".to_string(),
            tags: vec![],
            scope: Scope::Baseline,
            priority: 0.5,
            confidence: Confidence::Stable,
            status: Status::Active,
            directory: "baseline".to_string(),
            file_hash: hash.to_string(),
            token_count: 100,
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
    fn orders_identity_then_hard_constraints_then_alphabetical() {
        let members = vec![
            baseline_memory("baseline/zz.md", "h1"),
            baseline_memory("baseline/hard_constraints.md", "h2"),
            baseline_memory("baseline/aa.md", "h3"),
            baseline_memory("baseline/identity.md", "h4"),
        ];
        let ordered = BaselineManager::ordered(members);
        let paths: Vec<&str> = ordered.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["baseline/identity.md", "baseline/hard_constraints.md", "baseline/aa.md", "baseline/zz.md"]);
    }

    #[test]
    fn pack_reflects_cache_invalidation_via_hash() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        storage.upsert_memory(&baseline_memory("baseline/identity.md", "h1")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let manager = BaselineManager::new(&storage, dir.path());
        let first = manager.get_baseline_pack().unwrap();
        assert_eq!(first.total_tokens, 100);

        storage.upsert_memory(&baseline_memory("baseline/identity.md", "h2")).unwrap();
        let second = manager.get_baseline_pack().unwrap();
        assert!(!first.is_valid(&second.file_hashes));
    }
}
