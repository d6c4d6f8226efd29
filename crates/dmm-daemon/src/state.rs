//! Shared daemon state (§4.N): constructed once at startup and cloned per-request by
//! axum's `State` extractor. Every field is cheap to clone (`Arc`, `Instant`, flags).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dmm_core::Config;
use dmm_core::Storage;

#[cfg(feature = "embeddings")]
use dmm_core::EmbeddingService;

#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    #[cfg(feature = "embeddings")]
    pub embedder: Arc<EmbeddingService>,
    pub watcher_active: Arc<AtomicBool>,
    /// RFC3339 timestamp of the last completed full reindex, millis since epoch; 0 means never.
    pub last_reindex_at_ms: Arc<AtomicI64>,
    pub start_time: Instant,
}

impl AppState {
    #[cfg(feature = "embeddings")]
    pub fn new(root: PathBuf, config: Config, storage: Storage, embedder: EmbeddingService) -> Self {
        Self {
            root,
            config: Arc::new(config),
            storage: Arc::new(storage),
            embedder: Arc::new(embedder),
            watcher_active: Arc::new(AtomicBool::new(false)),
            last_reindex_at_ms: Arc::new(AtomicI64::new(0)),
            start_time: Instant::now(),
        }
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn new(root: PathBuf, config: Config, storage: Storage) -> Self {
        Self {
            root,
            config: Arc::new(config),
            storage: Arc::new(storage),
            watcher_active: Arc::new(AtomicBool::new(false)),
            last_reindex_at_ms: Arc::new(AtomicI64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn mark_reindexed(&self, at: chrono::DateTime<chrono::Utc>) {
        self.last_reindex_at_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_reindex_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let ms = self.last_reindex_at_ms.load(Ordering::Relaxed);
        if ms == 0 {
            return None;
        }
        chrono::DateTime::from_timestamp_millis(ms)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    #[cfg(feature = "embeddings")]
    pub fn indexer(&self) -> dmm_core::indexer::Indexer<'_> {
        dmm_core::indexer::Indexer::new(self.root.clone(), &self.storage, self.config.validation.clone(), &self.embedder)
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn indexer(&self) -> dmm_core::indexer::Indexer<'_> {
        dmm_core::indexer::Indexer::new(self.root.clone(), &self.storage, self.config.validation.clone())
    }

    #[cfg(feature = "embeddings")]
    pub fn reviewer(&self) -> dmm_core::reviewer::Reviewer<'_> {
        dmm_core::reviewer::Reviewer::new(&self.storage, &self.config.validation, &self.config.reviewer, &self.embedder)
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn reviewer(&self) -> dmm_core::reviewer::Reviewer<'_> {
        dmm_core::reviewer::Reviewer::new(&self.storage, &self.config.validation, &self.config.reviewer)
    }

    #[cfg(feature = "embeddings")]
    pub fn commit_engine(&self) -> dmm_core::commit::CommitEngine<'_> {
        dmm_core::commit::CommitEngine::new(self.root.clone(), &self.storage, self.config.validation.clone(), &self.embedder)
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn commit_engine(&self) -> dmm_core::commit::CommitEngine<'_> {
        dmm_core::commit::CommitEngine::new(self.root.clone(), &self.storage, self.config.validation.clone())
    }

    pub fn queue(&self) -> dmm_core::proposal_queue::ProposalQueue<'_> {
        dmm_core::proposal_queue::ProposalQueue::new(&self.storage)
    }

    pub fn baseline(&self) -> dmm_core::baseline::BaselineManager<'_> {
        dmm_core::baseline::BaselineManager::new(&self.storage, &self.root)
    }

    pub fn usage(&self) -> dmm_core::usage::UsageTracker<'_> {
        dmm_core::usage::UsageTracker::new(&self.storage)
    }
}
