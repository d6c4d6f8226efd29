//! Top-level error aggregation. Each component defines its own `thiserror` enum
//! (`StorageError`, `EmbeddingError`, `VectorSearchError`, `ParserError`, ...); `DmmError`
//! unifies them at the boundary between `dmm-core` and its callers.

use crate::storage::StorageError;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DmmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("parser error: {0}")]
    Parser(#[from] crate::parser::ParserError),

    #[cfg(feature = "embeddings")]
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[cfg(feature = "vector-search")]
    #[error("vector search error: {0}")]
    VectorSearch(#[from] crate::search::VectorSearchError),

    #[error("watcher error: {0}")]
    Watcher(#[from] crate::watcher::WatcherError),

    #[error("indexer error: {0}")]
    Indexer(#[from] crate::indexer::IndexerError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::proposal_queue::QueueError),

    #[error("baseline error: {0}")]
    Baseline(#[from] crate::baseline::BaselineError),

    #[cfg(feature = "embeddings")]
    #[error("retrieval error: {0}")]
    Retrieval(#[from] crate::retrieval::RetrievalError),

    #[error("review error: {0}")]
    Review(#[from] crate::reviewer::ReviewError),

    #[error("commit error: {0}")]
    Commit(#[from] crate::commit::CommitError),

    #[error("usage error: {0}")]
    Usage(#[from] crate::usage::UsageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
