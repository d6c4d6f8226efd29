//! # DMM Core
//!
//! Engine behind the Dynamic Markdown Memory daemon: a local service that indexes a
//! directory tree of Markdown memory files and serves budget-bounded, relevance-ranked
//! Memory Packs to AI agent sessions.
//!
//! ## Pipeline
//!
//! - **Parser** ([`parser`]) reads a memory file's YAML frontmatter and Markdown body.
//! - **Embedder** ([`embeddings`]) builds composite and directory embeddings with a
//!   local ONNX model (fastembed, nomic-embed-text-v1.5, Matryoshka-truncated to 256
//!   dimensions). No network calls; fully local and private.
//! - **Index Store** ([`storage`]) persists indexed memories and proposals in SQLite,
//!   backed by an HNSW vector index ([`search`]) for nearest-neighbor lookup.
//! - **Watcher** ([`watcher`]) debounces filesystem change events and feeds the
//!   **Indexer** ([`indexer`]), which keeps the store in sync with the memory root.
//! - **Baseline Manager** ([`baseline`]) maintains the always-included baseline pack.
//! - **Retrieval Router** ([`retrieval`]) ranks and filters candidates for a query; the
//!   **Pack Assembler** ([`assembler`]) renders baseline + retrieved entries into a
//!   budget-respecting Memory Pack.
//! - **Proposal Queue** ([`proposal_queue`]) and **Reviewer** ([`reviewer`]) gate writes
//!   proposed by agents before the **Commit Engine** ([`commit`]) applies them atomically.
//! - **Usage Tracker** ([`usage`]) records query and retrieval history for analytics.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dmm_core::{Config, Storage};
//!
//! let config = Config::load_or_default(None)?;
//! let storage = Storage::new(Some(config.storage.db_path.clone()))?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod storage;
pub mod tokens;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embeddings;

#[cfg(feature = "vector-search")]
#[cfg_attr(docsrs, doc(cfg(feature = "vector-search")))]
pub mod search;

pub mod baseline;
pub mod commit;
pub mod indexer;
pub mod proposal_queue;
pub mod reviewer;
pub mod usage;
pub mod watcher;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod retrieval;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod assembler;

pub use config::Config;
pub use error::DmmError;
pub use storage::{Result, Storage, StorageError};

#[cfg(feature = "embeddings")]
pub use embeddings::{cosine_similarity, euclidean_distance, Embedding, EmbeddingError, EmbeddingService, EMBEDDING_DIMENSIONS};

#[cfg(feature = "vector-search")]
pub use search::{VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{Config, DmmError, Result, Storage, StorageError};
    pub use crate::models::{
        Confidence, IndexedMemory, MemoryFile, MemoryHeader, MemoryPack, Scope, Status,
        WriteProposal,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::{Embedding, EmbeddingService};

    #[cfg(feature = "vector-search")]
    pub use crate::VectorIndex;
}
