//! Search Module
//!
//! Vector search over memory composite/directory embeddings using HNSW (USearch).

mod vector;

pub use vector::{
    VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError, DEFAULT_CONNECTIVITY,
    DEFAULT_DIMENSIONS,
};
