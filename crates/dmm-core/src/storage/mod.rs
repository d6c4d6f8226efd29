//! Storage Module
//!
//! SQLite-based Index Store (§4.E): indexed memories, the write-proposal queue, usage
//! analytics, and the query log, with an optional HNSW vector index layered on top.

mod migrations;
mod sqlite;

pub use migrations::MIGRATIONS;
pub use sqlite::{Result, Storage, StorageError};
