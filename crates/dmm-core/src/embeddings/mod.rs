//! Semantic Embeddings Module
//!
//! Local embedding generation using fastembed (ONNX-based). No external API calls -
//! fully local and private. Also defines the composite-text construction shared by
//! the Indexer (memory embedding) and the Reviewer (proposal duplicate/conflict checks).

mod local;

pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, Embedding,
    EmbeddingError, EmbeddingService, BATCH_SIZE, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};

/// Builds the `[DIRECTORY][TITLE][TAGS][SCOPE][CONTENT]` composite text embedded for a
/// memory, matching the format reviewers use when synthesizing a proposal's composite
/// text for duplicate/conflict checks.
pub fn composite_text(directory: &str, title: &str, tags: &[String], scope: &str, body: &str) -> String {
    format!(
        "[DIRECTORY] {directory}\n[TITLE] {title}\n[TAGS] {tags}\n[SCOPE] {scope}\n[CONTENT] {body}",
        tags = tags.join(", "),
    )
}

/// Builds the directory-embedding text: the path with separators turned into spaces,
/// optionally followed by a human description.
pub fn directory_text(directory: &str, description: &str) -> String {
    let semantic_path = directory.replace(['/', '_', '-'], " ");
    if description.is_empty() {
        semantic_path
    } else {
        format!("{semantic_path}: {description}")
    }
}
