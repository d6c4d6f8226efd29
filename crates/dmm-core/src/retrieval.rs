//! Retrieval Router (§4.I): query → two-stage semantic search → ranking → diversity
//! filter → token-budget selection.

use crate::config::RetrievalConfig;
use crate::embeddings::cosine_similarity;
use crate::models::{IndexedMemory, MemoryPackEntry, EntrySource, SearchFilters};
use crate::storage::Storage;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

#[derive(Debug, Clone)]
struct Candidate {
    memory: IndexedMemory,
    similarity: f32,
    score: f32,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub entries: Vec<MemoryPackEntry>,
    pub total_tokens: usize,
    pub directories_searched: Vec<String>,
    pub candidates_considered: usize,
    pub excluded_for_budget: Vec<String>,
}

/// Ranks a query against the index and returns a budget-respecting, diversity-filtered
/// set of entries.
pub fn retrieve(
    storage: &Storage,
    query_embedding: &[f32],
    budget: usize,
    filters: &SearchFilters,
    config: &RetrievalConfig,
) -> Result<RetrievalResult, RetrievalError> {
    // Stage 1: directory gating.
    let top_directories = storage.search_by_directory(query_embedding, config.top_k_directories)?;
    let directories_searched: Vec<String> = top_directories.into_iter().map(|(dir, _)| dir).collect();
    let directory_filter = (!directories_searched.is_empty()).then_some(directories_searched.as_slice());

    // Stage 2: candidate search.
    let raw_candidates = storage.search_by_content(query_embedding, directory_filter, filters, config.max_candidates)?;
    let candidates_considered = raw_candidates.len();

    // Stage 3: ranking.
    let mut ranked: Vec<Candidate> = raw_candidates
        .into_iter()
        .map(|(memory, similarity)| {
            let score = similarity * 0.60 + memory.priority as f32 * 0.25 + memory.confidence.score() * 0.15;
            Candidate { memory, similarity, score }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.memory.priority.partial_cmp(&a.memory.priority).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.memory.path.cmp(&b.memory.path))
    });

    // Stage 4: diversity filter.
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in ranked {
        let is_diverse = kept.iter().all(|k| {
            cosine_similarity(&candidate.memory.composite_embedding, &k.memory.composite_embedding) < config.diversity_threshold
        });
        if is_diverse {
            kept.push(candidate);
        }
    }

    // Stage 5: budget selection.
    let mut entries = Vec::new();
    let mut excluded_for_budget = Vec::new();
    let mut running_total = 0usize;
    for candidate in &kept {
        let remaining = budget.saturating_sub(running_total);
        if candidate.memory.token_count <= remaining {
            running_total += candidate.memory.token_count;
            entries.push(MemoryPackEntry {
                path: candidate.memory.path.clone(),
                title: candidate.memory.title.clone(),
                content: candidate.memory.body.clone(),
                token_count: candidate.memory.token_count,
                relevance_score: candidate.score,
                source: EntrySource::Retrieved,
            });
        } else {
            excluded_for_budget.push(candidate.memory.path.clone());
        }
    }

    Ok(RetrievalResult {
        entries,
        total_tokens: running_total,
        directories_searched,
        candidates_considered,
        excluded_for_budget,
    })
}
