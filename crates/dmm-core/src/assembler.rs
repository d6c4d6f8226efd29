//! Pack Assembler (§4.J): combines the baseline pack and a retrieval result into a
//! single ordered, budget-respecting `MemoryPack`.

use chrono::Utc;

use crate::models::{BaselinePack, MemoryPack, MemoryPackEntry};

const SCOPE_PRIORITY: [&str; 5] = ["global", "agent", "project", "ephemeral", "other"];

fn scope_of(entry: &MemoryPackEntry) -> &str {
    let candidate = entry.path.split('/').next().unwrap_or("other");
    if SCOPE_PRIORITY.contains(&candidate) {
        candidate
    } else {
        "other"
    }
}

fn scope_rank(entry: &MemoryPackEntry) -> usize {
    SCOPE_PRIORITY.iter().position(|s| *s == scope_of(entry)).unwrap_or(SCOPE_PRIORITY.len())
}

/// Assembles baseline entries (order preserved) followed by retrieved entries sorted
/// by scope priority then score (§4.J).
pub fn assemble(
    query: &str,
    baseline_pack: &BaselinePack,
    retrieval: &crate::retrieval::RetrievalResult,
    budget: usize,
) -> MemoryPack {
    let mut retrieved_entries = retrieval.entries.clone();
    retrieved_entries.sort_by(|a, b| {
        scope_rank(a)
            .cmp(&scope_rank(b))
            .then_with(|| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal))
    });

    let baseline_tokens = baseline_pack.total_tokens;
    let retrieved_tokens: usize = retrieved_entries.iter().map(|e| e.token_count).sum();

    MemoryPack {
        generated_at: Utc::now(),
        query: query.to_string(),
        baseline_tokens,
        retrieved_tokens,
        total_tokens: baseline_tokens + retrieved_tokens,
        budget,
        baseline_entries: baseline_pack.entries.clone(),
        retrieved_entries,
        included_paths: Vec::new(),
        excluded_paths: retrieval.excluded_for_budget.clone(),
    }
}

/// The token budget available to retrieved entries once the baseline has been
/// accounted for: `max(0, budget - baseline_tokens)` (§4.J budget invariant).
pub fn retrieved_budget(budget: usize, baseline_tokens: usize) -> usize {
    budget.saturating_sub(baseline_tokens)
}
