//! Quantified invariants (§8 "Testable properties"), exercised end-to-end against
//! `dmm-core`'s public surface. Follows the same feature split as `scenarios.rs`:
//! the embeddings-gated tests exercise `retrieval`/`assembler`, which only exist when
//! dmm-core is built with embeddings; the rest run in the default (no-embeddings) build.

use std::path::PathBuf;

use chrono::Utc;

use dmm_core::config::ValidationConfig;
use dmm_core::models::{Confidence, IndexedMemory, Scope, Status};
use dmm_core::parser::{file_hash, parse_memory_file};
use dmm_core::storage::Storage;

fn sample_content(id: &str, body_tokens: usize) -> String {
    let body = "word ".repeat(body_tokens);
    format!("---\nid: {id}\ntags: [auth, jwt]\nscope: project\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# JWT Rotation\n\n{body}\n")
}

fn indexed_memory(path: &str, body: &str, hash: &str, embedding: Vec<f32>) -> IndexedMemory {
    IndexedMemory {
        id: uuid::Uuid::new_v4().to_string(),
        path: path.to_string(),
        title: "T".to_string(),
        body: body.to_string(),
        tags: vec!["auth".to_string()],
        scope: Scope::Project,
        priority: 0.5,
        confidence: Confidence::Active,
        status: Status::Active,
        directory: "project".to_string(),
        file_hash: hash.to_string(),
        token_count: 100,
        composite_embedding: embedding.clone(),
        directory_embedding: embedding,
        indexed_at: Utc::now(),
        created: None,
        last_used: None,
        usage_count: None,
        supersedes: None,
        related: vec![],
        expires: None,
    }
}

/// 1. Round-trip: `parse(serialize(M)) == M` up to whitespace normalization of the body.
#[test]
fn round_trip_parse_serialize_preserves_header_and_body() {
    let validation = ValidationConfig::default();
    let raw = sample_content("mem_2026_01_01_100", 400);

    let first = parse_memory_file(raw.as_bytes(), "project/jwt.md", &validation);
    let memory = first.memory.expect("well-formed content must parse");

    let serialized = memory.serialize().unwrap();
    let second = parse_memory_file(serialized.as_bytes(), "project/jwt.md", &validation);
    let reparsed = second.memory.expect("serialized content must re-parse");

    assert_eq!(reparsed.header.id, memory.header.id);
    assert_eq!(reparsed.header.scope, memory.header.scope);
    assert_eq!(reparsed.header.priority, memory.header.priority);
    assert_eq!(reparsed.header.confidence, memory.header.confidence);
    assert_eq!(reparsed.header.tags, memory.header.tags);
    assert_eq!(reparsed.title, memory.title);
    assert_eq!(reparsed.body.trim(), memory.body.trim());
}

/// 2. Hash stability: byte-identical files hash identically; a single-byte mutation
/// changes the hash.
#[test]
fn hash_stability_and_single_byte_sensitivity() {
    let raw = sample_content("mem_2026_01_01_101", 400);
    assert_eq!(file_hash(raw.as_bytes()), file_hash(raw.as_bytes()));

    let mut mutated = raw.clone().into_bytes();
    let last = mutated.len() - 1;
    mutated[last] = if mutated[last] == b'\n' { b'!' } else { b'\n' };
    assert_ne!(file_hash(raw.as_bytes()), file_hash(&mutated));
}

/// 9. Transition validity: the proposal queue accepts only transitions defined by the
/// DAG of §3 and rejects everything else.
#[test]
fn queue_rejects_transitions_outside_the_dag() {
    use dmm_core::models::{ProposalStatus, ProposalType, WriteProposal};
    use dmm_core::proposal_queue::{ProposalQueue, QueueError};

    let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
    let queue = ProposalQueue::new(&storage);
    let proposal = WriteProposal::new(ProposalType::Create, "project/a.md".to_string(), "new memory".to_string(), "agent".to_string());
    queue.enqueue(&proposal).unwrap();

    // Pending -> Committed skips review and approval entirely: must be rejected.
    let err = queue.update_status(&proposal.proposal_id, ProposalStatus::Committed, None).unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition(ProposalStatus::Pending, ProposalStatus::Committed)));

    // Walk the legal path...
    queue.update_status(&proposal.proposal_id, ProposalStatus::InReview, None).unwrap();
    queue.update_status(&proposal.proposal_id, ProposalStatus::Approved, None).unwrap();

    // ...and confirm a terminal state can't slide back to an arbitrary earlier one.
    queue.update_status(&proposal.proposal_id, ProposalStatus::Committed, None).unwrap();
    let err = queue.update_status(&proposal.proposal_id, ProposalStatus::InReview, None).unwrap_err();
    assert!(matches!(err, QueueError::InvalidTransition(ProposalStatus::Committed, ProposalStatus::InReview)));
}

/// 10. Duplicate sensitivity: a proposal whose body hash equals an active memory's body
/// hash is rejected with `duplicate_exact`, regardless of a differing id or target path.
#[test]
fn duplicate_exact_body_is_always_rejected() {
    use dmm_core::config::ReviewerConfig;
    use dmm_core::models::{ProposalType, ReviewDecision, WriteProposal};
    use dmm_core::reviewer::Reviewer;

    let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
    let body = "word ".repeat(400);
    let existing = indexed_memory("project/existing.md", &format!("# Existing\n\n{body}\n"), "h1", vec![]);
    storage.upsert_memory(&existing).unwrap();

    let validation = ValidationConfig::default();
    let reviewer_cfg = ReviewerConfig::default();
    let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

    let mut proposal = WriteProposal::new(ProposalType::Create, "project/other.md".to_string(), "duplicate attempt".to_string(), "agent".to_string());
    proposal.content = Some(format!("---\nid: mem_2026_01_01_102\ntags: [auth]\nscope: project\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# Existing\n\n{body}\n"));

    let result = reviewer.review(&proposal).unwrap();
    assert_eq!(result.decision, ReviewDecision::Reject);
    assert!(result.errors().any(|e| e.code == "duplicate_exact"));
}

#[cfg(feature = "embeddings")]
mod embedding_gated {
    use super::*;
    use dmm_core::baseline::BaselineManager;
    use dmm_core::config::RetrievalConfig;
    use dmm_core::models::SearchFilters;

    fn baseline_entry(path: &str, token_count: usize) -> IndexedMemory {
        IndexedMemory {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.to_string(),
            title: "B".to_string(),
            body: "word ".repeat(token_count),
            tags: vec![],
            scope: Scope::Baseline,
            priority: 1.0,
            confidence: Confidence::Stable,
            status: Status::Active,
            directory: "baseline".to_string(),
            file_hash: format!("hash-{path}"),
            token_count,
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

    /// 3. Budget correctness: `baseline_tokens + retrieved_tokens == total_tokens`, and
    /// the total never exceeds `budget` (this engine's budget selection is strict — a
    /// candidate that would overshoot is excluded rather than allowed to push past it).
    #[test]
    fn budget_arithmetic_never_overshoots() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        storage.upsert_memory(&baseline_entry("baseline/identity.md", 150)).unwrap();
        for i in 0..4 {
            let mut embedding = vec![0.0f32; 4];
            embedding[i] = 1.0;
            storage.upsert_memory(&indexed_memory(&format!("project/m{i}.md"), "word ".repeat(100).as_str(), &format!("h{i}"), embedding)).unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let baseline_manager = BaselineManager::new(&storage, dir.path());
        let baseline_pack = baseline_manager.get_baseline_pack().unwrap();

        let budget = 300;
        let retrieved_budget = dmm_core::assembler::retrieved_budget(budget, baseline_pack.total_tokens);
        let config = RetrievalConfig::default();
        let query_embedding = vec![1.0, 0.0, 0.0, 0.0];
        let retrieval = dmm_core::retrieval::retrieve(&storage, &query_embedding, retrieved_budget, &SearchFilters::default(), &config).unwrap();
        let pack = dmm_core::assembler::assemble("q", &baseline_pack, &retrieval, budget);

        assert_eq!(pack.total_tokens, pack.baseline_tokens + pack.retrieved_tokens);
        assert!(pack.total_tokens <= budget);
    }

    /// 4. Baseline dominance: every baseline entry appears in the assembled pack and
    /// none of them are ever excluded for budget.
    #[test]
    fn baseline_entries_are_never_excluded() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        storage.upsert_memory(&baseline_entry("baseline/identity.md", 200)).unwrap();
        storage.upsert_memory(&baseline_entry("baseline/hard_constraints.md", 200)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let baseline_manager = BaselineManager::new(&storage, dir.path());
        let baseline_pack = baseline_manager.get_baseline_pack().unwrap();

        // A budget far too small to ever accommodate the baseline; dominance still
        // requires every baseline entry to survive assembly.
        let budget = 10;
        let config = RetrievalConfig::default();
        let retrieval = dmm_core::retrieval::retrieve(&storage, &[0.0; 4], 0, &SearchFilters::default(), &config).unwrap();
        let pack = dmm_core::assembler::assemble("q", &baseline_pack, &retrieval, budget);

        assert_eq!(pack.baseline_entries.len(), 2);
        let baseline_paths: Vec<&str> = pack.baseline_entries.iter().map(|e| e.path.as_str()).collect();
        assert!(baseline_paths.contains(&"baseline/identity.md"));
        assert!(baseline_paths.contains(&"baseline/hard_constraints.md"));
        assert!(!pack.excluded_paths.iter().any(|p| baseline_paths.contains(&p.as_str())));
    }

    /// 5. Diversity: no two retrieved entries exceed the configured cosine-similarity
    /// ceiling against each other.
    #[test]
    fn diversity_filter_drops_near_duplicate_candidates() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        // Two near-identical composite embeddings (cosine ~1.0) plus one orthogonal one.
        storage.upsert_memory(&indexed_memory("project/a.md", "word ".repeat(100).as_str(), "ha", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        storage.upsert_memory(&indexed_memory("project/b.md", "word ".repeat(100).as_str(), "hb", vec![0.999, 0.001, 0.0, 0.0])).unwrap();
        storage.upsert_memory(&indexed_memory("project/c.md", "word ".repeat(100).as_str(), "hc", vec![0.0, 1.0, 0.0, 0.0])).unwrap();

        let mut config = RetrievalConfig::default();
        config.diversity_threshold = 0.92;
        let query_embedding = vec![0.8, 0.2, 0.0, 0.0];
        let retrieval = dmm_core::retrieval::retrieve(&storage, &query_embedding, 10_000, &SearchFilters::default(), &config).unwrap();

        let kept_embeddings: Vec<Vec<f32>> = retrieval
            .entries
            .iter()
            .filter_map(|e| storage.get_memory_by_path(&e.path).ok().flatten())
            .map(|m| m.composite_embedding)
            .collect();
        for i in 0..kept_embeddings.len() {
            for j in (i + 1)..kept_embeddings.len() {
                let sim = dmm_core::embeddings::cosine_similarity(&kept_embeddings[i], &kept_embeddings[j]);
                assert!(sim < config.diversity_threshold, "entries {i} and {j} exceed the diversity ceiling ({sim})");
            }
        }
        assert!(retrieval.entries.len() < 3, "a or b must be dropped as a near-duplicate");
    }

    /// 6. Ordering determinism: an identical store and an identical query always
    /// produce an identical ordered list of paths.
    #[test]
    fn identical_query_against_identical_store_is_deterministic() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        for i in 0..6 {
            let mut embedding = vec![0.0f32; 6];
            embedding[i] = 1.0;
            storage.upsert_memory(&indexed_memory(&format!("project/m{i}.md"), "word ".repeat(100).as_str(), &format!("h{i}"), embedding)).unwrap();
        }

        let config = RetrievalConfig::default();
        let query_embedding = vec![0.5, 0.5, 0.0, 0.0, 0.0, 0.0];
        let first = dmm_core::retrieval::retrieve(&storage, &query_embedding, 10_000, &SearchFilters::default(), &config).unwrap();
        let second = dmm_core::retrieval::retrieve(&storage, &query_embedding, 10_000, &SearchFilters::default(), &config).unwrap();

        let first_paths: Vec<&str> = first.entries.iter().map(|e| e.path.as_str()).collect();
        let second_paths: Vec<&str> = second.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(first_paths, second_paths);
    }
}

#[cfg(not(feature = "embeddings"))]
mod non_embedding_gated {
    use super::*;
    use dmm_core::commit::CommitEngine;
    use dmm_core::indexer::Indexer;
    use dmm_core::models::{ProposalStatus, ProposalType, WriteProposal};
    use std::fs;

    /// 7. Incremental idempotence: indexing an unchanged file a second time performs no
    /// reprocessing — the stored `indexed_at` (not just the hash) is left untouched.
    #[test]
    fn reindexing_unchanged_bytes_does_not_touch_the_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("project")).unwrap();
        let path = dir.path().join("project/f.md");
        let content = sample_content("mem_2026_01_01_110", 400);
        fs::write(&path, &content).unwrap();

        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let indexer = Indexer::new(dir.path().to_path_buf(), &storage, ValidationConfig::default());

        assert!(indexer.index_file(&path).unwrap());
        let first = storage.get_memory_by_path("project/f.md").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!indexer.index_file(&path).unwrap(), "unchanged bytes must perform zero parse/embed/upsert work");
        let second = storage.get_memory_by_path("project/f.md").unwrap().unwrap();

        assert_eq!(first.file_hash, second.file_hash);
        assert_eq!(first.indexed_at, second.indexed_at, "a no-op index must not re-stamp indexed_at");
    }

    /// 8. Commit atomicity: a commit that fails during materialization (here, an update
    /// whose content no longer passes schema validation) leaves the on-disk file exactly
    /// as it was pre-commit, and the proposal is marked `failed` rather than `committed`.
    #[test]
    fn failed_commit_leaves_original_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();

        let original_content = sample_content("mem_2026_01_01_111", 400);
        fs::create_dir_all(dir.path().join("project")).unwrap();
        let path = dir.path().join("project/f.md");
        fs::write(&path, &original_content).unwrap();

        let indexer = Indexer::new(dir.path().to_path_buf(), &storage, ValidationConfig::default());
        indexer.index_file(&path).unwrap();
        let memory = storage.get_memory_by_path("project/f.md").unwrap().unwrap();

        let mut proposal = WriteProposal::new(ProposalType::Update, "project/f.md".to_string(), "broken update".to_string(), "agent".to_string());
        proposal.memory_id = Some(memory.id.clone());
        proposal.content = Some("not a valid memory file at all".to_string());
        proposal.status = ProposalStatus::Approved;
        storage.insert_proposal(&proposal).unwrap();

        let engine = CommitEngine::new(dir.path().to_path_buf(), &storage, ValidationConfig::default());
        let result = engine.commit(&proposal.proposal_id).unwrap();

        assert!(!result.success);
        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, original_content, "a failed commit must not alter the on-disk file");

        let failed_proposal = storage.get_proposal(&proposal.proposal_id).unwrap().unwrap();
        assert_eq!(failed_proposal.status, ProposalStatus::Failed);
    }
}
