//! Reviewer (§4.L): validates a `WriteProposal` against schema, quality, duplicate and
//! conflict rules, then decides `approve` / `reject` / `defer` with a confidence score.

use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::config::{ReviewerConfig, ValidationConfig};
use crate::models::{
    Confidence, DuplicateMatch, IndexedMemory, MatchType, MemoryHeader, ProposalType,
    ReviewDecision, ReviewResult, Scope, Severity, Status, ValidationIssue, WriteProposal,
};
use crate::storage::Storage;

#[cfg(feature = "embeddings")]
use crate::embeddings::EmbeddingService;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[cfg(feature = "embeddings")]
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),
}

/// Issue codes that force `reject` regardless of error count, per §4.L's decision engine.
const CRITICAL_ISSUE_CODES: [&str; 8] = [
    "duplicate_exact",
    "duplicate_semantic",
    "missing_required_fields",
    "invalid_yaml",
    "invalid_type",
    "invalid_enum",
    "empty_content",
    "token_count_hard_limit",
];

/// Contradictory-token-pairs the conflict checker scans for (§4.L, extended to seven
/// pairs per the original reference implementation).
const CONTRADICTORY_PAIRS: [(&str, &str); 7] = [
    ("always", "never"),
    ("must", "must not"),
    ("use", "avoid"),
    ("enable", "disable"),
    ("sync", "async"),
    ("required", "forbidden"),
    ("tabs", "spaces"),
];

pub struct Reviewer<'a> {
    storage: &'a Storage,
    validation: &'a ValidationConfig,
    reviewer: &'a ReviewerConfig,
    #[cfg(feature = "embeddings")]
    embedder: &'a EmbeddingService,
}

impl<'a> Reviewer<'a> {
    #[cfg(feature = "embeddings")]
    pub fn new(storage: &'a Storage, validation: &'a ValidationConfig, reviewer: &'a ReviewerConfig, embedder: &'a EmbeddingService) -> Self {
        Self { storage, validation, reviewer, embedder }
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn new(storage: &'a Storage, validation: &'a ValidationConfig, reviewer: &'a ReviewerConfig) -> Self {
        Self { storage, validation, reviewer }
    }

    /// Runs the full validator pipeline against `proposal` and returns a `ReviewResult`.
    pub fn review(&self, proposal: &WriteProposal) -> Result<ReviewResult, ReviewError> {
        let start = Instant::now();

        if proposal.target_path.split('/').next() == Some("baseline")
            || (proposal.proposal_type == ProposalType::Promote && proposal.new_scope.as_deref() == Some("baseline"))
        {
            return Ok(ReviewResult {
                proposal_id: proposal.proposal_id.clone(),
                decision: ReviewDecision::Defer,
                confidence: 1.0,
                schema_valid: true,
                quality_valid: true,
                duplicate_check_passed: true,
                issues: Vec::new(),
                duplicates: Vec::new(),
                modified_content: None,
                modifications_applied: Vec::new(),
                notes: Some("Baseline modifications require human review".to_string()),
                review_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            });
        }

        let mut issues = Vec::new();
        let mut duplicates = Vec::new();
        let mut header: Option<MemoryHeader> = None;
        let mut body: Option<String> = None;

        if matches!(proposal.proposal_type, ProposalType::Create | ProposalType::Update) {
            let (h, b) = self.schema_validate(proposal, &mut issues);
            if let (Some(h), Some(b)) = (&h, &b) {
                self.quality_validate(h, b, &mut issues);
            }
            header = h;
            body = b;
        }

        let schema_valid = !issues.iter().any(|i| i.severity == Severity::Error);

        if schema_valid {
            if let (Some(header), Some(body)) = (&header, &body) {
                self.duplicate_check(proposal, header, body, &mut issues, &mut duplicates)?;
                self.conflict_check(header, body, &mut issues)?;
            }
        }

        let quality_valid = !issues.iter().any(|i| i.severity == Severity::Error);
        let duplicate_check_passed = !duplicates.iter().any(|d| d.match_type == MatchType::Exact);

        let (decision, confidence, notes) = Self::decide(&issues, self.reviewer.auto_approve_confidence);

        Ok(ReviewResult {
            proposal_id: proposal.proposal_id.clone(),
            decision,
            confidence,
            schema_valid,
            quality_valid,
            duplicate_check_passed,
            issues,
            duplicates,
            modified_content: None,
            modifications_applied: Vec::new(),
            notes,
            review_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Re-parses `proposal.content` as a memory file header + body (§4.L step 1).
    fn schema_validate(&self, proposal: &WriteProposal, issues: &mut Vec<ValidationIssue>) -> (Option<MemoryHeader>, Option<String>) {
        let Some(content) = &proposal.content else {
            issues.push(ValidationIssue::error("empty_content", "proposal carries no content to validate"));
            return (None, None);
        };

        let parsed = crate::parser::parse_memory_file(content.as_bytes(), &proposal.target_path, self.validation);
        let Some(memory) = parsed.memory else {
            match parsed.error {
                Some(crate::parser::ParserError::MissingFrontmatter) => {
                    issues.push(ValidationIssue::error("missing_frontmatter", "file must start with '---' and contain a closing '---' line"));
                }
                Some(crate::parser::ParserError::InvalidYaml(e)) => {
                    issues.push(ValidationIssue::error("invalid_yaml", e.to_string()));
                }
                Some(crate::parser::ParserError::MissingRequiredFields(fields)) => {
                    issues.push(
                        ValidationIssue::error("missing_required_fields", format!("missing required fields: {fields:?}"))
                            .with_field(fields.first().copied().unwrap_or_default()),
                    );
                }
                Some(crate::parser::ParserError::TokenCountHardLimit(count, max)) => {
                    issues.push(ValidationIssue::error(
                        "token_count_hard_limit",
                        format!("token count {count} exceeds hard limit {max}"),
                    ));
                }
                Some(crate::parser::ParserError::InvalidType { field, expected }) => {
                    issues.push(
                        ValidationIssue::error("invalid_type", format!("field '{field}' has the wrong type: expected {expected}"))
                            .with_field(field),
                    );
                }
                Some(crate::parser::ParserError::InvalidEnum { field, value, allowed }) => {
                    issues.push(
                        ValidationIssue::error("invalid_enum", format!("field '{field}' has an invalid value '{value}': expected one of {allowed:?}"))
                            .with_field(field),
                    );
                }
                Some(crate::parser::ParserError::Io(e)) => {
                    issues.push(ValidationIssue::error("invalid_yaml", e.to_string()));
                }
                None => {
                    issues.push(ValidationIssue::error("invalid_yaml", "unknown parse failure"));
                }
            }
            return (None, None);
        };

        if !(0.0..=1.0).contains(&memory.header.priority) {
            issues.push(
                ValidationIssue::error("out_of_range", format!("priority {} is not in [0, 1]", memory.header.priority))
                    .with_field("priority"),
            );
        }

        if !memory.header.id.starts_with("mem_") {
            issues.push(
                ValidationIssue::warning("invalid_format", "id does not follow the 'mem_YYYY_MM_DD_NNN' convention")
                    .with_field("id"),
            );
        }

        if memory.header.tags.is_empty() {
            issues.push(ValidationIssue::warning("empty_tags", "memory carries no tags").with_field("tags"));
        }

        if memory.header.scope == Scope::Ephemeral && memory.header.expires.is_none() {
            issues.push(ValidationIssue::warning("missing_expires", "ephemeral-scope memory has no expires date").with_field("expires"));
        }

        if memory.header.confidence == Confidence::Deprecated && memory.header.status == Status::Active {
            issues.push(ValidationIssue::warning(
                "status_mismatch",
                "confidence is 'deprecated' but status is 'active'",
            ));
        }

        if memory.body.trim().is_empty() {
            issues.push(ValidationIssue::error("empty_body", "body is empty"));
        }

        if memory.title.is_empty() {
            issues.push(ValidationIssue::warning("missing_title", "body has no leading '# ' heading").with_field("title"));
        }

        for warning in &parsed.warnings {
            match warning.kind {
                crate::parser::WarningKind::LowTokenCount => issues.push(ValidationIssue::warning("token_count_low", &warning.message)),
                crate::parser::WarningKind::HighTokenCount => issues.push(ValidationIssue::warning("token_count_high", &warning.message)),
                crate::parser::WarningKind::MissingTitle => {}
            }
        }

        (Some(memory.header), Some(memory.body))
    }

    /// Heuristic quality checks beyond strict schema validity (§4.L step 2).
    fn quality_validate(&self, header: &MemoryHeader, body: &str, issues: &mut Vec<ValidationIssue>) {
        let heading_count = body.lines().filter(|l| l.trim_start().starts_with("# ")).count();
        if heading_count > 1 {
            issues.push(ValidationIssue::warning("multiple_concepts", format!("body contains {heading_count} top-level headings; prefer one memory per concept")));
        }

        const VAGUE_TITLES: [&str; 4] = ["notes", "misc", "update", "stuff"];
        let title = body
            .lines()
            .find_map(|line| line.trim_start().strip_prefix("# ").map(|t| t.trim().to_string()))
            .unwrap_or_default();
        if VAGUE_TITLES.contains(&title.to_lowercase().as_str()) {
            issues.push(ValidationIssue::warning("vague_title", format!("title '{title}' is too generic")).with_field("title"));
        }

        if header.tags.len() > 8 {
            issues.push(ValidationIssue::info("too_many_tags", format!("{} tags is unusually many", header.tags.len())));
        } else if !header.tags.is_empty() && header.tags.len() == 1 {
            issues.push(ValidationIssue::info("too_few_tags", "only one tag; consider adding related tags"));
        }

        let mut seen = std::collections::HashSet::new();
        for tag in &header.tags {
            if !seen.insert(tag.to_lowercase()) {
                issues.push(ValidationIssue::info("duplicate_tag", format!("tag '{tag}' appears more than once")).with_field("tags"));
            }
        }

        if body.len() < 40 {
            issues.push(ValidationIssue::info("missing_rationale", "body is very short; consider stating the rationale"));
        }

        let title_lower = title.to_lowercase();
        let coherent = header.tags.iter().any(|t| title_lower.contains(&t.to_lowercase()));
        if !header.tags.is_empty() && !title_lower.is_empty() && !coherent {
            issues.push(ValidationIssue::warning("low_coherence", "title does not reference any of the memory's tags"));
        }
    }

    /// Exact, semantic and tag-overlap duplicate detection against existing active
    /// memories (§4.L step 3).
    #[cfg(feature = "embeddings")]
    fn duplicate_check(
        &self,
        proposal: &WriteProposal,
        header: &MemoryHeader,
        body: &str,
        issues: &mut Vec<ValidationIssue>,
        duplicates: &mut Vec<DuplicateMatch>,
    ) -> Result<(), ReviewError> {
        let body_hash = {
            let mut hasher = Sha256::new();
            hasher.update(body.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        let existing = self.storage.list_all_memories(false)?;
        let directory = crate::parser::directory_of(&proposal.target_path);
        let composite = self.embedder.embed_memory(directory, "", &header.tags, header.scope.as_str(), body)?.0;

        for candidate in &existing {
            if Some(candidate.id.as_str()) == proposal.memory_id.as_deref() {
                continue;
            }

            let candidate_hash = {
                let mut hasher = Sha256::new();
                hasher.update(candidate.body.as_bytes());
                format!("{:x}", hasher.finalize())
            };
            if candidate_hash == body_hash {
                issues.push(ValidationIssue::error("duplicate_exact", format!("body is byte-identical to existing memory {}", candidate.path)));
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity: 1.0, match_type: MatchType::Exact });
                continue;
            }

            if candidate.composite_embedding.is_empty() {
                continue;
            }
            let similarity = crate::embeddings::cosine_similarity(&composite.vector, &candidate.composite_embedding).max(0.0);
            if similarity >= self.reviewer.duplicate_exact {
                issues.push(ValidationIssue::error("duplicate_exact", format!("near byte-identical to existing memory {} (similarity {similarity:.3})", candidate.path)));
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity, match_type: MatchType::Exact });
            } else if similarity >= self.reviewer.duplicate_semantic {
                issues.push(ValidationIssue::error("duplicate_semantic", format!("semantically duplicates existing memory {} (similarity {similarity:.3})", candidate.path)));
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity, match_type: MatchType::Semantic });
            } else if similarity >= self.reviewer.duplicate_warning {
                issues.push(ValidationIssue::warning("similar_memory", format!("similar to existing memory {} (similarity {similarity:.3})", candidate.path)));
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity, match_type: MatchType::Similar });
            }
        }

        self.tag_overlap_check(proposal, header, &existing, duplicates);
        Ok(())
    }

    #[cfg(not(feature = "embeddings"))]
    fn duplicate_check(
        &self,
        proposal: &WriteProposal,
        header: &MemoryHeader,
        body: &str,
        issues: &mut Vec<ValidationIssue>,
        duplicates: &mut Vec<DuplicateMatch>,
    ) -> Result<(), ReviewError> {
        let body_hash = {
            let mut hasher = Sha256::new();
            hasher.update(body.as_bytes());
            format!("{:x}", hasher.finalize())
        };
        let existing = self.storage.list_all_memories(false)?;
        for candidate in &existing {
            if Some(candidate.id.as_str()) == proposal.memory_id.as_deref() {
                continue;
            }
            let candidate_hash = {
                let mut hasher = Sha256::new();
                hasher.update(candidate.body.as_bytes());
                format!("{:x}", hasher.finalize())
            };
            if candidate_hash == body_hash {
                issues.push(ValidationIssue::error("duplicate_exact", format!("body is byte-identical to existing memory {}", candidate.path)));
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity: 1.0, match_type: MatchType::Exact });
            }
        }
        self.tag_overlap_check(proposal, header, &existing, duplicates);
        Ok(())
    }

    /// Tag-overlap duplicate signal folded in as a secondary match type (§4.L
    /// supplement): overlap ratio ≥ 0.5 against an existing memory's tag set.
    fn tag_overlap_check(&self, proposal: &WriteProposal, header: &MemoryHeader, existing: &[IndexedMemory], duplicates: &mut Vec<DuplicateMatch>) {
        if header.tags.is_empty() {
            return;
        }
        for candidate in existing {
            if Some(candidate.id.as_str()) == proposal.memory_id.as_deref() || candidate.tags.is_empty() {
                continue;
            }
            let shared = header.tags.iter().filter(|t| candidate.tags.contains(t)).count();
            let union = header.tags.len().max(candidate.tags.len());
            let overlap = shared as f32 / union as f32;
            if overlap >= 0.5 && !duplicates.iter().any(|d| d.memory_id == candidate.id) {
                duplicates.push(DuplicateMatch { memory_id: candidate.id.clone(), memory_path: candidate.path.clone(), similarity: overlap, match_type: MatchType::TagOverlap });
            }
        }
    }

    /// Lightweight conflict checker (§4.L step 4): flags asymmetric contradictory
    /// phrasing between the proposal and a tag-sharing existing memory.
    fn conflict_check(&self, header: &MemoryHeader, body: &str, issues: &mut Vec<ValidationIssue>) -> Result<(), ReviewError> {
        if header.tags.len() < 2 {
            return Ok(());
        }
        let proposal_body = body.to_lowercase();
        let existing = self.storage.find_by_tag_overlap(&header.tags)?;

        for candidate in existing {
            let shared = header.tags.iter().filter(|t| candidate.tags.contains(t)).count();
            if shared < 2 {
                continue;
            }
            let candidate_body = candidate.body.to_lowercase();
            for (left, right) in CONTRADICTORY_PAIRS {
                let proposal_has_left = proposal_body.contains(left);
                let candidate_has_right = candidate_body.contains(right);
                let proposal_has_right = proposal_body.contains(right);
                let candidate_has_left = candidate_body.contains(left);
                let asymmetric = (proposal_has_left && candidate_has_right && !proposal_has_right)
                    || (proposal_has_right && candidate_has_left && !proposal_has_left);
                if asymmetric {
                    issues.push(ValidationIssue::warning(
                        "conflict_warning",
                        format!("potentially contradicts existing memory {} on '{left}'/'{right}'", candidate.path),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The decision engine (§4.L): maps collected issues to a decision and confidence.
    /// `auto_approve_confidence` is the floor above which a warnings-only proposal may
    /// be approved automatically; below it the proposal is deferred for human review.
    fn decide(issues: &[ValidationIssue], auto_approve_confidence: f32) -> (ReviewDecision, f32, Option<String>) {
        let errors: Vec<&ValidationIssue> = issues.iter().filter(|i| i.severity == Severity::Error).collect();
        let warnings: Vec<&ValidationIssue> = issues.iter().filter(|i| i.severity == Severity::Warning).collect();

        if !errors.is_empty() {
            let confidence = if errors.iter().any(|e| CRITICAL_ISSUE_CODES.contains(&e.code.as_str())) {
                1.0
            } else {
                (0.8 + 0.05 * errors.len() as f32).min(1.0)
            };
            let notes = errors.iter().take(5).map(|e| format!("{}: {}", e.code, e.message)).collect::<Vec<_>>().join("; ");
            return (ReviewDecision::Reject, confidence, Some(notes));
        }

        if warnings.is_empty() {
            return (ReviewDecision::Approve, 1.0, None);
        }

        const MINOR_CODES: [&str; 4] = ["missing_rationale", "low_coherence", "vague_tag", "missing_title"];
        let deduction: f32 = warnings
            .iter()
            .map(|w| if MINOR_CODES.contains(&w.code.as_str()) { 0.02 } else { 0.05 })
            .sum();
        let confidence = (1.0 - deduction).max(0.5);

        if confidence >= auto_approve_confidence {
            let notes = Some(format!("{} warning(s) surfaced during review", warnings.len()));
            (ReviewDecision::Approve, confidence, notes)
        } else {
            let notes = warnings.iter().take(5).map(|w| format!("{}: {}", w.code, w.message)).collect::<Vec<_>>().join("; ");
            (ReviewDecision::Defer, confidence, Some(format!("confidence {confidence:.2} below auto-approve threshold {auto_approve_confidence:.2}: {notes}")))
        }
    }

    /// Standalone top-N nearest-memory lookup by composite similarity, independent of
    /// the proposal-review pipeline (kept as a read-side helper for future UI use).
    #[cfg(feature = "embeddings")]
    pub fn find_similar(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<(IndexedMemory, f32)>, ReviewError> {
        let existing = self.storage.list_all_memories(false)?;
        let mut scored: Vec<(IndexedMemory, f32)> = existing
            .into_iter()
            .filter(|m| !m.composite_embedding.is_empty())
            .map(|m| {
                let sim = crate::embeddings::cosine_similarity(query_embedding, &m.composite_embedding).max(0.0);
                (m, sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
#[cfg(not(feature = "embeddings"))]
mod tests {
    use super::*;
    use crate::config::{ReviewerConfig, ValidationConfig};
    use std::path::PathBuf;

    fn proposal_with_content(content: &str) -> WriteProposal {
        let mut p = WriteProposal::new(ProposalType::Create, "project/new.md".to_string(), "adding context".to_string(), "agent".to_string());
        p.content = Some(content.to_string());
        p
    }

    #[test]
    fn baseline_target_is_always_deferred() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();
        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

        let mut proposal = proposal_with_content("---\nid: mem_2026_01_01_001\ntags: [a]\nscope: baseline\npriority: 1.0\nconfidence: active\nstatus: active\n---\n\n# T\n\nbody");
        proposal.target_path = "baseline/identity.md".to_string();
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Defer);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn missing_frontmatter_is_rejected_with_full_confidence() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();
        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

        let proposal = proposal_with_content("no frontmatter here");
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Reject);
        assert_eq!(result.confidence, 1.0);
        assert!(result.errors().any(|e| e.code == "missing_frontmatter"));
    }

    #[test]
    fn clean_proposal_with_no_issues_is_approved() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();
        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

        let body = "word ".repeat(400);
        let content = format!("---\nid: mem_2026_01_01_002\ntags: [auth, jwt]\nscope: project\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# Auth Jwt Rotation\n\n{body}\n");
        let proposal = proposal_with_content(&content);
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Approve);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn exact_duplicate_body_is_rejected() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();

        let body = "word ".repeat(400);
        let existing = IndexedMemory {
            id: "mem_2026_01_01_003".to_string(),
            path: "project/existing.md".to_string(),
            title: "Existing".to_string(),
            body: format!("# Existing\n\n{body}\n"),
            tags: vec!["auth".to_string()],
            scope: Scope::Project,
            priority: 0.5,
            confidence: Confidence::Active,
            status: Status::Active,
            directory: "project".to_string(),
            file_hash: "h".to_string(),
            token_count: 400,
            composite_embedding: vec![],
            directory_embedding: vec![],
            indexed_at: chrono::Utc::now(),
            created: None,
            last_used: None,
            usage_count: None,
            supersedes: None,
            related: vec![],
            expires: None,
        };
        storage.upsert_memory(&existing).unwrap();

        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);
        let content = format!("---\nid: mem_2026_01_01_004\ntags: [auth]\nscope: project\npriority: 0.5\nconfidence: active\nstatus: active\n---\n\n# Existing\n\n{body}\n");
        let proposal = proposal_with_content(&content);
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Reject);
        assert!(result.errors().any(|e| e.code == "duplicate_exact"));
    }

    #[test]
    fn warnings_below_auto_approve_threshold_are_deferred() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();
        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

        // "bad_id" (not "mem_"-prefixed) and confidence=deprecated/status=active each
        // raise a non-minor warning (0.05 deduction apiece), landing confidence at
        // 0.90 -- below the default 0.95 auto-approve threshold.
        let body = "word ".repeat(400);
        let content = format!("---\nid: bad_id_2026\ntags: [config]\nscope: project\npriority: 0.5\nconfidence: deprecated\nstatus: active\n---\n\n# Config Notes\n\n{body}\n");
        let proposal = proposal_with_content(&content);
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Defer);
        assert!(result.confidence < reviewer_cfg.auto_approve_confidence);
        assert!(result.warnings().any(|w| w.code == "invalid_format"));
        assert!(result.warnings().any(|w| w.code == "status_mismatch"));
    }

    #[test]
    fn out_of_range_priority_is_rejected() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let validation = ValidationConfig::default();
        let reviewer_cfg = ReviewerConfig::default();
        let reviewer = Reviewer::new(&storage, &validation, &reviewer_cfg);

        let body = "word ".repeat(400);
        let content = format!("---\nid: mem_2026_01_01_005\ntags: [a]\nscope: project\npriority: 1.5\nconfidence: active\nstatus: active\n---\n\n# T\n\n{body}\n");
        let proposal = proposal_with_content(&content);
        let result = reviewer.review(&proposal).unwrap();
        assert_eq!(result.decision, ReviewDecision::Reject);
        assert!(result.errors().any(|e| e.code == "out_of_range"));
    }
}
