//! Commit Engine (§4.M): applies an approved `WriteProposal` to the on-disk memory
//! root atomically, then triggers a targeted reindex. A commit either fully succeeds
//! or the file is restored to its pre-commit state (§7 "all-or-nothing").

use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ValidationConfig;
use crate::indexer::Indexer;
use crate::models::{CommitResult, ProposalStatus, ProposalType, Scope, Status, WriteProposal};
use crate::storage::Storage;

#[cfg(feature = "embeddings")]
use crate::embeddings::EmbeddingService;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("proposal not found: {0}")]
    NotFound(String),
    #[error("proposal {0} is not approved")]
    NotApproved(String),
}

/// An internal materialization failure, carrying whatever rollback was attempted.
struct MaterializeFailure {
    message: String,
    rollback_performed: bool,
    rollback_success: Option<bool>,
}

impl MaterializeFailure {
    fn simple(message: impl Into<String>) -> Self {
        Self { message: message.into(), rollback_performed: false, rollback_success: None }
    }
}

struct Materialized {
    memory_id: String,
    memory_path: String,
    reindex_duration_ms: f64,
}

pub struct CommitEngine<'a> {
    root: PathBuf,
    storage: &'a Storage,
    validation: ValidationConfig,
    #[cfg(feature = "embeddings")]
    embedder: &'a EmbeddingService,
}

impl<'a> CommitEngine<'a> {
    #[cfg(feature = "embeddings")]
    pub fn new(root: PathBuf, storage: &'a Storage, validation: ValidationConfig, embedder: &'a EmbeddingService) -> Self {
        Self { root, storage, validation, embedder }
    }

    #[cfg(not(feature = "embeddings"))]
    pub fn new(root: PathBuf, storage: &'a Storage, validation: ValidationConfig) -> Self {
        Self { root, storage, validation }
    }

    fn indexer(&self) -> Indexer<'a> {
        #[cfg(feature = "embeddings")]
        {
            Indexer::new(self.root.clone(), self.storage, self.validation.clone(), self.embedder)
        }
        #[cfg(not(feature = "embeddings"))]
        {
            Indexer::new(self.root.clone(), self.storage, self.validation.clone())
        }
    }

    /// Runs preflight, materialization, reindex and bookkeeping for `proposal_id`
    /// (§4.M steps 1-5).
    pub fn commit(&self, proposal_id: &str) -> Result<CommitResult, CommitError> {
        let start = Instant::now();
        let proposal = self.storage.get_proposal(proposal_id)?.ok_or_else(|| CommitError::NotFound(proposal_id.to_string()))?;
        if proposal.status != ProposalStatus::Approved {
            return Err(CommitError::NotApproved(proposal_id.to_string()));
        }

        match self.materialize(&proposal) {
            Ok(m) => {
                self.storage.update_proposal_commit(proposal_id, ProposalStatus::Committed, Some(&m.memory_id), None)?;
                self.storage.record_audit_entry(proposal_id, Some(&m.memory_id), &m.memory_path, "committed")?;
                Ok(CommitResult {
                    proposal_id: proposal_id.to_string(),
                    success: true,
                    memory_id: Some(m.memory_id),
                    memory_path: Some(m.memory_path),
                    error: None,
                    rollback_performed: false,
                    rollback_success: None,
                    commit_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                    reindex_duration_ms: m.reindex_duration_ms,
                })
            }
            Err(failure) => {
                self.storage.update_proposal_commit(proposal_id, ProposalStatus::Failed, None, Some(&failure.message))?;
                self.storage.record_audit_entry(proposal_id, None, &proposal.target_path, "commit_failed")?;
                Ok(CommitResult {
                    proposal_id: proposal_id.to_string(),
                    success: false,
                    memory_id: None,
                    memory_path: None,
                    error: Some(failure.message),
                    rollback_performed: failure.rollback_performed,
                    rollback_success: failure.rollback_success,
                    commit_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                    reindex_duration_ms: 0.0,
                })
            }
        }
    }

    fn materialize(&self, proposal: &WriteProposal) -> Result<Materialized, MaterializeFailure> {
        match proposal.proposal_type {
            ProposalType::Create => self.create(proposal),
            ProposalType::Update => self.update(proposal),
            ProposalType::Deprecate => self.deprecate(proposal),
            ProposalType::Promote => self.promote(proposal),
        }
    }

    fn create(&self, proposal: &WriteProposal) -> Result<Materialized, MaterializeFailure> {
        let content = proposal.content.as_deref().ok_or_else(|| MaterializeFailure::simple("create proposal carries no content"))?;
        let parsed = crate::parser::parse_memory_file(content.as_bytes(), &proposal.target_path, &self.validation);
        let memory = parsed.memory.ok_or_else(|| MaterializeFailure::simple(format!("content no longer passes schema validation: {:?}", parsed.error)))?;

        let target = self.root.join(&proposal.target_path);
        if target.exists() {
            return Err(MaterializeFailure::simple(format!("{} already exists", proposal.target_path)));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| MaterializeFailure::simple(format!("failed to create directory: {e}")))?;
        }
        atomic_write(&target, content).map_err(|e| MaterializeFailure::simple(format!("write failed: {e}")))?;

        // Reindex failure is reported but does not roll back the write (§4.M step 4).
        let reindex_start = Instant::now();
        if let Err(e) = self.indexer().index_file(&target) {
            tracing::warn!(error = %e, path = %proposal.target_path, "post-create reindex failed");
        }
        Ok(Materialized {
            memory_id: memory.header.id.clone(),
            memory_path: proposal.target_path.clone(),
            reindex_duration_ms: reindex_start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    fn update(&self, proposal: &WriteProposal) -> Result<Materialized, MaterializeFailure> {
        let memory_id = proposal.memory_id.as_deref().ok_or_else(|| MaterializeFailure::simple("update proposal carries no memory_id"))?;
        let existing = self
            .storage
            .get_memory_by_id(memory_id)
            .map_err(|e| MaterializeFailure::simple(e.to_string()))?
            .ok_or_else(|| MaterializeFailure::simple(format!("memory {memory_id} not found")))?;
        let content = proposal.content.as_deref().ok_or_else(|| MaterializeFailure::simple("update proposal carries no content"))?;

        let parsed = crate::parser::parse_memory_file(content.as_bytes(), &existing.path, &self.validation);
        if parsed.memory.is_none() {
            return Err(MaterializeFailure::simple(format!("content no longer passes schema validation: {:?}", parsed.error)));
        }

        let absolute = self.root.join(&existing.path);
        let snapshot = fs::read(&absolute).map_err(|e| MaterializeFailure::simple(format!("failed to snapshot original: {e}")))?;

        if let Err(e) = atomic_write(&absolute, content) {
            let rollback_success = fs::write(&absolute, &snapshot).is_ok();
            return Err(MaterializeFailure {
                message: format!("write failed: {e}"),
                rollback_performed: true,
                rollback_success: Some(rollback_success),
            });
        }

        let reindex_start = Instant::now();
        if let Err(e) = self.indexer().index_file(&absolute) {
            tracing::warn!(error = %e, path = %existing.path, "post-update reindex failed");
        }
        Ok(Materialized {
            memory_id: existing.id,
            memory_path: existing.path,
            reindex_duration_ms: reindex_start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    fn deprecate(&self, proposal: &WriteProposal) -> Result<Materialized, MaterializeFailure> {
        let memory_id = proposal.memory_id.as_deref().ok_or_else(|| MaterializeFailure::simple("deprecate proposal carries no memory_id"))?;
        let existing = self
            .storage
            .get_memory_by_id(memory_id)
            .map_err(|e| MaterializeFailure::simple(e.to_string()))?
            .ok_or_else(|| MaterializeFailure::simple(format!("memory {memory_id} not found")))?;

        let original_absolute = self.root.join(&existing.path);
        let snapshot = fs::read(&original_absolute).map_err(|e| MaterializeFailure::simple(format!("failed to snapshot original: {e}")))?;
        let text = String::from_utf8(snapshot.clone()).map_err(|e| MaterializeFailure::simple(format!("original file is not valid UTF-8: {e}")))?;

        let parsed = crate::parser::parse_memory_file(&snapshot, &existing.path, &self.validation);
        let mut memory_file = parsed.memory.ok_or_else(|| MaterializeFailure::simple("original memory no longer parses".to_string()))?;
        memory_file.header.status = Status::Deprecated;
        memory_file.header.deprecated_at = Some(Utc::now().to_rfc3339());
        memory_file.header.deprecation_reason = proposal.deprecation_reason.clone().or_else(|| Some(proposal.reason.clone()));
        let new_content = memory_file.serialize().map_err(|e| MaterializeFailure::simple(format!("failed to re-serialize header: {e}")))?;

        let rest = rest_of_path(&existing.path);
        let dest = unique_dest(&self.root.join("deprecated").join(existing.scope.as_str()), &rest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| MaterializeFailure::simple(format!("failed to create directory: {e}")))?;
        }
        if let Err(e) = atomic_write(&dest, &new_content) {
            return Err(MaterializeFailure::simple(format!("write to deprecated location failed: {e}")));
        }
        if let Err(e) = fs::remove_file(&original_absolute) {
            let rollback_success = fs::remove_file(&dest).is_ok() && atomic_write(&original_absolute, &text).is_ok();
            return Err(MaterializeFailure {
                message: format!("failed to remove original after deprecation: {e}"),
                rollback_performed: true,
                rollback_success: Some(rollback_success),
            });
        }

        let dest_relative = dest.strip_prefix(&self.root).unwrap_or(&dest).to_string_lossy().replace('\\', "/");
        let reindex_start = Instant::now();
        if let Err(e) = self.indexer().delete_file(&existing.path) {
            tracing::warn!(error = %e, path = %existing.path, "post-deprecate delete-from-index failed");
        }
        if let Err(e) = self.indexer().index_file(&dest) {
            tracing::warn!(error = %e, path = %dest_relative, "post-deprecate reindex failed");
        }
        Ok(Materialized { memory_id: existing.id, memory_path: dest_relative, reindex_duration_ms: reindex_start.elapsed().as_secs_f64() * 1000.0 })
    }

    fn promote(&self, proposal: &WriteProposal) -> Result<Materialized, MaterializeFailure> {
        let memory_id = proposal.memory_id.as_deref().ok_or_else(|| MaterializeFailure::simple("promote proposal carries no memory_id"))?;
        let existing = self
            .storage
            .get_memory_by_id(memory_id)
            .map_err(|e| MaterializeFailure::simple(e.to_string()))?
            .ok_or_else(|| MaterializeFailure::simple(format!("memory {memory_id} not found")))?;
        let new_scope_name = proposal.new_scope.as_deref().ok_or_else(|| MaterializeFailure::simple("promote proposal carries no new_scope"))?;
        let new_scope = Scope::parse_name(new_scope_name).ok_or_else(|| MaterializeFailure::simple(format!("unknown scope '{new_scope_name}'")))?;

        let original_absolute = self.root.join(&existing.path);
        let snapshot = fs::read(&original_absolute).map_err(|e| MaterializeFailure::simple(format!("failed to snapshot original: {e}")))?;
        let parsed = crate::parser::parse_memory_file(&snapshot, &existing.path, &self.validation);
        let mut memory_file = parsed.memory.ok_or_else(|| MaterializeFailure::simple("original memory no longer parses".to_string()))?;
        memory_file.header.scope = new_scope;
        let new_content = memory_file.serialize().map_err(|e| MaterializeFailure::simple(format!("failed to re-serialize header: {e}")))?;

        let rest = rest_of_path(&existing.path);
        let new_path = format!("{new_scope_name}/{rest}");
        let dest = self.root.join(&new_path);
        if dest.exists() {
            return Err(MaterializeFailure::simple(format!("{new_path} already exists")));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| MaterializeFailure::simple(format!("failed to create directory: {e}")))?;
        }
        if let Err(e) = atomic_write(&dest, &new_content) {
            return Err(MaterializeFailure::simple(format!("write to promoted location failed: {e}")));
        }
        if let Err(e) = fs::remove_file(&original_absolute) {
            let text = String::from_utf8_lossy(&snapshot).to_string();
            let rollback_success = fs::remove_file(&dest).is_ok() && atomic_write(&original_absolute, &text).is_ok();
            return Err(MaterializeFailure {
                message: format!("failed to remove original after promotion: {e}"),
                rollback_performed: true,
                rollback_success: Some(rollback_success),
            });
        }

        let reindex_start = Instant::now();
        if let Err(e) = self.indexer().delete_file(&existing.path) {
            tracing::warn!(error = %e, path = %existing.path, "post-promote delete-from-index failed");
        }
        if let Err(e) = self.indexer().index_file(&dest) {
            tracing::warn!(error = %e, path = %new_path, "post-promote reindex failed");
        }
        Ok(Materialized { memory_id: existing.id, memory_path: new_path, reindex_duration_ms: reindex_start.elapsed().as_secs_f64() * 1000.0 })
    }
}

/// First path segment stripped off, e.g. `project/auth/jwt.md` → `auth/jwt.md`.
fn rest_of_path(path: &str) -> String {
    path.split_once('/').map(|(_, rest)| rest.to_string()).unwrap_or_else(|| path.to_string())
}

/// Appends a timestamp suffix to the file stem if `dest_dir/rest` already exists.
fn unique_dest(dest_dir: &Path, rest: &str) -> PathBuf {
    let candidate = dest_dir.join(rest);
    if !candidate.exists() {
        return candidate;
    }
    let stem = candidate.file_stem().and_then(|s| s.to_str()).unwrap_or("memory");
    let ext = candidate.extension().and_then(|s| s.to_str()).unwrap_or("md");
    let suffix = Utc::now().format("%Y%m%d%H%M%S");
    candidate.with_file_name(format!("{stem}-{suffix}.{ext}"))
}

/// Write-to-temp-then-rename, so a crash or error mid-write never leaves a half-written
/// file at `path` (§4.M step 3).
fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = dir.join(format!(".{}.tmp-{}", path.file_name().and_then(|n| n.to_str()).unwrap_or("memory"), std::process::id()));

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        use std::io::Write;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path)
}
