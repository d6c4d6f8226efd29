//! Proposal Queue (§4.K): a durable, transactional queue of write proposals. Every
//! enqueue and status change writes an audit history entry.

use std::collections::HashMap;

use crate::models::{ProposalStatus, WriteProposal};
use crate::storage::Storage;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("proposal {0} already exists")]
    DuplicateProposal(String),
    #[error("proposal not found: {0}")]
    NotFound(String),
    #[error("invalid status transition: {0:?} -> {1:?}")]
    InvalidTransition(ProposalStatus, ProposalStatus),
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub proposal_id: String,
    pub memory_id: Option<String>,
    pub memory_path: String,
    pub action: String,
    pub committed_at: String,
}

pub struct ProposalQueue<'a> {
    storage: &'a Storage,
}

impl<'a> ProposalQueue<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn enqueue(&self, proposal: &WriteProposal) -> Result<(), QueueError> {
        if self.storage.get_proposal(&proposal.proposal_id)?.is_some() {
            return Err(QueueError::DuplicateProposal(proposal.proposal_id.clone()));
        }
        self.storage.insert_proposal(proposal)?;
        self.storage.record_audit_entry(&proposal.proposal_id, None, &proposal.target_path, "enqueued")?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<WriteProposal>, QueueError> {
        Ok(self.storage.get_proposal(id)?)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<WriteProposal>, QueueError> {
        Ok(self.storage.get_proposal_by_path(path)?)
    }

    pub fn get_pending(&self, limit: usize) -> Result<Vec<WriteProposal>, QueueError> {
        let mut pending = self.storage.list_proposals_by_status(ProposalStatus::Pending)?;
        pending.truncate(limit);
        Ok(pending)
    }

    pub fn get_by_status(&self, status: ProposalStatus, limit: usize) -> Result<Vec<WriteProposal>, QueueError> {
        let mut proposals = self.storage.list_proposals_by_status(status)?;
        proposals.truncate(limit);
        Ok(proposals)
    }

    /// Rejects invalid transitions per the status DAG (§3); writes an audit entry on
    /// success.
    pub fn update_status(&self, id: &str, new_status: ProposalStatus, notes: Option<&str>) -> Result<(), QueueError> {
        let proposal = self.storage.get_proposal(id)?.ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if !proposal.status.can_transition_to(new_status) {
            return Err(QueueError::InvalidTransition(proposal.status, new_status));
        }
        self.storage.update_proposal_review(id, new_status, notes)?;
        self.storage.record_audit_entry(id, proposal.memory_id.as_deref(), &proposal.target_path, &format!("status:{new_status:?}"))?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), QueueError> {
        self.storage.delete_proposal(id)?;
        Ok(())
    }

    pub fn has_pending_for_path(&self, path: &str) -> Result<bool, QueueError> {
        Ok(self.storage.has_pending_for_path(path)?)
    }

    pub fn increment_retry(&self, id: &str) -> Result<(), QueueError> {
        self.storage.increment_retry(id)?;
        Ok(())
    }

    /// Sets a proposal's status to `failed` with the given commit error (§4.K).
    pub fn set_commit_error(&self, id: &str, message: &str) -> Result<(), QueueError> {
        self.storage.update_proposal_commit(id, ProposalStatus::Failed, None, Some(message))?;
        self.storage.record_audit_entry(id, None, "", "commit_failed")?;
        Ok(())
    }

    pub fn get_history(&self, id: &str) -> Result<Vec<AuditEntry>, QueueError> {
        let rows = self.storage.audit_history_for_proposal(id)?;
        Ok(rows
            .into_iter()
            .map(|(proposal_id, memory_id, memory_path, action, committed_at)| AuditEntry {
                proposal_id,
                memory_id,
                memory_path,
                action,
                committed_at,
            })
            .collect())
    }

    pub fn get_stats(&self) -> Result<HashMap<ProposalStatus, i64>, QueueError> {
        Ok(self.storage.proposal_status_counts()?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProposalType;
    use std::path::PathBuf;

    #[test]
    fn enqueue_rejects_duplicate_id() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let queue = ProposalQueue::new(&storage);
        let proposal = WriteProposal::new(ProposalType::Create, "project/a.md".to_string(), "new memory".to_string(), "agent".to_string());
        queue.enqueue(&proposal).unwrap();
        let err = queue.enqueue(&proposal).unwrap_err();
        assert!(matches!(err, QueueError::DuplicateProposal(_)));
    }

    #[test]
    fn update_status_rejects_invalid_transition() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let queue = ProposalQueue::new(&storage);
        let proposal = WriteProposal::new(ProposalType::Create, "project/a.md".to_string(), "new memory".to_string(), "agent".to_string());
        queue.enqueue(&proposal).unwrap();
        let err = queue.update_status(&proposal.proposal_id, ProposalStatus::Committed, None).unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition(_, _)));
    }

    #[test]
    fn valid_transition_updates_status() {
        let storage = Storage::new(Some(PathBuf::from(":memory:"))).unwrap();
        let queue = ProposalQueue::new(&storage);
        let proposal = WriteProposal::new(ProposalType::Create, "project/a.md".to_string(), "new memory".to_string(), "agent".to_string());
        queue.enqueue(&proposal).unwrap();
        queue.update_status(&proposal.proposal_id, ProposalStatus::InReview, None).unwrap();
        let fetched = queue.get(&proposal.proposal_id).unwrap().unwrap();
        assert_eq!(fetched.status, ProposalStatus::InReview);
    }
}
