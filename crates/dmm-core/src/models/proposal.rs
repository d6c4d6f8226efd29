//! Write proposal and review result data models (§3, §4.K, §4.L, §4.M).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalType {
    Create,
    Update,
    Deprecate,
    Promote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    InReview,
    Approved,
    Committed,
    Rejected,
    Modified,
    Deferred,
    Failed,
}

impl ProposalStatus {
    /// Valid transitions form the DAG of §3: used by the Proposal Queue to reject any
    /// transition not listed here.
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, next),
            (Pending, InReview)
                | (InReview, Approved)
                | (InReview, Rejected)
                | (InReview, Modified)
                | (InReview, Deferred)
                | (Approved, Committed)
                | (Approved, Failed)
                | (Deferred, Pending)
                | (Failed, Pending)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
    Modify,
    Defer,
}

/// A proposed write operation to the memory system, queued pending review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteProposal {
    pub proposal_id: String,
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    pub target_path: String,
    pub reason: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_scope: Option<String>,

    pub proposed_by: String,
    pub created_at: DateTime<Utc>,
    pub status: ProposalStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_notes: Option<String>,
    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_error: Option<String>,
}

impl WriteProposal {
    pub fn new(proposal_type: ProposalType, target_path: String, reason: String, proposed_by: String) -> Self {
        Self {
            proposal_id: format!("prop_{}", uuid::Uuid::new_v4()),
            proposal_type,
            target_path,
            reason,
            content: None,
            patch: None,
            new_scope: None,
            proposed_by,
            created_at: Utc::now(),
            status: ProposalStatus::Pending,
            memory_id: None,
            deprecation_reason: None,
            source_scope: None,
            reviewed_at: None,
            reviewer_notes: None,
            retry_count: 0,
            committed_at: None,
            commit_error: None,
        }
    }

    /// Baseline modifications and scope-promotions-to-baseline always require a human
    /// review pass rather than automatic approval (§4.L decision engine).
    pub fn requires_human_review(&self) -> bool {
        let targets_baseline = self.target_path.split('/').next() == Some("baseline");
        let promotes_to_baseline =
            self.proposal_type == ProposalType::Promote && self.new_scope.as_deref() == Some("baseline");
        targets_baseline || promotes_to_baseline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding surfaced during review.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Error,
            field: None,
            suggestion: None,
        }
    }

    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Warning,
            field: None,
            suggestion: None,
        }
    }

    pub fn info(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: Severity::Info,
            field: None,
            suggestion: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Semantic,
    Similar,
    TagOverlap,
}

/// A potential duplicate memory surfaced by the duplicate detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub memory_id: String,
    pub memory_path: String,
    pub similarity: f32,
    pub match_type: MatchType,
}

/// Result of reviewing a write proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub proposal_id: String,
    pub decision: ReviewDecision,
    pub confidence: f32,

    pub schema_valid: bool,
    pub quality_valid: bool,
    pub duplicate_check_passed: bool,

    pub issues: Vec<ValidationIssue>,
    pub duplicates: Vec<DuplicateMatch>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_content: Option<String>,
    pub modifications_applied: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub review_duration_ms: f64,
}

impl ReviewResult {
    pub fn is_approved(&self) -> bool {
        self.decision == ReviewDecision::Approve
    }

    pub fn is_rejected(&self) -> bool {
        self.decision == ReviewDecision::Reject
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }
}

/// Result of committing an approved proposal (§4.M).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub proposal_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rollback_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_success: Option<bool>,
    pub commit_duration_ms: f64,
    pub reindex_duration_ms: f64,
}
