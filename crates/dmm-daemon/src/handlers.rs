//! HTTP handlers for the daemon's request surface (§4.N).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use std::time::Instant;
use uuid::Uuid;

use dmm_core::models::{
    CommitResult, HealthResponse, QueryLogEntry, QueryRequest, QueryResponse, QueryStats,
    ProposalStatus, ProposalType, ReindexResponse, ReviewDecision, ReviewResult, StatusResponse,
    WriteProposal,
};

use crate::state::AppState;

fn internal_error<E: std::fmt::Display>(err: E) -> StatusCode {
    tracing::error!(error = %err, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        memory_root: state.root.to_string_lossy().to_string(),
    })
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let indexed_memories = state.storage.get_memory_count().map_err(internal_error)?;
    let proposal_counts = state.queue().get_stats().map_err(internal_error)?;
    let pending_proposals = *proposal_counts.get(&ProposalStatus::Pending).unwrap_or(&0) as usize;

    #[cfg(feature = "embeddings")]
    let embeddings_ready = state.embedder.is_ready();
    #[cfg(not(feature = "embeddings"))]
    let embeddings_ready = false;

    Ok(Json(StatusResponse {
        state: "running".to_string(),
        indexed_memories,
        pending_proposals,
        last_reindex_at: state.last_reindex_at(),
        watcher_active: state.watcher_active.load(std::sync::atomic::Ordering::Relaxed),
        embeddings_ready,
    }))
}

#[cfg(feature = "embeddings")]
pub async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Result<Json<QueryResponse>, StatusCode> {
    let total_start = Instant::now();
    let budget = req.budget.unwrap_or(state.config.retrieval.default_budget);

    let baseline_pack = state.baseline().get_baseline_pack().map_err(internal_error)?;
    let retrieved_budget = dmm_core::assembler::retrieved_budget(budget, baseline_pack.total_tokens);

    let baseline_budget = req.baseline_budget.unwrap_or(state.config.retrieval.baseline_budget);
    let baseline_overflow_tokens = state
        .baseline()
        .validate_baseline_budget(baseline_budget)
        .ok()
        .filter(|v| !v.is_valid)
        .map(|v| v.overflow_tokens);

    let embed_start = Instant::now();
    let query_embedding = state.embedder.embed_query(&req.query).map_err(internal_error)?;
    let embed_ms = embed_start.elapsed().as_secs_f64() * 1000.0;

    let search_start = Instant::now();
    let retrieval = dmm_core::retrieval::retrieve(&state.storage, &query_embedding.vector, retrieved_budget, &req.filters, &state.config.retrieval)
        .map_err(internal_error)?;
    let vector_search_ms = search_start.elapsed().as_secs_f64() * 1000.0;

    let assemble_start = Instant::now();
    let pack = dmm_core::assembler::assemble(&req.query, &baseline_pack, &retrieval, budget);
    let assemble_ms = assemble_start.elapsed().as_secs_f64() * 1000.0;

    let pack_markdown = pack.to_markdown(req.verbose);
    let results = retrieval
        .entries
        .iter()
        .map(|e| {
            let memory = state.storage.get_memory_by_path(&e.path).ok().flatten();
            dmm_core::models::RetrievalResult {
                memory_id: memory.as_ref().map(|m| m.id.clone()).unwrap_or_default(),
                path: e.path.clone(),
                similarity: 0.0,
                priority: memory.as_ref().map(|m| m.priority).unwrap_or(0.0),
                confidence_score: memory.as_ref().map(|m| m.confidence.score()).unwrap_or(0.0),
                score: e.relevance_score,
                conflict_alerts: Vec::new(),
            }
        })
        .collect();

    let total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    let query_id = format!("q_{}", Uuid::new_v4());
    let returned_memory_ids: Vec<String> = pack
        .retrieved_entries
        .iter()
        .filter_map(|e| state.storage.get_memory_by_path(&e.path).ok().flatten().map(|m| m.id))
        .collect();

    let _ = state.usage().log_query(&QueryLogEntry {
        query_id,
        query_text: req.query.clone(),
        timestamp: pack.generated_at,
        returned_memory_ids,
        total_tokens: pack.total_tokens,
        duration_ms: total_ms,
    });

    Ok(Json(QueryResponse {
        pack_markdown,
        total_tokens: pack.total_tokens,
        budget: pack.budget,
        results,
        stats: QueryStats {
            embed_ms,
            vector_search_ms,
            rank_ms: 0.0,
            diversity_filter_ms: 0.0,
            assemble_ms,
            total_ms,
            candidates_considered: retrieval.candidates_considered,
            candidates_returned: pack.retrieved_entries.len(),
        },
        generated_at: pack.generated_at,
        excluded_for_budget: retrieval.excluded_for_budget,
        baseline_overflow_tokens,
    }))
}

#[cfg(not(feature = "embeddings"))]
pub async fn query(State(_state): State<AppState>, Json(_req): Json<QueryRequest>) -> Result<Json<QueryResponse>, StatusCode> {
    Err(StatusCode::NOT_IMPLEMENTED)
}

#[derive(Debug, Deserialize)]
pub struct ReindexParams {
    #[serde(default)]
    pub full: bool,
}

pub async fn reindex(State(state): State<AppState>, Query(params): Query<ReindexParams>) -> Result<Json<ReindexResponse>, StatusCode> {
    let _ = params.full;
    let result = state.indexer().reindex_all().map_err(internal_error)?;
    state.mark_reindexed(chrono::Utc::now());
    let _ = state.baseline().invalidate_cache();

    Ok(Json(ReindexResponse {
        files_scanned: result.indexed + result.skipped + result.errors.len(),
        files_indexed: result.indexed,
        files_skipped: result.skipped,
        files_failed: result.errors.len(),
        errors: result.errors.into_iter().map(|(path, msg)| format!("{path}: {msg}")).collect(),
        duration_ms: result.duration_ms,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    #[serde(rename = "type")]
    pub proposal_type: ProposalType,
    pub target_path: String,
    pub reason: String,
    pub proposed_by: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub memory_id: Option<String>,
    #[serde(default)]
    pub new_scope: Option<String>,
    #[serde(default)]
    pub deprecation_reason: Option<String>,
}

pub async fn propose(State(state): State<AppState>, Json(req): Json<ProposeRequest>) -> Result<Json<WriteProposal>, StatusCode> {
    let mut proposal = WriteProposal::new(req.proposal_type, req.target_path, req.reason, req.proposed_by);
    proposal.content = req.content;
    proposal.memory_id = req.memory_id;
    proposal.new_scope = req.new_scope;
    proposal.deprecation_reason = req.deprecation_reason;

    state.queue().enqueue(&proposal).map_err(|e| {
        tracing::warn!(error = %e, "proposal enqueue rejected");
        StatusCode::CONFLICT
    })?;
    Ok(Json(proposal))
}

#[derive(Debug, Deserialize)]
pub struct ListProposalsParams {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_proposals(State(state): State<AppState>, Query(params): Query<ListProposalsParams>) -> Result<Json<Vec<WriteProposal>>, StatusCode> {
    let queue = state.queue();
    let proposals = match params.status.as_deref() {
        Some(status) => {
            let parsed = parse_status(status).ok_or(StatusCode::BAD_REQUEST)?;
            queue.get_by_status(parsed, params.limit)
        }
        None => queue.get_pending(params.limit),
    }
    .map_err(internal_error)?;
    Ok(Json(proposals))
}

pub async fn get_proposal(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<WriteProposal>, StatusCode> {
    state.queue().get(&id).map_err(internal_error)?.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Runs the full validator pipeline and stores the resulting decision as the proposal's
/// new status (§4.L): `InReview` is entered automatically if the proposal is `Pending`.
pub async fn review_process(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ReviewResult>, StatusCode> {
    let queue = state.queue();
    let proposal = queue.get(&id).map_err(internal_error)?.ok_or(StatusCode::NOT_FOUND)?;

    if proposal.status == ProposalStatus::Pending {
        queue.update_status(&id, ProposalStatus::InReview, None).map_err(internal_error)?;
    }

    let result = state.reviewer().review(&proposal).map_err(internal_error)?;
    let new_status = match result.decision {
        ReviewDecision::Approve => ProposalStatus::Approved,
        ReviewDecision::Reject => ProposalStatus::Rejected,
        ReviewDecision::Modify => ProposalStatus::Modified,
        ReviewDecision::Defer => ProposalStatus::Deferred,
    };
    queue.update_status(&id, new_status, result.notes.as_deref()).map_err(internal_error)?;

    Ok(Json(result))
}

pub async fn review_approve(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<WriteProposal>, StatusCode> {
    let queue = state.queue();
    queue.update_status(&id, ProposalStatus::Approved, Some("manually approved")).map_err(|e| {
        tracing::warn!(error = %e, "approve transition rejected");
        StatusCode::CONFLICT
    })?;
    queue.get(&id).map_err(internal_error)?.map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn review_reject(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<WriteProposal>, StatusCode> {
    let queue = state.queue();
    queue.update_status(&id, ProposalStatus::Rejected, Some("manually rejected")).map_err(|e| {
        tracing::warn!(error = %e, "reject transition rejected");
        StatusCode::CONFLICT
    })?;
    queue.get(&id).map_err(internal_error)?.map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn commit(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<CommitResult>, StatusCode> {
    let result = state.commit_engine().commit(&id).map_err(|e| match e {
        dmm_core::commit::CommitError::NotFound(_) => StatusCode::NOT_FOUND,
        dmm_core::commit::CommitError::NotApproved(_) => StatusCode::CONFLICT,
        e => internal_error(e),
    })?;
    let _ = state.baseline().invalidate_cache();
    Ok(Json(result))
}

fn parse_status(raw: &str) -> Option<ProposalStatus> {
    match raw {
        "pending" => Some(ProposalStatus::Pending),
        "in_review" => Some(ProposalStatus::InReview),
        "approved" => Some(ProposalStatus::Approved),
        "committed" => Some(ProposalStatus::Committed),
        "rejected" => Some(ProposalStatus::Rejected),
        "modified" => Some(ProposalStatus::Modified),
        "deferred" => Some(ProposalStatus::Deferred),
        "failed" => Some(ProposalStatus::Failed),
        _ => None,
    }
}
