//! axum `Router` assembly for the daemon's HTTP surface (§4.N).

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/query", post(handlers::query))
        .route("/reindex", post(handlers::reindex))
        .route("/write/propose", post(handlers::propose))
        .route("/proposals", get(handlers::list_proposals))
        .route("/proposals/{id}", get(handlers::get_proposal))
        .route("/review/process/{id}", post(handlers::review_process))
        .route("/review/approve/{id}", post(handlers::review_approve))
        .route("/review/reject/{id}", post(handlers::review_reject))
        .route("/commit/{id}", post(handlers::commit))
        .layer(ServiceBuilder::new().concurrency_limit(64).layer(cors).layer(TraceLayer::new_for_http()))
        .with_state(state)
}
