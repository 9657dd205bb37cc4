//! Hybrid retrieval endpoints.

use axum::extract::State;
use axum::Json;
use tracing::info;

use graphrag_common::ServiceError;
use graphrag_retrieval::SearchRequest;

use crate::state::AppState;
use crate::types::{ApiError, QueryRequest, QueryResponse, ResultEntry};

/// `POST /query` — hybrid search over the knowledge base.
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    run_search(&state, request).await
}

/// `POST /graph/search` — same search; kept as its own route so callers
/// interested in provenance have a stable path. Each result carries the
/// retrieval path (`vector`, `graph`, `both`) that produced it.
pub async fn graph_search(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    run_search(&state, request).await
}

async fn run_search(
    state: &AppState,
    request: QueryRequest,
) -> Result<Json<QueryResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ServiceError::Schema("query must not be empty".into()).into());
    }

    let search = SearchRequest {
        query: request.query,
        limit: request.limit.clamp(1, 100),
        score_threshold: request.score_threshold,
        rerank: request.rerank,
        graph_depth: request.graph_depth,
    };

    let outcome = state.engine().search(&search).await?;
    info!(
        query = %search.query,
        results = outcome.results.len(),
        graph_degraded = outcome.graph_degraded,
        total_ms = outcome.timing.total_ms,
        "Query served"
    );

    Ok(Json(QueryResponse {
        results: outcome.results.into_iter().map(ResultEntry::from).collect(),
        graph_degraded: outcome.graph_degraded,
        timing: outcome.timing,
    }))
}
