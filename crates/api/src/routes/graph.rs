//! Graph browsing endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use graphrag_common::{EntityType, ServiceError};

use crate::state::AppState;
use crate::types::{ApiError, ConnectionsResponse, EntitySearchResponse};

#[derive(Debug, Deserialize)]
pub struct EntitySearchParams {
    pub q: String,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /graph/entities/search?q=…&type=…&limit=…`
pub async fn search_entities(
    State(state): State<AppState>,
    Query(params): Query<EntitySearchParams>,
) -> Result<Json<EntitySearchResponse>, ApiError> {
    if params.q.trim().is_empty() {
        return Err(ServiceError::Schema("q must not be empty".into()).into());
    }

    let entity_type = params.entity_type.as_deref().map(EntityType::parse);
    let entities = state
        .graph()
        .find_entities(&params.q, entity_type, params.limit.unwrap_or(20).clamp(1, 100))
        .await
        .map_err(|e| ServiceError::DependencyTransient {
            dependency: "neo4j",
            source: e,
        })?;

    Ok(Json(EntitySearchResponse { entities }))
}

#[derive(Debug, Deserialize)]
pub struct ConnectionsParams {
    pub depth: Option<usize>,
}

/// `GET /graph/entities/{id}/connections?depth=…`
pub async fn entity_connections(
    State(state): State<AppState>,
    Path(entity_id): Path<String>,
    Query(params): Query<ConnectionsParams>,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let depth = params.depth.unwrap_or(1);
    let subgraph = state
        .graph()
        .entity_connections(&entity_id, depth)
        .await
        .map_err(|e| ServiceError::DependencyTransient {
            dependency: "neo4j",
            source: e,
        })?;

    Ok(Json(ConnectionsResponse {
        entity_id,
        depth,
        subgraph,
    }))
}
