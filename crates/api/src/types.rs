//! Request/response types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use graphrag_common::{Entity, ResultSource, ServiceError};
use graphrag_retrieval::{HybridHit, SearchTiming};
use graphrag_storage::Subgraph;

fn default_limit() -> usize {
    5
}

fn default_graph_depth() -> usize {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default = "default_true")]
    pub rerank: bool,
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub results: Vec<ResultEntry>,
    pub graph_degraded: bool,
    pub timing: SearchTiming,
}

#[derive(Debug, Serialize)]
pub struct ResultEntry {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub metadata: ResultMetadata,
    pub source: ResultSource,
}

#[derive(Debug, Serialize)]
pub struct ResultMetadata {
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
}

impl From<HybridHit> for ResultEntry {
    fn from(hit: HybridHit) -> Self {
        Self {
            id: hit.page_id,
            score: hit.score,
            content: hit.content,
            metadata: ResultMetadata {
                source_url: hit.source_url,
                title: hit.title,
                vector_score: hit.vector_score,
                graph_score: hit.graph_score,
            },
            source: hit.source,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EntitySearchResponse {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub entity_id: String,
    pub depth: usize,
    #[serde(flatten)]
    pub subgraph: Subgraph,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dedup_available: bool,
    pub ingest_queue_free_slots: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Axum-facing wrapper mapping the error taxonomy onto status codes. The
/// mapping is part of the webhook contract: the crawler keys its retry
/// behavior off these codes, so auth and validation failures must never be
/// masked as 200.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            ServiceError::Schema(msg) => {
                (StatusCode::BAD_REQUEST, "SCHEMA_ERROR", msg.clone())
            }
            ServiceError::Auth(msg) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone()),
            ServiceError::Backpressure => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_FULL",
                "ingest queue is full, retry later".to_string(),
            ),
            ServiceError::DependencyTransient { dependency, .. } => (
                StatusCode::BAD_GATEWAY,
                "DEPENDENCY_ERROR",
                format!("{dependency} is unavailable"),
            ),
            ServiceError::DependencyUnavailable { dependency } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "DEPENDENCY_CIRCUIT_OPEN",
                format!("{dependency} is temporarily unavailable"),
            ),
            ServiceError::DimensionMismatch { expected, got } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DIMENSION_MISMATCH",
                format!("embedding dimension mismatch: expected {expected}, got {got}"),
            ),
            ServiceError::Internal(e) => {
                // Full chain into the log, generic message to the caller.
                error!(error = ?e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: Some(code.to_string()),
                timestamp: Utc::now(),
            }),
        )
            .into_response()
    }
}
