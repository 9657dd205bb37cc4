use axum::extract::State;
use axum::Json;

use crate::state::AppState;
use crate::types::HealthResponse;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        dedup_available: state.dedup().is_available().await,
        ingest_queue_free_slots: state.queue().free_slots(),
    })
}
