//! Crawl webhook intake.
//!
//! Strict status-code contract, in order: 401 on signature failure, 400 on
//! parse or schema failure, 503 when the ingest queue is full, 200 once the
//! work is accepted. The crawler keys retries off these codes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{info, warn};

use graphrag_common::events::{parse_event, WebhookEvent};
use graphrag_ingest::WorkItem;

use crate::signature::{verify_signature, SIGNATURE_HEADER};
use crate::state::AppState;
use crate::types::{ApiError, WebhookAck};

pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = &state.config().webhook.shared_secret {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        verify_signature(secret, &body, header)?;
    }

    let Some(event) = parse_event(&body)? else {
        // Unknown event type: acknowledged and skipped.
        return Ok(Json(WebhookAck { status: "ignored" }));
    };

    match event {
        WebhookEvent::CrawlStarted { crawl_id } => {
            info!(crawl_id = %crawl_id, "Crawl started");
        }
        WebhookEvent::CrawlPage { crawl_id, page } => {
            info!(crawl_id = %crawl_id, source_url = page.source_url(), "Page event accepted");
            state.queue().enqueue(WorkItem::Page { crawl_id, page })?;
        }
        WebhookEvent::CrawlCompleted { crawl_id, pages } => {
            info!(crawl_id = %crawl_id, pages = pages.len(), "Crawl completed");
            if !pages.is_empty() {
                state.queue().enqueue(WorkItem::Batch { crawl_id, pages })?;
            }
        }
        WebhookEvent::CrawlFailed { crawl_id, error } => {
            warn!(crawl_id = %crawl_id, error = %error, "Crawl failed; scheduling dedup cleanup");
            state.queue().enqueue(WorkItem::Cleanup { crawl_id })?;
        }
    }

    Ok(Json(WebhookAck { status: "accepted" }))
}
