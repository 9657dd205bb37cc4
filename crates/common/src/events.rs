//! Webhook event envelope and validation.
//!
//! Events arrive as `{type, id, timestamp?, data}` with the `type` tag
//! selecting the `data` shape. Unknown fields inside known shapes are
//! ignored; unknown `type` tags are skipped (logged, not rejected) so a
//! newer crawler does not break an older service.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::ServiceError;
use crate::types::Page;

/// A validated webhook event, ready for dispatch.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CrawlStarted {
        crawl_id: String,
    },
    CrawlPage {
        crawl_id: String,
        page: Page,
    },
    CrawlCompleted {
        crawl_id: String,
        pages: Vec<Page>,
    },
    CrawlFailed {
        crawl_id: String,
        error: String,
    },
}

impl WebhookEvent {
    pub fn crawl_id(&self) -> &str {
        match self {
            Self::CrawlStarted { crawl_id }
            | Self::CrawlPage { crawl_id, .. }
            | Self::CrawlCompleted { crawl_id, .. }
            | Self::CrawlFailed { crawl_id, .. } => crawl_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    id: String,
    #[allow(dead_code)]
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct FailedData {
    error: String,
}

/// Parse and validate a raw webhook body.
///
/// Returns `Ok(None)` for unknown event types (forward compatibility).
/// All other failures are `ServiceError::Schema` with the exact reason, so
/// the endpoint can hand the caller a useful 400 body.
pub fn parse_event(body: &[u8]) -> Result<Option<WebhookEvent>, ServiceError> {
    let raw: RawEnvelope = serde_json::from_slice(body)
        .map_err(|e| ServiceError::Schema(format!("invalid event envelope: {e}")))?;

    if raw.id.is_empty() {
        return Err(ServiceError::Schema("event id must not be empty".into()));
    }

    // Batch-scrape events carry the same data shapes as their crawl
    // counterparts; fold them onto one set of variants.
    let event = match raw.event_type.as_str() {
        "crawl.started" | "batch_scrape.started" => WebhookEvent::CrawlStarted { crawl_id: raw.id },
        "crawl.page" | "batch_scrape.page" => {
            let page: Page = serde_json::from_value(raw.data)
                .map_err(|e| ServiceError::Schema(format!("invalid page data: {e}")))?;
            validate_page(&page)?;
            WebhookEvent::CrawlPage {
                crawl_id: raw.id,
                page,
            }
        }
        "crawl.completed" | "batch_scrape.completed" => {
            let pages: Vec<Page> = serde_json::from_value(raw.data)
                .map_err(|e| ServiceError::Schema(format!("invalid completed batch: {e}")))?;
            for page in &pages {
                validate_page(page)?;
            }
            WebhookEvent::CrawlCompleted {
                crawl_id: raw.id,
                pages,
            }
        }
        "crawl.failed" | "batch_scrape.failed" => {
            let data: FailedData = serde_json::from_value(raw.data)
                .map_err(|e| ServiceError::Schema(format!("invalid failure data: {e}")))?;
            WebhookEvent::CrawlFailed {
                crawl_id: raw.id,
                error: data.error,
            }
        }
        other => {
            warn!(event_type = %other, crawl_id = %raw.id, "Skipping unknown webhook event type");
            return Ok(None);
        }
    };

    Ok(Some(event))
}

fn validate_page(page: &Page) -> Result<(), ServiceError> {
    if page.metadata.source_url.trim().is_empty() {
        return Err(ServiceError::Schema("page is missing source_url".into()));
    }
    let status = page.metadata.status_code;
    if !(100..=599).contains(&status) {
        return Err(ServiceError::Schema(format!(
            "status_code {status} outside [100, 599]"
        )));
    }
    Ok(())
}
