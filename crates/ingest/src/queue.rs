//! Bounded ingest queue and worker pool.
//!
//! The webhook endpoint enqueues and returns; workers own the actual page
//! processing and live until process shutdown, not until the HTTP response.
//! A full queue surfaces as `ServiceError::Backpressure` (503) so the
//! crawler retries.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use graphrag_common::{Page, ServiceError};

use crate::processor::PageProcessor;

#[derive(Debug)]
pub enum WorkItem {
    /// One streamed page.
    Page { crawl_id: String, page: Page },
    /// Every page of a `crawl.completed` event.
    Batch { crawl_id: String, pages: Vec<Page> },
    /// Terminal crawl event: drop dedup state.
    Cleanup { crawl_id: String },
}

pub struct IngestQueue {
    tx: std::sync::Mutex<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl IngestQueue {
    /// Spawn `worker_count` workers draining a queue of `capacity` items.
    pub fn start(processor: Arc<PageProcessor>, worker_count: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let processor = processor.clone();
                tokio::spawn(async move {
                    loop {
                        let item = { rx.lock().await.recv().await };
                        match item {
                            Some(item) => handle_item(&processor, item).await,
                            None => break,
                        }
                    }
                    debug!(worker, "Ingest worker stopped");
                })
            })
            .collect();

        info!(workers = worker_count.max(1), capacity, "Ingest queue started");
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            capacity,
        }
    }

    /// Non-blocking accept. `Backpressure` when the queue is full.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), ServiceError> {
        let guard = self.tx.lock().expect("ingest queue lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "ingest queue is shut down"
            )));
        };
        tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServiceError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => {
                ServiceError::Internal(anyhow::anyhow!("ingest queue is shut down"))
            }
        })
    }

    /// Remaining slots; used by the health endpoint.
    pub fn free_slots(&self) -> usize {
        self.tx
            .lock()
            .expect("ingest queue lock poisoned")
            .as_ref()
            .map(|tx| tx.capacity())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting work, drain what was queued, and join the workers.
    /// Idempotent.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().expect("ingest queue lock poisoned").take();
        drop(tx);

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("Ingest queue drained and stopped");
    }
}

async fn handle_item(processor: &PageProcessor, item: WorkItem) {
    match item {
        WorkItem::Page { crawl_id, page } => processor.process_page(&crawl_id, &page).await,
        WorkItem::Batch { crawl_id, pages } => processor.process_batch(&crawl_id, &pages).await,
        WorkItem::Cleanup { crawl_id } => processor.cleanup(&crawl_id).await,
    }
}
