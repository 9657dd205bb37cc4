//! Per-page ingestion pipeline.
//!
//! Order per page: dedup check → language gate → embed → vector upsert →
//! graph enrichment → mark processed. Embedding and upsert failures leave
//! the page unmarked so a later `completed` batch can retry it; graph
//! enrichment is best-effort and never fails the page.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use graphrag_common::{Page, RetryConfig, ServiceError};
use graphrag_resilience::{BreakerRegistry, Resilient, RetryPolicy};
use graphrag_storage::{DedupCache, GraphStore, VectorStore};

use crate::embedder::Embedder;
use crate::extractor::EntityExtractor;
use crate::language::LanguageGate;

/// Cap on concurrent embedding batches per crawl-completed event.
const MAX_CONCURRENT_EMBED_BATCHES: usize = 4;

pub struct PageProcessor {
    dedup: Arc<dyn DedupCache>,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    language: LanguageGate,
    embed_call: Resilient,
    upsert_call: Resilient,
    extract_call: Resilient,
    graph_call: Resilient,
    embed_batch_size: usize,
    batch_permits: Semaphore,
}

impl PageProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dedup: Arc<dyn DedupCache>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        language: LanguageGate,
        breakers: &BreakerRegistry,
        retry: &RetryConfig,
        embed_batch_size: usize,
    ) -> Self {
        let policy = RetryPolicy::new(retry.max_attempts, retry.base_delay(), retry.max_delay());
        // A dimension mismatch is a data-integrity fault, not a transient
        // one; retrying it would only hammer the service.
        let embed_policy = policy.clone().should_retry(|e| {
            !matches!(
                e.downcast_ref::<ServiceError>(),
                Some(ServiceError::DimensionMismatch { .. })
            )
        });
        let upsert_policy = embed_policy.clone();

        Self {
            dedup,
            vectors,
            graph,
            embedder,
            extractor,
            language,
            embed_call: Resilient::new("embedding", embed_policy, breakers.get("embedding")),
            upsert_call: Resilient::new("qdrant", upsert_policy, breakers.get("qdrant")),
            extract_call: Resilient::new("extraction", policy.clone(), breakers.get("extraction")),
            graph_call: Resilient::new("neo4j", policy, breakers.get("neo4j")),
            embed_batch_size: embed_batch_size.max(1),
            batch_permits: Semaphore::new(MAX_CONCURRENT_EMBED_BATCHES),
        }
    }

    /// Process one streamed page.
    pub async fn process_page(&self, crawl_id: &str, page: &Page) {
        if !self.admit(crawl_id, page).await {
            return;
        }

        let vector = match self
            .embed_call
            .execute(|| self.embedder.embed(&page.content))
            .await
        {
            Ok(vector) => vector,
            Err(e) => {
                // Not marked processed: a later batch may retry this page.
                error!(crawl_id, source_url = page.source_url(), error = %e, "Embedding failed; page left unprocessed");
                return;
            }
        };

        self.finish_page(crawl_id, page, vector).await;
    }

    /// Process a `crawl.completed` batch: dedup-filter, embed in chunks of
    /// `embed_batch_size`, then finish each page. Ordering within the crawl
    /// is not preserved.
    pub async fn process_batch(&self, crawl_id: &str, pages: &[Page]) {
        let mut admitted = Vec::new();
        for page in pages {
            if self.admit(crawl_id, page).await {
                admitted.push(page);
            }
        }
        if admitted.is_empty() {
            debug!(crawl_id, total = pages.len(), "Batch contained no new pages");
            return;
        }
        info!(crawl_id, new = admitted.len(), total = pages.len(), "Processing completed-crawl batch");

        let chunks = admitted.chunks(self.embed_batch_size).map(|chunk| async {
            let _permit = match self.batch_permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let texts: Vec<String> = chunk.iter().map(|p| p.content.clone()).collect();
            let vectors = match self
                .embed_call
                .execute(|| self.embedder.embed_batch(&texts))
                .await
            {
                Ok(vectors) => vectors,
                Err(e) => {
                    error!(crawl_id, pages = chunk.len(), error = %e, "Batch embedding failed; pages left unprocessed");
                    return;
                }
            };

            for (page, vector) in chunk.iter().zip(vectors) {
                self.finish_page(crawl_id, page, vector).await;
            }
        });
        join_all(chunks).await;
    }

    /// Terminal crawl event: drop the dedup state.
    pub async fn cleanup(&self, crawl_id: &str) {
        self.dedup.cleanup(crawl_id).await;
        info!(crawl_id, "Cleaned up dedup state for failed crawl");
    }

    /// Steps 1–3: skip empty pages, already-processed pages, and pages the
    /// language policy rejects (those are marked so they are not re-tried).
    async fn admit(&self, crawl_id: &str, page: &Page) -> bool {
        let source_url = page.source_url();
        if source_url.trim().is_empty() || page.content.trim().is_empty() {
            debug!(crawl_id, "Skipping page with empty url or content");
            return false;
        }

        if self.dedup.is_processed(crawl_id, source_url).await {
            debug!(crawl_id, source_url, "Skipping already-processed page");
            return false;
        }

        if self.language.enabled() && !self.language.admit(&page.content) {
            debug!(crawl_id, source_url, "Language policy rejected page");
            // Marked so a later batch does not re-run detection on it.
            self.dedup.mark_processed(crawl_id, source_url).await;
            return false;
        }

        true
    }

    /// Steps 4–8 once a vector exists for the page.
    async fn finish_page(&self, crawl_id: &str, page: &Page, vector: Vec<f32>) {
        let source_url = page.source_url();
        let page_id = page.page_id();

        if let Err(e) = self
            .upsert_call
            .execute(|| self.vectors.upsert_page(&page_id, vector.clone(), page))
            .await
        {
            error!(crawl_id, source_url, error = %e, "Vector upsert failed; page left unprocessed");
            return;
        }

        // Graph enrichment is best-effort: the vector index is the primary
        // store and this page is already searchable.
        self.enrich_graph(crawl_id, &page_id, page).await;

        self.dedup.mark_processed(crawl_id, source_url).await;
        debug!(crawl_id, source_url, page_id = %page_id, "Page processed");
    }

    async fn enrich_graph(&self, crawl_id: &str, page_id: &str, page: &Page) {
        let source_url = page.source_url();

        let entities = match self
            .extract_call
            .execute(|| self.extractor.extract_entities(&page.content))
            .await
        {
            Ok(entities) => entities,
            Err(e) => {
                warn!(crawl_id, source_url, error = %e, "Entity extraction failed; skipping graph enrichment");
                return;
            }
        };
        if entities.is_empty() {
            return;
        }

        for entity in &entities {
            if let Err(e) = self
                .graph_call
                .execute(|| self.graph.merge_entity(entity))
                .await
            {
                warn!(crawl_id, entity = %entity.text, error = %e, "Entity merge failed");
                return;
            }
            if let Err(e) = self
                .graph_call
                .execute(|| self.graph.link_mention(&entity.entity_id, page_id, source_url))
                .await
            {
                warn!(crawl_id, entity = %entity.text, error = %e, "Mention link failed");
            }
        }

        let relationships = match self
            .extract_call
            .execute(|| self.extractor.extract_relationships(&page.content, &entities))
            .await
        {
            Ok(relationships) => relationships,
            Err(e) => {
                warn!(crawl_id, source_url, error = %e, "Relationship extraction failed");
                return;
            }
        };
        for relationship in &relationships {
            if let Err(e) = self
                .graph_call
                .execute(|| self.graph.merge_relationship(relationship))
                .await
            {
                warn!(crawl_id, error = %e, "Relationship merge failed");
            }
        }
        debug!(
            crawl_id,
            source_url,
            entities = entities.len(),
            relationships = relationships.len(),
            "Graph enrichment complete"
        );
    }
}
