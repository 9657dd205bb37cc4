//! Process-wide dependency registry.
//!
//! Every external client is built once at startup and handed to request
//! handlers as a trait object. The vector and graph stores are required:
//! startup aborts when either is unreachable. The dedup/cache store is
//! optional: when its health probe fails, the registry selects the
//! `UnavailableDedupCache` fallback and the service runs without dedup.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use graphrag_common::SystemConfig;
use graphrag_ingest::{
    IngestQueue, LanguageGate, LlmExtractor, OllamaEmbedder, PageProcessor,
};
use graphrag_resilience::{BreakerRegistry, RetryPolicy};
use graphrag_retrieval::HybridEngine;
use graphrag_storage::{
    DedupCache, GraphStore, Neo4jGraphStore, QdrantVectorStore, RedisDedupCache,
    UnavailableDedupCache, VectorStore,
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: SystemConfig,
    queue: Arc<IngestQueue>,
    engine: Arc<HybridEngine>,
    graph: Arc<dyn GraphStore>,
    dedup: Arc<dyn DedupCache>,
}

impl AppState {
    /// Assemble a state from already-built components. Tests use this to
    /// substitute doubles; production goes through [`AppState::init`].
    pub fn new(
        config: SystemConfig,
        queue: Arc<IngestQueue>,
        engine: Arc<HybridEngine>,
        graph: Arc<dyn GraphStore>,
        dedup: Arc<dyn DedupCache>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                queue,
                engine,
                graph,
                dedup,
            }),
        }
    }

    /// Eagerly initialize every dependency client.
    pub async fn init(config: SystemConfig) -> Result<Self> {
        let models = &config.models;
        let embedder = Arc::new(
            OllamaEmbedder::new(
                &models.ollama_url,
                models.embedding_model.clone(),
                models.vector_dimension,
            )
            .context("failed to build embedder")?,
        );
        let extractor = Arc::new(
            LlmExtractor::new(&models.ollama_url, models.extraction_model.clone())
                .context("failed to build extractor")?,
        );

        let vectors = Arc::new(
            QdrantVectorStore::new(
                &config.storage.qdrant_url,
                config.storage.qdrant_collection.clone(),
                models.vector_dimension,
            )
            .context("failed to build vector store client")?,
        );

        // Independent clients connect in parallel. The vector and graph
        // stores are load-bearing; Redis is allowed to be absent.
        let (collection, graph, redis) = tokio::join!(
            vectors.ensure_collection(),
            Neo4jGraphStore::connect(
                &config.storage.neo4j_uri,
                &config.storage.neo4j_user,
                &config.storage.neo4j_password,
            ),
            RedisDedupCache::connect(
                &config.storage.redis_url,
                std::time::Duration::from_secs(config.storage.dedup_ttl_seconds),
                std::time::Duration::from_secs(config.storage.embed_ttl_seconds),
            ),
        );

        collection.context("vector store is required")?;
        let graph: Arc<dyn GraphStore> = Arc::new(graph.context("graph store is required")?);
        graph
            .ensure_constraints()
            .await
            .context("failed to prepare graph constraints")?;

        let dedup: Arc<dyn DedupCache> = match redis {
            Ok(cache) => {
                if cache.is_available().await {
                    info!("Dedup/cache store connected");
                    Arc::new(cache)
                } else {
                    warn!("Dedup/cache store failed its health probe; running without dedup");
                    Arc::new(UnavailableDedupCache)
                }
            }
            Err(e) => {
                warn!(error = %e, "Dedup/cache store unreachable; running without dedup");
                Arc::new(UnavailableDedupCache)
            }
        };

        if config.webhook.shared_secret.is_none() {
            warn!("WEBHOOK_SHARED_SECRET is not set; webhook signatures are NOT verified");
        }

        let breakers = BreakerRegistry::new(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.recovery_timeout(),
        );

        let processor = Arc::new(PageProcessor::new(
            dedup.clone(),
            vectors.clone(),
            graph.clone(),
            embedder.clone(),
            extractor.clone(),
            LanguageGate::new(&config.language),
            &breakers,
            &config.retry,
            config.models.embed_batch_size,
        ));
        let queue = Arc::new(IngestQueue::start(
            processor,
            config.ingest.worker_pool_size,
            config.ingest.queue_capacity,
        ));

        let engine = Arc::new(HybridEngine::new(
            embedder,
            vectors,
            graph.clone(),
            extractor,
            dedup.clone(),
            &breakers,
            RetryPolicy::new(
                config.retry.max_attempts,
                config.retry.base_delay(),
                config.retry.max_delay(),
            ),
        ));

        info!("All dependency clients initialized");
        Ok(Self::new(config, queue, engine, graph, dedup))
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &Arc<IngestQueue> {
        &self.inner.queue
    }

    pub fn engine(&self) -> &Arc<HybridEngine> {
        &self.inner.engine
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.inner.graph
    }

    pub fn dedup(&self) -> &Arc<dyn DedupCache> {
        &self.inner.dedup
    }

    /// Reverse-order teardown: stop accepting work, drain the queue, then
    /// let the clients drop. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.queue.shutdown().await;
        info!("Shutdown complete");
    }
}
