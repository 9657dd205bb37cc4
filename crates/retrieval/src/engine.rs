//! Query-time orchestrator.
//!
//! The vector path (embedding cache → embed → cosine search) and the graph
//! path (entity lookup → bounded traversal → mentioned pages) run
//! concurrently; results merge by page id and are rescored together. The
//! vector index is load-bearing: its failure fails the query. The graph
//! path degrades to vector-only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use graphrag_common::{
    Entity, GraphHit, ResultSource, ScoredPage, ServiceError, ServiceResult,
};
use graphrag_ingest::{Embedder, EntityExtractor};
use graphrag_resilience::{BreakerRegistry, Resilient, ResilienceError, RetryPolicy};
use graphrag_storage::{DedupCache, GraphStore, VectorStore};

const VECTOR_WEIGHT: f32 = 0.6;
const GRAPH_WEIGHT: f32 = 0.4;
const BOTH_SOURCES_BONUS: f32 = 0.2;
/// Graph-node candidates considered per query entity.
const NODE_MATCH_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub rerank: bool,
    pub graph_depth: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 5,
            score_threshold: None,
            rerank: true,
            graph_depth: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridHit {
    pub page_id: String,
    pub score: f32,
    pub vector_score: Option<f32>,
    pub graph_score: Option<f32>,
    pub source: ResultSource,
    pub content: String,
    pub source_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SearchTiming {
    pub total_ms: u64,
    pub vector_ms: u64,
    pub graph_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<HybridHit>,
    /// True when the graph path failed or was skipped and only the vector
    /// path contributed.
    pub graph_degraded: bool,
    pub timing: SearchTiming,
}

pub struct HybridEngine {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    extractor: Arc<dyn EntityExtractor>,
    cache: Arc<dyn DedupCache>,
    embed_call: Resilient,
    search_call: Resilient,
    graph_call: Resilient,
}

impl HybridEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        extractor: Arc<dyn EntityExtractor>,
        cache: Arc<dyn DedupCache>,
        breakers: &BreakerRegistry,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            vectors,
            graph,
            extractor,
            cache,
            embed_call: Resilient::new("embedding", retry.clone(), breakers.get("embedding")),
            search_call: Resilient::new("qdrant", retry.clone(), breakers.get("qdrant")),
            graph_call: Resilient::new("neo4j", retry, breakers.get("neo4j")),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> ServiceResult<SearchOutcome> {
        let started = Instant::now();

        // Query-side entity extraction is cheap relative to the paths, and
        // its failure only costs the graph path.
        let (entities, extraction_failed) =
            match self.extractor.extract_entities(&request.query).await {
                Ok(entities) => (entities, false),
                Err(e) => {
                    warn!(error = %e, "Query entity extraction failed; skipping graph path");
                    (Vec::new(), true)
                }
            };

        let ((vector_result, vector_ms), (graph_result, graph_ms)) = tokio::join!(
            async {
                let started = Instant::now();
                let result = self
                    .vector_path(&request.query, request.limit as u64, request.score_threshold)
                    .await;
                (result, started.elapsed().as_millis() as u64)
            },
            async {
                let started = Instant::now();
                let result = self.graph_path(&entities, request.graph_depth).await;
                (result, started.elapsed().as_millis() as u64)
            },
        );

        let vector_hits = vector_result?;

        let (graph_hits, graph_degraded) = match graph_result {
            Ok(hits) => (hits, extraction_failed),
            Err(e) => {
                warn!(error = %e, "Graph path failed; returning vector-only results");
                (Vec::new(), true)
            }
        };

        let mut results = merge(vector_hits, &graph_hits, request.rerank);
        results.truncate(request.limit);
        self.hydrate_graph_only_hits(&mut results).await;

        debug!(
            query = %request.query,
            results = results.len(),
            graph_degraded,
            "Hybrid search complete"
        );
        Ok(SearchOutcome {
            results,
            graph_degraded,
            timing: SearchTiming {
                total_ms: started.elapsed().as_millis() as u64,
                vector_ms,
                graph_ms,
            },
        })
    }

    async fn vector_path(
        &self,
        query: &str,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> ServiceResult<Vec<ScoredPage>> {
        let model = self.embedder.model();

        let vector = match self.cache.get_cached_embedding(model, query).await {
            Some(vector) => {
                debug!("Embedding cache hit");
                vector
            }
            None => {
                let vector = self
                    .embed_call
                    .execute(|| self.embedder.embed(query))
                    .await
                    .map_err(|e| dependency_error("embedding", e))?;
                self.cache.cache_embedding(model, query, &vector).await;
                vector
            }
        };

        self.search_call
            .execute(|| self.vectors.search(vector.clone(), limit, score_threshold))
            .await
            .map_err(|e| dependency_error("qdrant", e))
    }

    async fn graph_path(
        &self,
        entities: &[Entity],
        depth: usize,
    ) -> Result<Vec<GraphHit>, ResilienceError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut seed_ids = Vec::new();
        for entity in entities {
            let matches = self
                .graph_call
                .execute(|| {
                    self.graph
                        .find_entities(&entity.text, Some(entity.entity_type), NODE_MATCH_LIMIT)
                })
                .await?;
            seed_ids.extend(matches.into_iter().map(|e| e.entity_id));
        }
        seed_ids.sort();
        seed_ids.dedup();
        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.graph_call
            .execute(|| self.graph.pages_near_entities(&seed_ids, depth))
            .await
    }

    /// Graph-only hits carry no payload; pull content from the vector store.
    /// Best-effort: a fetch failure leaves them as bare references.
    async fn hydrate_graph_only_hits(&self, results: &mut [HybridHit]) {
        let missing: Vec<String> = results
            .iter()
            .filter(|hit| hit.content.is_empty())
            .map(|hit| hit.page_id.clone())
            .collect();
        if missing.is_empty() {
            return;
        }

        match self.vectors.fetch(&missing).await {
            Ok(pages) => {
                let by_id: HashMap<&str, &ScoredPage> =
                    pages.iter().map(|p| (p.page_id.as_str(), p)).collect();
                for hit in results.iter_mut() {
                    if let Some(page) = by_id.get(hit.page_id.as_str()) {
                        if hit.content.is_empty() {
                            hit.content = page.content.clone();
                        }
                        if hit.source_url.is_empty() {
                            hit.source_url = page.source_url.clone();
                        }
                        if hit.title.is_none() {
                            hit.title = page.title.clone();
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to hydrate graph-path results"),
        }
    }
}

fn dependency_error(dependency: &'static str, error: ResilienceError) -> ServiceError {
    match error {
        ResilienceError::CircuitOpen { .. } => ServiceError::DependencyUnavailable { dependency },
        other => ServiceError::DependencyTransient {
            dependency,
            source: other
                .into_inner()
                .unwrap_or_else(|| anyhow::anyhow!("dependency call failed")),
        },
    }
}

/// Cosine similarity clamped into [0, 1]; negative similarity carries no
/// useful signal for ranking.
fn normalize_vector_score(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

fn graph_score(hops: usize) -> f32 {
    1.0 / (1.0 + hops as f32)
}

fn hybrid_score(vector_score: Option<f32>, graph_score: Option<f32>) -> f32 {
    let both = vector_score.is_some() && graph_score.is_some();
    VECTOR_WEIGHT * vector_score.unwrap_or(0.0)
        + GRAPH_WEIGHT * graph_score.unwrap_or(0.0)
        + if both { BOTH_SOURCES_BONUS } else { 0.0 }
}

fn merge(vector_hits: Vec<ScoredPage>, graph_hits: &[GraphHit], rerank: bool) -> Vec<HybridHit> {
    let mut merged: HashMap<String, HybridHit> = HashMap::new();

    for page in vector_hits {
        let score = normalize_vector_score(page.score);
        merged.insert(
            page.page_id.clone(),
            HybridHit {
                page_id: page.page_id,
                score,
                vector_score: Some(score),
                graph_score: None,
                source: ResultSource::Vector,
                content: page.content,
                source_url: page.source_url,
                title: page.title,
            },
        );
    }

    for hit in graph_hits {
        let score = graph_score(hit.hops);
        match merged.get_mut(&hit.page_id) {
            Some(existing) => {
                existing.graph_score = Some(score);
                existing.source = ResultSource::Both;
            }
            None => {
                merged.insert(
                    hit.page_id.clone(),
                    HybridHit {
                        page_id: hit.page_id.clone(),
                        score,
                        vector_score: None,
                        graph_score: Some(score),
                        source: ResultSource::Graph,
                        content: String::new(),
                        source_url: hit.source_url.clone().unwrap_or_default(),
                        title: None,
                    },
                );
            }
        }
    }

    let mut results: Vec<HybridHit> = merged.into_values().collect();
    if rerank {
        for hit in &mut results {
            hit.score = hybrid_score(hit.vector_score, hit.graph_score);
        }
    }
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.page_id.cmp(&b.page_id)));
    results
}
