//! End-to-end test harness: a real router, queue, processor, and engine over
//! in-memory dependency doubles.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use graphrag_api::AppState;
use graphrag_common::{
    Entity, EntityType, GraphHit, Page, Relationship, RetryConfig, ScoredPage, SystemConfig,
};
use graphrag_ingest::{Embedder, EntityExtractor, IngestQueue, LanguageGate, PageProcessor};
use graphrag_resilience::{BreakerRegistry, RetryPolicy};
use graphrag_retrieval::HybridEngine;
use graphrag_storage::{DedupCache, GraphStore, Subgraph, VectorStore};

const DIMENSION: usize = 4;

#[derive(Default)]
pub struct MockDedup {
    sets: Mutex<HashMap<String, HashSet<String>>>,
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
}

impl MockDedup {
    pub fn contains(&self, crawl_id: &str, url: &str) -> bool {
        self.sets
            .lock()
            .unwrap()
            .get(crawl_id)
            .is_some_and(|set| set.contains(url))
    }
}

#[async_trait]
impl DedupCache for MockDedup {
    async fn mark_processed(&self, crawl_id: &str, url: &str) {
        self.sets
            .lock()
            .unwrap()
            .entry(crawl_id.to_string())
            .or_default()
            .insert(url.to_string());
    }

    async fn is_processed(&self, crawl_id: &str, url: &str) -> bool {
        self.contains(crawl_id, url)
    }

    async fn processed_count(&self, crawl_id: &str) -> u64 {
        self.sets
            .lock()
            .unwrap()
            .get(crawl_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }

    async fn cleanup(&self, crawl_id: &str) {
        self.sets.lock().unwrap().remove(crawl_id);
    }

    async fn cache_embedding(&self, model: &str, query: &str, vector: &[f32]) {
        self.embeddings
            .lock()
            .unwrap()
            .insert(format!("{model}:{query}"), vector.to_vec());
    }

    async fn get_cached_embedding(&self, model: &str, query: &str) -> Option<Vec<f32>> {
        self.embeddings
            .lock()
            .unwrap()
            .get(&format!("{model}:{query}"))
            .cloned()
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct MockVectorStore {
    pub search_results: Mutex<Vec<ScoredPage>>,
    upserts: Mutex<Vec<String>>,
}

impl MockVectorStore {
    pub fn upserted_ids(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn set_search_results(&self, results: Vec<ScoredPage>) {
        *self.search_results.lock().unwrap() = results;
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_page(&self, page_id: &str, _vector: Vec<f32>, _page: &Page) -> Result<()> {
        self.upserts.lock().unwrap().push(page_id.to_string());
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        _limit: u64,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPage>> {
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn fetch(&self, _page_ids: &[String]) -> Result<Vec<ScoredPage>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockGraphStore {
    entities: Mutex<Vec<Entity>>,
    mentions: Mutex<Vec<(String, String)>>,
}

impl MockGraphStore {
    pub fn merged_entities(&self) -> Vec<Entity> {
        self.entities.lock().unwrap().clone()
    }

    pub fn mentions(&self) -> Vec<(String, String)> {
        self.mentions.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn merge_entity(&self, entity: &Entity) -> Result<()> {
        self.entities.lock().unwrap().push(entity.clone());
        Ok(())
    }

    async fn merge_relationship(&self, _relationship: &Relationship) -> Result<()> {
        Ok(())
    }

    async fn link_mention(&self, entity_id: &str, page_id: &str, _source_url: &str) -> Result<()> {
        self.mentions
            .lock()
            .unwrap()
            .push((entity_id.to_string(), page_id.to_string()));
        Ok(())
    }

    async fn find_entities(
        &self,
        text: &str,
        _entity_type: Option<EntityType>,
        _limit: usize,
    ) -> Result<Vec<Entity>> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.text.eq_ignore_ascii_case(text))
            .cloned()
            .collect())
    }

    async fn pages_near_entities(
        &self,
        entity_ids: &[String],
        _depth: usize,
    ) -> Result<Vec<GraphHit>> {
        // Pages directly mentioned by the seed entities, hop 0.
        Ok(self
            .mentions
            .lock()
            .unwrap()
            .iter()
            .filter(|(entity_id, _)| entity_ids.contains(entity_id))
            .map(|(_, page_id)| GraphHit {
                page_id: page_id.clone(),
                source_url: None,
                hops: 0,
            })
            .collect())
    }

    async fn entity_connections(&self, _entity_id: &str, _depth: usize) -> Result<Subgraph> {
        Ok(Subgraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        })
    }
}

pub struct MockEmbedder {
    pub block: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            block: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn blocking() -> Self {
        Self {
            block: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model(&self) -> &str {
        "mock-embed"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.block {
            futures::future::pending::<()>().await;
        }
        Ok(texts.iter().map(|_| vec![0.1; DIMENSION]).collect())
    }
}

/// Extracts `Paris` (GPE) wherever the text mentions it.
#[derive(Default)]
pub struct MockExtractor;

#[async_trait]
impl EntityExtractor for MockExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        if text.contains("Paris") {
            Ok(vec![Entity::new(EntityType::Gpe, "Paris")])
        } else {
            Ok(Vec::new())
        }
    }

    async fn extract_relationships(
        &self,
        _text: &str,
        _entities: &[Entity],
    ) -> Result<Vec<Relationship>> {
        Ok(Vec::new())
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub dedup: Arc<MockDedup>,
    pub vectors: Arc<MockVectorStore>,
    pub graph: Arc<MockGraphStore>,
    pub embedder: Arc<MockEmbedder>,
}

pub fn test_state(secret: Option<&str>) -> TestHarness {
    test_state_with(secret, MockEmbedder::new(), 64)
}

pub fn test_state_with(
    secret: Option<&str>,
    embedder: MockEmbedder,
    queue_capacity: usize,
) -> TestHarness {
    let mut config = SystemConfig::default();
    config.webhook.shared_secret = secret.map(String::from);
    config.models.vector_dimension = DIMENSION;

    let dedup = Arc::new(MockDedup::default());
    let vectors = Arc::new(MockVectorStore::default());
    let graph = Arc::new(MockGraphStore::default());
    let embedder = Arc::new(embedder);
    let extractor = Arc::new(MockExtractor);
    let breakers = BreakerRegistry::new(5, Duration::from_secs(60));
    let retry = RetryConfig {
        max_attempts: 1,
        base_delay_seconds: 0.0,
        max_delay_seconds: 0.0,
    };

    let processor = Arc::new(PageProcessor::new(
        dedup.clone(),
        vectors.clone(),
        graph.clone(),
        embedder.clone(),
        extractor.clone(),
        LanguageGate::new(&config.language),
        &breakers,
        &retry,
        config.models.embed_batch_size,
    ));
    let queue = Arc::new(IngestQueue::start(processor, 2, queue_capacity));

    let engine = Arc::new(HybridEngine::new(
        embedder.clone(),
        vectors.clone(),
        graph.clone(),
        extractor,
        dedup.clone(),
        &breakers,
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
    ));

    let state = AppState::new(config, queue, engine, graph.clone(), dedup.clone());
    TestHarness {
        state,
        dedup,
        vectors,
        graph,
        embedder,
    }
}

/// Poll until `condition` holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
