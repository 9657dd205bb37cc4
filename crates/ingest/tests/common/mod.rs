//! In-memory doubles for the processor's dependencies.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use graphrag_common::{
    Entity, EntityType, GraphHit, Page, PageMetadata, Relationship, RetryConfig, ServiceError,
};
use graphrag_storage::{DedupCache, GraphStore, Subgraph, VectorStore};
use graphrag_ingest::{Embedder, EntityExtractor};

pub fn make_page(url: &str, content: &str) -> Page {
    Page {
        content: content.into(),
        metadata: PageMetadata {
            source_url: url.into(),
            status_code: 200,
            title: None,
            extra: Default::default(),
        },
        links: vec![],
    }
}

/// Retry config that never sleeps, for fast tests.
pub fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_seconds: 0.0,
        max_delay_seconds: 0.0,
    }
}

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
            .map(|set| set.len() as u64)
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

pub struct MockVectorStore {
    pub dimension: usize,
    pub fail: bool,
    upserts: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl MockVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            upserts: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub fn upserted_ids(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_page(&self, page_id: &str, vector: Vec<f32>, _page: &Page) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("vector store down");
        }
        if vector.len() != self.dimension {
            return Err(ServiceError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            }
            .into());
        }
        self.upserts.lock().unwrap().push(page_id.to_string());
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        _limit: u64,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<graphrag_common::ScoredPage>> {
        Ok(Vec::new())
    }

    async fn fetch(&self, _page_ids: &[String]) -> Result<Vec<graphrag_common::ScoredPage>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockGraphStore {
    pub fail: bool,
    entities: Mutex<Vec<Entity>>,
    mentions: Mutex<Vec<(String, String)>>,
    relationships: Mutex<Vec<Relationship>>,
}

impl MockGraphStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn merged_entities(&self) -> Vec<Entity> {
        self.entities.lock().unwrap().clone()
    }

    pub fn mentions(&self) -> Vec<(String, String)> {
        self.mentions.lock().unwrap().clone()
    }

    pub fn merged_relationships(&self) -> Vec<Relationship> {
        self.relationships.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn merge_entity(&self, entity: &Entity) -> Result<()> {
        if self.fail {
            anyhow::bail!("graph store down");
        }
        self.entities.lock().unwrap().push(entity.clone());
        Ok(())
    }

    async fn merge_relationship(&self, relationship: &Relationship) -> Result<()> {
        if self.fail {
            anyhow::bail!("graph store down");
        }
        self.relationships.lock().unwrap().push(relationship.clone());
        Ok(())
    }

    async fn link_mention(&self, entity_id: &str, page_id: &str, _source_url: &str) -> Result<()> {
        if self.fail {
            anyhow::bail!("graph store down");
        }
        self.mentions
            .lock()
            .unwrap()
            .push((entity_id.to_string(), page_id.to_string()));
        Ok(())
    }

    async fn find_entities(
        &self,
        _text: &str,
        _entity_type: Option<EntityType>,
        _limit: usize,
    ) -> Result<Vec<Entity>> {
        Ok(Vec::new())
    }

    async fn pages_near_entities(
        &self,
        _entity_ids: &[String],
        _depth: usize,
    ) -> Result<Vec<GraphHit>> {
        Ok(Vec::new())
    }

    async fn entity_connections(&self, _entity_id: &str, _depth: usize) -> Result<Subgraph> {
        Ok(Subgraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        })
    }
}

pub struct MockEmbedder {
    pub dimension: usize,
    pub fail: bool,
    pub block: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            block: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    /// Never returns; parks the worker that calls it.
    pub fn blocking(dimension: usize) -> Self {
        Self {
            block: true,
            ..Self::new(dimension)
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
        self.dimension
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
        if self.fail {
            anyhow::bail!("embedding service down");
        }
        Ok(texts.iter().map(|_| vec![0.1; self.dimension]).collect())
    }
}

/// Extracts `Paris` (GPE) whenever the text mentions it; nothing otherwise.
#[derive(Default)]
pub struct MockExtractor {
    pub fail: bool,
}

impl MockExtractor {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl EntityExtractor for MockExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        if self.fail {
            anyhow::bail!("extraction service down");
        }
        let mut entities = Vec::new();
        if text.contains("Paris") {
            entities.push(Entity::new(EntityType::Gpe, "Paris"));
        }
        if text.contains("Curie") {
            entities.push(Entity::new(EntityType::Person, "Marie Curie"));
        }
        Ok(entities)
    }

    async fn extract_relationships(
        &self,
        _text: &str,
        entities: &[Entity],
    ) -> Result<Vec<Relationship>> {
        if self.fail {
            anyhow::bail!("extraction service down");
        }
        if entities.len() < 2 {
            return Ok(Vec::new());
        }
        Ok(vec![Relationship {
            source_id: entities[1].entity_id.clone(),
            predicate: graphrag_common::Predicate::LocatedIn,
            target_id: entities[0].entity_id.clone(),
        }])
    }
}
