//! Canned doubles for the hybrid engine's dependencies.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use graphrag_common::{Entity, EntityType, GraphHit, Page, Relationship, ScoredPage};
use graphrag_ingest::{Embedder, EntityExtractor};
use graphrag_storage::{DedupCache, GraphStore, Subgraph, VectorStore};

pub fn scored(page_id: &str, score: f32, content: &str) -> ScoredPage {
    ScoredPage {
        page_id: page_id.into(),
        score,
        content: content.into(),
        source_url: format!("https://a.example/{page_id}"),
        title: None,
    }
}

pub struct MockEmbedder {
    pub dimension: usize,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
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
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.5; self.dimension])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
    }
}

#[derive(Default)]
pub struct MockCache {
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
}

impl MockCache {
    pub fn with_embedding(model: &str, query: &str, vector: Vec<f32>) -> Self {
        let cache = Self::default();
        cache
            .embeddings
            .lock()
            .unwrap()
            .insert(format!("{model}:{query}"), vector);
        cache
    }

    pub fn contains(&self, model: &str, query: &str) -> bool {
        self.embeddings
            .lock()
            .unwrap()
            .contains_key(&format!("{model}:{query}"))
    }
}

#[async_trait]
impl DedupCache for MockCache {
    async fn mark_processed(&self, _crawl_id: &str, _url: &str) {}

    async fn is_processed(&self, _crawl_id: &str, _url: &str) -> bool {
        false
    }

    async fn processed_count(&self, _crawl_id: &str) -> u64 {
        0
    }

    async fn cleanup(&self, _crawl_id: &str) {}

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
    pub results: Vec<ScoredPage>,
    pub stored: Vec<ScoredPage>,
    pub fail: bool,
}

impl MockVectorStore {
    pub fn with_results(results: Vec<ScoredPage>) -> Self {
        Self {
            results,
            stored: Vec::new(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            stored: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_page(&self, _page_id: &str, _vector: Vec<f32>, _page: &Page) -> Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        _vector: Vec<f32>,
        _limit: u64,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPage>> {
        if self.fail {
            anyhow::bail!("vector store down");
        }
        Ok(self.results.clone())
    }

    async fn fetch(&self, page_ids: &[String]) -> Result<Vec<ScoredPage>> {
        Ok(self
            .stored
            .iter()
            .filter(|p| page_ids.contains(&p.page_id))
            .cloned()
            .collect())
    }
}

pub struct MockGraphStore {
    pub entities: Vec<Entity>,
    pub hits: Vec<GraphHit>,
    pub fail: bool,
    find_called: AtomicBool,
}

impl MockGraphStore {
    pub fn with_hits(entities: Vec<Entity>, hits: Vec<GraphHit>) -> Self {
        Self {
            entities,
            hits,
            fail: false,
            find_called: AtomicBool::new(false),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits(Vec::new(), Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }

    pub fn find_was_called(&self) -> bool {
        self.find_called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        Ok(())
    }

    async fn merge_entity(&self, _entity: &Entity) -> Result<()> {
        Ok(())
    }

    async fn merge_relationship(&self, _relationship: &Relationship) -> Result<()> {
        Ok(())
    }

    async fn link_mention(&self, _entity_id: &str, _page_id: &str, _source_url: &str) -> Result<()> {
        Ok(())
    }

    async fn find_entities(
        &self,
        text: &str,
        _entity_type: Option<EntityType>,
        _limit: usize,
    ) -> Result<Vec<Entity>> {
        self.find_called.store(true, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("graph store down");
        }
        Ok(self
            .entities
            .iter()
            .filter(|e| e.text.eq_ignore_ascii_case(text))
            .cloned()
            .collect())
    }

    async fn pages_near_entities(
        &self,
        _entity_ids: &[String],
        _depth: usize,
    ) -> Result<Vec<GraphHit>> {
        if self.fail {
            anyhow::bail!("graph store down");
        }
        Ok(self.hits.clone())
    }

    async fn entity_connections(&self, _entity_id: &str, _depth: usize) -> Result<Subgraph> {
        Ok(Subgraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        })
    }
}

/// Extracts `Paris` (GPE) from queries that mention it.
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
