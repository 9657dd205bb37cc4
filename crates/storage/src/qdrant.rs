//! Qdrant-backed vector store.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, CreateCollectionBuilder, Distance, GetPointsBuilder, PointId,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::info;

use graphrag_common::{Page, ScoredPage, ServiceError};

/// The vector index. One point per page, upserted by deterministic id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert or overwrite the point for `page_id`. Rejects vectors whose
    /// length differs from the collection dimension before any write.
    async fn upsert_page(&self, page_id: &str, vector: Vec<f32>, page: &Page) -> Result<()>;

    /// Top-`limit` cosine search.
    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPage>>;

    /// Payload lookup by point id, for hydrating graph-path hits. Missing
    /// ids are omitted, not errors.
    async fn fetch(&self, page_ids: &[String]) -> Result<Vec<ScoredPage>>;
}

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .context("failed to build Qdrant client")?;
        Ok(Self {
            client,
            collection: collection.into(),
            dimension,
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ServiceError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        if self
            .client
            .collection_exists(&self.collection)
            .await
            .context("failed to check Qdrant collection")?
        {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .context("failed to create Qdrant collection")?;
        info!(collection = %self.collection, dimension = self.dimension, "Created Qdrant collection");
        Ok(())
    }

    async fn upsert_page(&self, page_id: &str, vector: Vec<f32>, page: &Page) -> Result<()> {
        self.check_dimension(&vector)?;

        let payload = Payload::try_from(serde_json::json!({
            "content": page.content,
            "source_url": page.metadata.source_url,
            "title": page.metadata.title,
            "status_code": page.metadata.status_code,
            "metadata": serde_json::Value::Object(page.metadata.extra.clone()),
        }))
        .context("failed to build point payload")?;

        let point = PointStruct::new(page_id.to_string(), vector, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .context("failed to upsert point")?;
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPage>> {
        self.check_dimension(&vector)?;

        let mut request = SearchPointsBuilder::new(&self.collection, vector, limit)
            .with_payload(true);
        if let Some(threshold) = score_threshold {
            request = request.score_threshold(threshold);
        }

        let response = self
            .client
            .search_points(request)
            .await
            .context("vector search failed")?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let page_id = point
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|id| match id {
                        PointIdOptions::Uuid(uuid) => uuid,
                        PointIdOptions::Num(num) => num.to_string(),
                    })
                    .unwrap_or_default();
                ScoredPage {
                    page_id,
                    score: point.score,
                    content: payload_str(&point.payload, "content").unwrap_or_default(),
                    source_url: payload_str(&point.payload, "source_url").unwrap_or_default(),
                    title: payload_str(&point.payload, "title"),
                }
            })
            .collect();
        Ok(hits)
    }

    async fn fetch(&self, page_ids: &[String]) -> Result<Vec<ScoredPage>> {
        if page_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<PointId> = page_ids.iter().map(|id| id.clone().into()).collect();

        let response = self
            .client
            .get_points(GetPointsBuilder::new(&self.collection, ids).with_payload(true))
            .await
            .context("point fetch failed")?;

        let pages = response
            .result
            .into_iter()
            .map(|point| {
                let page_id = point
                    .id
                    .and_then(|id| id.point_id_options)
                    .map(|id| match id {
                        PointIdOptions::Uuid(uuid) => uuid,
                        PointIdOptions::Num(num) => num.to_string(),
                    })
                    .unwrap_or_default();
                ScoredPage {
                    page_id,
                    score: 0.0,
                    content: payload_str(&point.payload, "content").unwrap_or_default(),
                    source_url: payload_str(&point.payload, "source_url").unwrap_or_default(),
                    title: payload_str(&point.payload, "title"),
                }
            })
            .collect();
        Ok(pages)
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}
