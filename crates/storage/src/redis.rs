//! Redis-backed dedup and embedding-cache store.
//!
//! Availability-aware by contract: every read degrades to a safe default
//! (`false`, `0`, `None`) and every write is logged and swallowed when the
//! store is down. Correctness never depends on this store, only efficiency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use graphrag_common::{dedup_set_key, embedding_cache_key};

#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Add `url` to the crawl's processed set and refresh the TTL. Idempotent.
    async fn mark_processed(&self, crawl_id: &str, url: &str);

    /// Fail-open: `false` when the store is unavailable.
    async fn is_processed(&self, crawl_id: &str, url: &str) -> bool;

    /// Cardinality of the processed set; `0` when unavailable.
    async fn processed_count(&self, crawl_id: &str) -> u64;

    /// Drop the crawl's dedup state (terminal crawl events).
    async fn cleanup(&self, crawl_id: &str);

    async fn cache_embedding(&self, model: &str, query: &str, vector: &[f32]);

    async fn get_cached_embedding(&self, model: &str, query: &str) -> Option<Vec<f32>>;

    /// Non-blocking health probe (PING with a short timeout).
    async fn is_available(&self) -> bool;
}

#[derive(Serialize, Deserialize)]
struct CachedEmbedding {
    query: String,
    vector: Vec<f32>,
}

pub struct RedisDedupCache {
    connection: MultiplexedConnection,
    dedup_ttl: Duration,
    embed_ttl: Duration,
    degraded: AtomicBool,
}

impl RedisDedupCache {
    pub async fn connect(url: &str, dedup_ttl: Duration, embed_ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid Redis url")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;
        Ok(Self {
            connection,
            dedup_ttl,
            embed_ttl,
            degraded: AtomicBool::new(false),
        })
    }

    /// Log loudly on the first failure, quietly afterwards.
    fn note_failure(&self, operation: &str, error: &redis::RedisError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(operation, %error, "Dedup/cache store unavailable; continuing without it");
        } else {
            debug!(operation, %error, "Dedup/cache store still unavailable");
        }
    }

    fn note_recovery(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            warn!("Dedup/cache store recovered");
        }
    }
}

#[async_trait]
impl DedupCache for RedisDedupCache {
    async fn mark_processed(&self, crawl_id: &str, url: &str) {
        let key = dedup_set_key(crawl_id);
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = redis::pipe()
            .sadd(&key, url)
            .ignore()
            .expire(&key, self.dedup_ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => self.note_recovery(),
            Err(e) => self.note_failure("mark_processed", &e),
        }
    }

    async fn is_processed(&self, crawl_id: &str, url: &str) -> bool {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<bool> =
            conn.sismember(dedup_set_key(crawl_id), url).await;
        match result {
            Ok(member) => {
                self.note_recovery();
                member
            }
            Err(e) => {
                self.note_failure("is_processed", &e);
                false
            }
        }
    }

    async fn processed_count(&self, crawl_id: &str) -> u64 {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<u64> = conn.scard(dedup_set_key(crawl_id)).await;
        match result {
            Ok(count) => {
                self.note_recovery();
                count
            }
            Err(e) => {
                self.note_failure("processed_count", &e);
                0
            }
        }
    }

    async fn cleanup(&self, crawl_id: &str) {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn.del(dedup_set_key(crawl_id)).await;
        if let Err(e) = result {
            self.note_failure("cleanup", &e);
        }
    }

    async fn cache_embedding(&self, model: &str, query: &str, vector: &[f32]) {
        let entry = CachedEmbedding {
            query: query.to_string(),
            vector: vector.to_vec(),
        };
        let serialized = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to serialize embedding cache entry");
                return;
            }
        };

        let mut conn = self.connection.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(
                embedding_cache_key(model, query),
                serialized,
                self.embed_ttl.as_secs(),
            )
            .await;
        if let Err(e) = result {
            self.note_failure("cache_embedding", &e);
        }
    }

    async fn get_cached_embedding(&self, model: &str, query: &str) -> Option<Vec<f32>> {
        let mut conn = self.connection.clone();
        let result: redis::RedisResult<Option<String>> =
            conn.get(embedding_cache_key(model, query)).await;
        match result {
            Ok(Some(raw)) => {
                self.note_recovery();
                match serde_json::from_str::<CachedEmbedding>(&raw) {
                    Ok(entry) => Some(entry.vector),
                    Err(e) => {
                        warn!(error = %e, "Discarding unreadable embedding cache entry");
                        None
                    }
                }
            }
            Ok(None) => {
                self.note_recovery();
                None
            }
            Err(e) => {
                self.note_failure("get_cached_embedding", &e);
                None
            }
        }
    }

    async fn is_available(&self) -> bool {
        let mut conn = self.connection.clone();
        let ping = async {
            let pong: redis::RedisResult<String> =
                redis::cmd("PING").query_async(&mut conn).await;
            pong
        };
        matches!(
            tokio::time::timeout(Duration::from_secs(2), ping).await,
            Ok(Ok(_))
        )
    }
}

/// Fallback selected when the Redis health probe fails at startup. Every
/// read returns its safe default; writes are no-ops.
pub struct UnavailableDedupCache;

#[async_trait]
impl DedupCache for UnavailableDedupCache {
    async fn mark_processed(&self, _crawl_id: &str, _url: &str) {}

    async fn is_processed(&self, _crawl_id: &str, _url: &str) -> bool {
        false
    }

    async fn processed_count(&self, _crawl_id: &str) -> u64 {
        0
    }

    async fn cleanup(&self, _crawl_id: &str) {}

    async fn cache_embedding(&self, _model: &str, _query: &str, _vector: &[f32]) {}

    async fn get_cached_embedding(&self, _model: &str, _query: &str) -> Option<Vec<f32>> {
        None
    }

    async fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_store_returns_safe_defaults() {
        let cache = UnavailableDedupCache;

        cache.mark_processed("c1", "https://a.example/p1").await;
        assert!(!cache.is_processed("c1", "https://a.example/p1").await);
        assert_eq!(cache.processed_count("c1").await, 0);
        assert!(cache.get_cached_embedding("m", "q").await.is_none());
        assert!(!cache.is_available().await);
    }

    #[test]
    fn key_layout_matches_the_contract() {
        assert_eq!(dedup_set_key("c1"), "crawl:c1:processed");
        assert!(embedding_cache_key("m", "q").starts_with("embed:query:"));
    }
}
