//! Service configuration, read once from the environment at startup.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub storage: StorageConfig,
    pub models: ModelConfig,
    pub language: LanguageConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// When set, every inbound webhook must carry a valid HMAC-SHA256 of the
    /// raw body under this secret. When unset, verification is skipped.
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub redis_url: String,
    pub dedup_ttl_seconds: u64,
    pub embed_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub ollama_url: String,
    pub embedding_model: String,
    pub extraction_model: String,
    /// Fixed per collection; every vector written or searched must match.
    pub vector_dimension: usize,
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageFilterMode {
    Disabled,
    Lenient,
    Strict,
}

impl FromStr for LanguageFilterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => bail!("unknown language filter mode: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub mode: LanguageFilterMode,
    /// ISO 639-3 codes, e.g. "eng".
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_seconds)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub recovery_timeout_seconds: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
            },
            webhook: WebhookConfig {
                shared_secret: None,
            },
            storage: StorageConfig {
                qdrant_url: "http://localhost:6334".into(),
                qdrant_collection: "pages".into(),
                neo4j_uri: "bolt://localhost:7687".into(),
                neo4j_user: "neo4j".into(),
                neo4j_password: "password".into(),
                redis_url: "redis://localhost:6379".into(),
                dedup_ttl_seconds: 3600,
                embed_ttl_seconds: 3600,
            },
            models: ModelConfig {
                ollama_url: "http://localhost:11434".into(),
                embedding_model: "nomic-embed-text".into(),
                extraction_model: "llama3.1:8b".into(),
                vector_dimension: 768,
                embed_batch_size: 80,
            },
            language: LanguageConfig {
                mode: LanguageFilterMode::Disabled,
                allowed: vec!["eng".into()],
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_seconds: 1.0,
                max_delay_seconds: 10.0,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_seconds: 60,
            },
            ingest: IngestConfig {
                worker_pool_size: default_worker_pool_size(),
                queue_capacity: 1024,
            },
        }
    }
}

fn default_worker_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl SystemConfig {
    /// Build the configuration from the environment, falling back to the
    /// defaults above for anything unset. Called once at process start.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            server: ServerConfig {
                host: env_or("GRAPHRAG_HOST", defaults.server.host),
                port: env_parsed("GRAPHRAG_PORT", defaults.server.port)?,
            },
            webhook: WebhookConfig {
                shared_secret: std::env::var("WEBHOOK_SHARED_SECRET")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },
            storage: StorageConfig {
                qdrant_url: env_or("QDRANT_URL", defaults.storage.qdrant_url),
                qdrant_collection: env_or("QDRANT_COLLECTION", defaults.storage.qdrant_collection),
                neo4j_uri: env_or("NEO4J_URI", defaults.storage.neo4j_uri),
                neo4j_user: env_or("NEO4J_USER", defaults.storage.neo4j_user),
                neo4j_password: env_or("NEO4J_PASSWORD", defaults.storage.neo4j_password),
                redis_url: env_or("REDIS_URL", defaults.storage.redis_url),
                dedup_ttl_seconds: env_parsed(
                    "DEDUP_TTL_SECONDS",
                    defaults.storage.dedup_ttl_seconds,
                )?,
                embed_ttl_seconds: env_parsed(
                    "EMBED_TTL_SECONDS",
                    defaults.storage.embed_ttl_seconds,
                )?,
            },
            models: ModelConfig {
                ollama_url: env_or("OLLAMA_URL", defaults.models.ollama_url),
                embedding_model: env_or("EMBEDDING_MODEL", defaults.models.embedding_model),
                extraction_model: env_or("EXTRACTION_MODEL", defaults.models.extraction_model),
                vector_dimension: env_parsed("VECTOR_DIMENSION", defaults.models.vector_dimension)?,
                embed_batch_size: env_parsed("EMBED_BATCH_SIZE", defaults.models.embed_batch_size)?,
            },
            language: LanguageConfig {
                mode: match std::env::var("LANGUAGE_FILTER_MODE") {
                    Ok(raw) if !raw.is_empty() => raw.parse()?,
                    _ => defaults.language.mode,
                },
                allowed: std::env::var("ALLOWED_LANGUAGES")
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_lowercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.language.allowed),
            },
            retry: RetryConfig {
                max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay_seconds: env_parsed(
                    "RETRY_BASE_DELAY_SECONDS",
                    defaults.retry.base_delay_seconds,
                )?,
                max_delay_seconds: env_parsed(
                    "RETRY_MAX_DELAY_SECONDS",
                    defaults.retry.max_delay_seconds,
                )?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_parsed(
                    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                    defaults.circuit_breaker.failure_threshold,
                )?,
                recovery_timeout_seconds: env_parsed(
                    "CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECONDS",
                    defaults.circuit_breaker.recovery_timeout_seconds,
                )?,
            },
            ingest: IngestConfig {
                worker_pool_size: env_parsed(
                    "WORKER_POOL_SIZE",
                    defaults.ingest.worker_pool_size,
                )?,
                queue_capacity: env_parsed(
                    "INGEST_QUEUE_CAPACITY",
                    defaults.ingest.queue_capacity,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.vector_dimension == 0 {
            bail!("vector_dimension must be positive");
        }
        if self.models.embed_batch_size == 0 {
            bail!("embed_batch_size must be positive");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be positive");
        }
        if self.ingest.worker_pool_size == 0 {
            bail!("worker_pool_size must be positive");
        }
        if self.ingest.queue_capacity == 0 {
            bail!("ingest_queue_capacity must be positive");
        }
        if self.language.mode != LanguageFilterMode::Disabled && self.language.allowed.is_empty() {
            bail!("allowed_languages must not be empty when language filtering is enabled");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        _ => Ok(default),
    }
}
