//! Storage adapters: vector store, graph store, and the dedup/cache store.

pub mod neo4j;
pub mod qdrant;
pub mod redis;

pub use self::neo4j::{GraphStore, Neo4jGraphStore, RelationshipRecord, Subgraph};
pub use self::qdrant::{QdrantVectorStore, VectorStore};
pub use self::redis::{DedupCache, RedisDedupCache, UnavailableDedupCache};
