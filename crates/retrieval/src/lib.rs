//! Hybrid retrieval: vector similarity and graph traversal fused at query
//! time.

pub mod engine;

pub use engine::{HybridEngine, HybridHit, SearchOutcome, SearchRequest, SearchTiming};
