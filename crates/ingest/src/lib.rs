//! Webhook ingestion pipeline: model clients, language gate, per-page
//! processor, and the bounded work queue feeding it.

pub mod embedder;
pub mod extractor;
pub mod language;
pub mod processor;
pub mod queue;

pub use embedder::{Embedder, OllamaEmbedder};
pub use extractor::{EntityExtractor, LlmExtractor};
pub use language::LanguageGate;
pub use processor::PageProcessor;
pub use queue::{IngestQueue, WorkItem};
