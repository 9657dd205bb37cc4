use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One crawled document, as delivered in a webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Markdown content of the page.
    #[serde(rename = "markdown")]
    pub content: String,
    pub metadata: PageMetadata,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    pub source_url: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whatever else the crawler attached; preserved into the vector payload.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Page {
    pub fn source_url(&self) -> &str {
        &self.metadata.source_url
    }

    /// Deterministic point id for this page. Qdrant only accepts integer or
    /// UUID point ids, so the sha256 of the source url is folded into a UUID.
    pub fn page_id(&self) -> String {
        page_id(&self.metadata.source_url)
    }
}

/// Stable page id derived from the source url. Re-ingesting the same url
/// always lands on the same point (upsert, never append).
pub fn page_id(source_url: &str) -> String {
    let digest = Sha256::digest(source_url.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Cache key for a query embedding, namespaced by embedding model so a model
/// upgrade can never serve stale vectors.
pub fn embedding_cache_key(model: &str, query: &str) -> String {
    let digest = Sha256::digest(format!("{model}:{query}").as_bytes());
    format!("embed:query:{}", hex::encode(digest))
}

/// Redis set holding the processed urls of one crawl.
pub fn dedup_set_key(crawl_id: &str) -> String {
    format!("crawl:{crawl_id}:processed")
}

/// Entity category, the controlled label vocabulary of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Org,
    Gpe,
    Product,
    Event,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Product => "PRODUCT",
            Self::Event => "EVENT",
            Self::Other => "OTHER",
        }
    }

    /// Lenient parse; extractor output is model-generated and noisy.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "ORG" | "ORGANIZATION" | "COMPANY" => Self::Org,
            "GPE" | "LOC" | "LOCATION" | "PLACE" => Self::Gpe,
            "PRODUCT" => Self::Product,
            "EVENT" => Self::Event,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed noun-phrase reference extracted from text. `entity_id` is stable
/// across pages: the same (type, text) pair always collapses to one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub text: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            entity_id: entity_id(entity_type, &text),
            entity_type,
            text,
        }
    }
}

pub fn entity_id(entity_type: EntityType, text: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", entity_type, text.to_lowercase()).as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Edge predicate vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    WorksAt,
    LocatedIn,
    CollaboratesWith,
    PartOf,
    Produces,
    RelatedTo,
}

impl Predicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorksAt => "WORKS_AT",
            Self::LocatedIn => "LOCATED_IN",
            Self::CollaboratesWith => "COLLABORATES_WITH",
            Self::PartOf => "PART_OF",
            Self::Produces => "PRODUCES",
            Self::RelatedTo => "RELATED_TO",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().replace(' ', "_").as_str() {
            "WORKS_AT" | "WORKS_FOR" | "EMPLOYED_BY" => Self::WorksAt,
            "LOCATED_IN" | "BASED_IN" => Self::LocatedIn,
            "COLLABORATES_WITH" | "PARTNERS_WITH" => Self::CollaboratesWith,
            "PART_OF" | "MEMBER_OF" => Self::PartOf,
            "PRODUCES" | "MAKES" | "CREATED" => Self::Produces,
            _ => Self::RelatedTo,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two entities already merged into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub predicate: Predicate,
    pub target_id: String,
}

/// A scored hit from the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPage {
    pub page_id: String,
    pub score: f32,
    pub content: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A page reached through graph traversal, with the hop distance from the
/// closest seed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHit {
    pub page_id: String,
    pub source_url: Option<String>,
    pub hops: usize,
}

/// Which retrieval path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Vector,
    Graph,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_id_is_stable_and_uuid_shaped() {
        let a = page_id("https://a.example/p1");
        let b = page_id("https://a.example/p1");
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_ne!(a, page_id("https://a.example/p2"));
    }

    #[test]
    fn entity_id_collapses_case_but_not_type() {
        let a = Entity::new(EntityType::Gpe, "Paris");
        let b = Entity::new(EntityType::Gpe, "paris");
        let c = Entity::new(EntityType::Person, "Paris");
        assert_eq!(a.entity_id, b.entity_id);
        assert_ne!(a.entity_id, c.entity_id);
    }

    #[test]
    fn entity_type_parse_is_lenient() {
        assert_eq!(EntityType::parse("organization"), EntityType::Org);
        assert_eq!(EntityType::parse("LOC"), EntityType::Gpe);
        assert_eq!(EntityType::parse("whatever"), EntityType::Other);
    }

    #[test]
    fn predicate_parse_maps_aliases() {
        assert_eq!(Predicate::parse("works for"), Predicate::WorksAt);
        assert_eq!(Predicate::parse("unknown edge"), Predicate::RelatedTo);
    }

    #[test]
    fn embedding_cache_key_is_model_namespaced() {
        let a = embedding_cache_key("nomic-embed-text", "what about paris?");
        let b = embedding_cache_key("mxbai-embed-large", "what about paris?");
        assert_ne!(a, b);
        assert!(a.starts_with("embed:query:"));
    }
}
