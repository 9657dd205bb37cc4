//! LLM-backed entity and relationship extraction.
//!
//! Runs over page content at ingest time and over the bare query string at
//! query time. Output is model-generated JSON, so everything is parsed
//! leniently: unknown entity types become `OTHER`, unresolvable relationship
//! endpoints are dropped.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use graphrag_common::{Entity, EntityType, Predicate, Relationship};

/// Text beyond this is not worth an extraction prompt.
const MAX_PROMPT_CHARS: usize = 8000;

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>>;

    /// One call over the whole entity set, not one per pair.
    async fn extract_relationships(
        &self,
        text: &str,
        entities: &[Entity],
    ) -> Result<Vec<Relationship>>;
}

/// Client for an Ollama-compatible `/api/chat` endpoint in JSON mode.
pub struct LlmExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'a str,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct EntityListJson {
    #[serde(default)]
    entities: Vec<EntityJson>,
}

#[derive(Deserialize)]
struct EntityJson {
    text: String,
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
}

#[derive(Deserialize)]
struct RelationshipListJson {
    #[serde(default)]
    relationships: Vec<RelationshipJson>,
}

#[derive(Deserialize)]
struct RelationshipJson {
    source: String,
    predicate: String,
    target: String,
}

impl LlmExtractor {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build extraction HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    async fn chat(&self, prompt: String) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                stream: false,
                format: "json",
                options: ChatOptions { temperature: 0.0 },
            })
            .send()
            .await
            .context("extraction request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("extraction service returned {status}: {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("invalid extraction response body")?;
        Ok(parsed.message.content)
    }
}

fn truncate_for_prompt(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl EntityExtractor for LlmExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<Entity>> {
        let text = truncate_for_prompt(text);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prompt = format!(
            "Extract the named entities from the text below. Respond with JSON only, \
             shaped as {{\"entities\": [{{\"text\": \"...\", \"type\": \"PERSON|ORG|GPE|PRODUCT|EVENT|OTHER\"}}]}}.\n\
             Text:\n{text}"
        );
        let content = self.chat(prompt).await?;
        let parsed: EntityListJson =
            serde_json::from_str(&content).context("extractor returned malformed entity JSON")?;

        let mut entities: Vec<Entity> = Vec::new();
        for item in parsed.entities {
            let text = item.text.trim();
            if text.is_empty() {
                continue;
            }
            let entity_type = item
                .entity_type
                .as_deref()
                .map(EntityType::parse)
                .unwrap_or(EntityType::Other);
            let entity = Entity::new(entity_type, text);
            if !entities.iter().any(|e| e.entity_id == entity.entity_id) {
                entities.push(entity);
            }
        }
        debug!(count = entities.len(), "Extracted entities");
        Ok(entities)
    }

    async fn extract_relationships(
        &self,
        text: &str,
        entities: &[Entity],
    ) -> Result<Vec<Relationship>> {
        if entities.len() < 2 {
            return Ok(Vec::new());
        }

        let entity_list = entities
            .iter()
            .map(|e| format!("- {} ({})", e.text, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given the text and the entities below, list the relationships between the \
             entities. Use only predicates WORKS_AT, LOCATED_IN, COLLABORATES_WITH, PART_OF, \
             PRODUCES, RELATED_TO and only entities from the list. Respond with JSON only, \
             shaped as {{\"relationships\": [{{\"source\": \"...\", \"predicate\": \"...\", \
             \"target\": \"...\"}}]}}.\n\
             Entities:\n{entity_list}\n\
             Text:\n{}",
            truncate_for_prompt(text)
        );
        let content = self.chat(prompt).await?;
        let parsed: RelationshipListJson = serde_json::from_str(&content)
            .context("extractor returned malformed relationship JSON")?;

        let resolve = |name: &str| {
            entities
                .iter()
                .find(|e| e.text.eq_ignore_ascii_case(name.trim()))
                .map(|e| e.entity_id.clone())
        };

        let mut relationships = Vec::new();
        for item in parsed.relationships {
            let (Some(source_id), Some(target_id)) = (resolve(&item.source), resolve(&item.target))
            else {
                debug!(source = %item.source, target = %item.target, "Dropping relationship with unknown endpoint");
                continue;
            };
            if source_id == target_id {
                continue;
            }
            relationships.push(Relationship {
                source_id,
                predicate: Predicate::parse(&item.predicate),
                target_id,
            });
        }
        Ok(relationships)
    }
}
