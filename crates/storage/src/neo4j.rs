//! Neo4j-backed property graph store.
//!
//! Entities are MERGEd by stable id so the same (type, text) pair always
//! lands on one node, whichever page mentioned it. Relationship types come
//! from the controlled predicate vocabulary and are baked into the Cypher
//! text (Cypher cannot parameterize them); node and page properties travel
//! as parameters.

use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use serde::Serialize;

use graphrag_common::{Entity, EntityType, GraphHit, Relationship};

/// Every predicate an entity-to-entity traversal may follow.
const ENTITY_EDGE_TYPES: &str =
    "WORKS_AT|LOCATED_IN|COLLABORATES_WITH|PART_OF|PRODUCES|RELATED_TO";

const MAX_TRAVERSAL_DEPTH: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipRecord {
    pub source_id: String,
    pub predicate: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    pub nodes: Vec<Entity>,
    pub edges: Vec<RelationshipRecord>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Uniqueness constraints for entity and page ids; safe to call repeatedly.
    async fn ensure_constraints(&self) -> Result<()>;

    async fn merge_entity(&self, entity: &Entity) -> Result<()>;

    async fn merge_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// MERGE the page node and the `MENTIONED_IN` edge from the entity to it.
    async fn link_mention(&self, entity_id: &str, page_id: &str, source_url: &str) -> Result<()>;

    /// Entities whose text contains `text` (case-insensitive), optionally
    /// narrowed by type.
    async fn find_entities(
        &self,
        text: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<Entity>>;

    /// Pages mentioned by the seed entities (hop 0) or by entities reachable
    /// within `depth` hops over entity-to-entity edges.
    async fn pages_near_entities(&self, entity_ids: &[String], depth: usize)
        -> Result<Vec<GraphHit>>;

    /// The neighborhood of one entity: reachable entities plus the edges
    /// among them.
    async fn entity_connections(&self, entity_id: &str, depth: usize) -> Result<Subgraph>;
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("failed to connect to Neo4j")?;
        Ok(Self { graph })
    }

    async fn entity_by_id(&self, entity_id: &str) -> Result<Option<Entity>> {
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (e:Entity {entity_id: $id}) \
                     RETURN e.entity_id AS entity_id, e.type AS type, e.text AS text",
                )
                .param("id", entity_id),
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_entity(&row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_entity(row: &neo4rs::Row) -> Result<Entity> {
    let entity_id: String = row.get("entity_id")?;
    let entity_type: String = row.get("type")?;
    let text: String = row.get("text")?;
    Ok(Entity {
        entity_id,
        entity_type: EntityType::parse(&entity_type),
        text,
    })
}

fn clamp_depth(depth: usize) -> usize {
    depth.clamp(1, MAX_TRAVERSAL_DEPTH)
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ensure_constraints(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT entity_id_unique IF NOT EXISTS \
                 FOR (e:Entity) REQUIRE e.entity_id IS UNIQUE",
            ))
            .await
            .context("failed to create entity constraint")?;
        self.graph
            .run(query(
                "CREATE CONSTRAINT page_id_unique IF NOT EXISTS \
                 FOR (p:Page) REQUIRE p.page_id IS UNIQUE",
            ))
            .await
            .context("failed to create page constraint")?;
        Ok(())
    }

    async fn merge_entity(&self, entity: &Entity) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (e:Entity {entity_id: $id}) \
                     SET e.type = $type, e.text = $text",
                )
                .param("id", entity.entity_id.clone())
                .param("type", entity.entity_type.as_str())
                .param("text", entity.text.clone()),
            )
            .await
            .context("failed to merge entity")
    }

    async fn merge_relationship(&self, relationship: &Relationship) -> Result<()> {
        // Predicate names come from the closed enum, never from input text.
        let cypher = format!(
            "MATCH (a:Entity {{entity_id: $source}}) \
             MATCH (b:Entity {{entity_id: $target}}) \
             MERGE (a)-[:{}]->(b)",
            relationship.predicate.as_str()
        );
        self.graph
            .run(
                query(&cypher)
                    .param("source", relationship.source_id.clone())
                    .param("target", relationship.target_id.clone()),
            )
            .await
            .context("failed to merge relationship")
    }

    async fn link_mention(&self, entity_id: &str, page_id: &str, source_url: &str) -> Result<()> {
        self.graph
            .run(
                query(
                    "MERGE (p:Page {page_id: $page_id}) \
                     SET p.source_url = $source_url \
                     WITH p \
                     MATCH (e:Entity {entity_id: $entity_id}) \
                     MERGE (e)-[:MENTIONED_IN]->(p)",
                )
                .param("page_id", page_id)
                .param("source_url", source_url)
                .param("entity_id", entity_id),
            )
            .await
            .context("failed to link mention")
    }

    async fn find_entities(
        &self,
        text: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let type_filter = match entity_type {
            Some(_) => "AND e.type = $type ",
            None => "",
        };
        let cypher = format!(
            "MATCH (e:Entity) \
             WHERE toLower(e.text) CONTAINS toLower($text) {type_filter}\
             RETURN e.entity_id AS entity_id, e.type AS type, e.text AS text \
             LIMIT {}",
            limit.max(1)
        );
        let mut q = query(&cypher).param("text", text);
        if let Some(t) = entity_type {
            q = q.param("type", t.as_str());
        }

        let mut rows = self.graph.execute(q).await.context("entity search failed")?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(row_to_entity(&row)?);
        }
        Ok(entities)
    }

    async fn pages_near_entities(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> Result<Vec<GraphHit>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = entity_ids.to_vec();

        // Hop 0: pages the seed entities are mentioned in directly.
        let mut hits: Vec<GraphHit> = Vec::new();
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (e:Entity)-[:MENTIONED_IN]->(p:Page) \
                     WHERE e.entity_id IN $ids \
                     RETURN DISTINCT p.page_id AS page_id, p.source_url AS source_url",
                )
                .param("ids", ids.clone()),
            )
            .await
            .context("graph traversal failed")?;
        while let Some(row) = rows.next().await? {
            hits.push(GraphHit {
                page_id: row.get("page_id")?,
                source_url: row.get::<String>("source_url").ok(),
                hops: 0,
            });
        }

        // Hops 1..=depth: pages mentioned by connected entities.
        let cypher = format!(
            "MATCH (e:Entity) WHERE e.entity_id IN $ids \
             MATCH path = (e)-[:{ENTITY_EDGE_TYPES}*1..{}]-(n:Entity) \
             WHERE n.entity_id <> e.entity_id \
             MATCH (n)-[:MENTIONED_IN]->(p:Page) \
             RETURN p.page_id AS page_id, p.source_url AS source_url, \
                    min(length(path)) AS hops",
            clamp_depth(depth)
        );
        let mut rows = self
            .graph
            .execute(query(&cypher).param("ids", ids))
            .await
            .context("graph traversal failed")?;
        while let Some(row) = rows.next().await? {
            hits.push(GraphHit {
                page_id: row.get("page_id")?,
                source_url: row.get::<String>("source_url").ok(),
                hops: row.get::<i64>("hops")? as usize,
            });
        }

        // A page can surface at several distances; keep the closest.
        hits.sort_by(|a, b| a.page_id.cmp(&b.page_id).then(a.hops.cmp(&b.hops)));
        hits.dedup_by(|a, b| a.page_id == b.page_id);
        Ok(hits)
    }

    async fn entity_connections(&self, entity_id: &str, depth: usize) -> Result<Subgraph> {
        let Some(seed) = self.entity_by_id(entity_id).await? else {
            return Ok(Subgraph {
                nodes: Vec::new(),
                edges: Vec::new(),
            });
        };

        let cypher = format!(
            "MATCH (e:Entity {{entity_id: $id}})-[:{ENTITY_EDGE_TYPES}*1..{}]-(n:Entity) \
             RETURN DISTINCT n.entity_id AS entity_id, n.type AS type, n.text AS text",
            clamp_depth(depth)
        );
        let mut rows = self
            .graph
            .execute(query(&cypher).param("id", entity_id))
            .await
            .context("connection lookup failed")?;

        let mut nodes = vec![seed];
        while let Some(row) = rows.next().await? {
            nodes.push(row_to_entity(&row)?);
        }

        let ids: Vec<String> = nodes.iter().map(|n| n.entity_id.clone()).collect();
        let mut rows = self
            .graph
            .execute(
                query(
                    "MATCH (a:Entity)-[r]->(b:Entity) \
                     WHERE a.entity_id IN $ids AND b.entity_id IN $ids \
                     RETURN a.entity_id AS source_id, type(r) AS predicate, \
                            b.entity_id AS target_id",
                )
                .param("ids", ids),
            )
            .await
            .context("edge lookup failed")?;

        let mut edges = Vec::new();
        while let Some(row) = rows.next().await? {
            edges.push(RelationshipRecord {
                source_id: row.get("source_id")?,
                predicate: row.get("predicate")?,
                target_id: row.get("target_id")?,
            });
        }

        Ok(Subgraph { nodes, edges })
    }
}
