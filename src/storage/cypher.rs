//! Cypher adapter for native graph-query-speaking servers.
//!
//! Speaks the HTTP transactional-commit endpoint
//! (`POST {endpoint}/db/{database}/tx/commit`) with parameterized Cypher
//! statements. Relationship-endpoint existence and node uniqueness rely on
//! the engine's own constraints; full-text relevance falls back to the shared
//! in-process scoring pass over a broader native match.
//!
//! Statement builders are pure functions so the translation layer unit-tests
//! without a running server.

use crate::models::{Entity, Memory, MemoryId, MemoryType, Relationship, RelationshipType};
use crate::storage::sqlite::{
    count_from_rows, entity_from_row, format_timestamp, memory_from_row, relationship_from_row,
};
use crate::storage::traits::{
    Backend, BackendKind, Direction, GraphStore, HealthReport, Params, Row, ScanFilter, StoreStats,
};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: Vec<StatementEnvelope<'a>>,
}

#[derive(Debug, Serialize)]
struct StatementEnvelope<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Debug, Deserialize)]
struct DataRow {
    #[serde(default)]
    row: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Graph-server adapter speaking Cypher over HTTP.
pub struct CypherBackend {
    client: reqwest::Client,
    endpoint: String,
    database: String,
    auth: Option<(String, String)>,
    connected: AtomicBool,
}

impl CypherBackend {
    /// Creates an unconnected adapter for the given server and database.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            database: database.into(),
            auth: None,
            connected: AtomicBool::new(false),
        }
    }

    /// Sets basic-auth credentials.
    #[must_use]
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((user.into(), password.into()));
        self
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connection(
                "cypher backend is not connected".to_string(),
            ))
        }
    }

    /// Ships one statement to the transactional endpoint and flattens the
    /// response into rows.
    async fn send(&self, query: &str, params: &Params, write: bool) -> Result<Vec<Row>> {
        let body = CommitRequest {
            statements: vec![StatementEnvelope {
                statement: query,
                parameters: params,
            }],
        };
        let mut request = self
            .client
            .post(self.commit_url())
            // Honored by clustered deployments for replica routing, ignored
            // by single-node servers.
            .header("Access-Mode", if write { "WRITE" } else { "READ" })
            .json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Connection(format!("graph server unreachable: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::schema(
                "cypher_commit",
                format!("server returned {status}"),
            ));
        }
        let parsed: CommitResponse = response
            .json()
            .await
            .map_err(|e| Error::schema("cypher_commit", e))?;

        if let Some(err) = parsed.errors.first() {
            return Err(Error::schema(
                "cypher_commit",
                format!("{}: {}", err.code, err.message),
            ));
        }

        let mut rows = Vec::new();
        for result in parsed.results {
            for data in result.data {
                let mut row = Row::new();
                for (column, value) in result.columns.iter().zip(data.row) {
                    row.insert(column.clone(), value);
                }
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl Backend for CypherBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cypher
    }

    async fn connect(&self) -> Result<()> {
        // A trivial round trip proves reachability and credentials.
        self.send("RETURN 1 AS n", &Params::new(), false).await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<()> {
        self.ensure_connected()?;
        for statement in statements::SCHEMA {
            self.send(statement, &Params::new(), true).await?;
        }
        Ok(())
    }

    async fn execute_query(&self, query: &str, params: &Params, write: bool) -> Result<Vec<Row>> {
        self.ensure_connected()?;
        self.send(query, params, write).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        self.ensure_connected()?;
        let stats = self.stats().await?;
        Ok(HealthReport {
            connected: true,
            backend_kind: BackendKind::Cypher,
            memory_count: stats.memory_count,
            entity_count: stats.entity_count,
            relationship_count: stats.relationship_count,
        })
    }
}

#[async_trait]
impl GraphStore for CypherBackend {
    async fn upsert_memory(&self, memory: &Memory) -> Result<()> {
        let (query, params) = statements::upsert_memory(memory)?;
        self.execute_query(&query, &params, true).await?;
        Ok(())
    }

    async fn fetch_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let (query, params) = statements::fetch_memory(id);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.first().map(memory_from_row).transpose()
    }

    async fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        // DETACH DELETE removes the node and its incident edges in one
        // engine-side transaction.
        let (query, params) = statements::delete_memory(id);
        let rows = self.execute_query(&query, &params, true).await?;
        Ok(count_from_rows(&rows) > 0)
    }

    async fn list_memories(&self, filter: &ScanFilter) -> Result<Vec<Memory>> {
        let (query, params) = statements::scan_memories(filter);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter().map(memory_from_row).collect()
    }

    async fn count_memories(&self) -> Result<usize> {
        let rows = self
            .execute_query(statements::COUNT_MEMORIES, &Params::new(), false)
            .await?;
        Ok(count_from_rows(&rows))
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let (query, params) = statements::insert_relationship(relationship)?;
        let rows = self.execute_query(&query, &params, true).await?;
        if count_from_rows(&rows) == 0 {
            // The MATCH found no endpoint pair, so nothing was created.
            return Err(Error::NotFound {
                resource: "memory",
                id: format!(
                    "{} or {}",
                    relationship.from_memory_id, relationship.to_memory_id
                ),
            });
        }
        Ok(())
    }

    async fn relationships_for(
        &self,
        id: &MemoryId,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let (query, params) = statements::relationships_for(id, direction);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter().map(relationship_from_row).collect()
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>> {
        let rows = self
            .execute_query(statements::ALL_RELATIONSHIPS, &Params::new(), false)
            .await?;
        rows.iter().map(relationship_from_row).collect()
    }

    async fn neighbors(
        &self,
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> Result<Vec<(Memory, Relationship)>> {
        let (query, params) = statements::neighbors(id, types, direction);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter()
            .map(|row| Ok((memory_from_row(row)?, relationship_from_row(row)?)))
            .collect()
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<Entity> {
        let (query, params) = statements::fetch_entity_by_key(&entity.dedup_key());
        let rows = self.execute_query(&query, &params, false).await?;
        let stored = if let Some(row) = rows.first() {
            let mut stored = entity_from_row(row)?;
            stored.occurrence_count += entity.occurrence_count.max(1);
            stored
        } else {
            entity.clone()
        };
        let (query, params) = statements::upsert_entity(&stored)?;
        self.execute_query(&query, &params, true).await?;
        Ok(stored)
    }

    async fn entities_for(&self, id: &MemoryId) -> Result<Vec<Entity>> {
        let (query, params) = statements::entities_for(id);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let memory_count = count_from_rows(
            &self
                .execute_query(statements::COUNT_MEMORIES, &Params::new(), false)
                .await?,
        );
        let entity_count = count_from_rows(
            &self
                .execute_query(statements::COUNT_ENTITIES, &Params::new(), false)
                .await?,
        );
        let relationship_count = count_from_rows(
            &self
                .execute_query(statements::COUNT_RELATIONSHIPS, &Params::new(), false)
                .await?,
        );

        let mut memories_by_type: HashMap<MemoryType, usize> = HashMap::new();
        for row in self
            .execute_query(statements::COUNT_MEMORIES_BY_TYPE, &Params::new(), false)
            .await?
        {
            if let (Some(type_str), Some(n)) = (
                row.get("memory_type").and_then(serde_json::Value::as_str),
                row.get("n").and_then(serde_json::Value::as_u64),
            ) {
                if let Some(memory_type) = MemoryType::parse(type_str) {
                    memories_by_type.insert(memory_type, usize::try_from(n).unwrap_or(0));
                }
            }
        }

        let mut relationships_by_type: HashMap<String, usize> = HashMap::new();
        for row in self
            .execute_query(statements::COUNT_RELATIONSHIPS_BY_TYPE, &Params::new(), false)
            .await?
        {
            if let (Some(type_str), Some(n)) = (
                row.get("edge_type").and_then(serde_json::Value::as_str),
                row.get("n").and_then(serde_json::Value::as_u64),
            ) {
                relationships_by_type.insert(type_str.to_string(), usize::try_from(n).unwrap_or(0));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_relationships_per_memory = if memory_count == 0 {
            0.0
        } else {
            relationship_count as f32 / memory_count as f32
        };

        Ok(StoreStats {
            memory_count,
            memories_by_type,
            relationship_count,
            relationships_by_type,
            entity_count,
            avg_relationships_per_memory,
        })
    }
}

/// Cypher statement builders.
///
/// Relationship types are embedded from the closed enum (Cypher cannot
/// parameterize a relationship type); every value travels in `$` parameters.
pub mod statements {
    use super::{
        Direction, Entity, Memory, MemoryId, Params, Relationship, RelationshipType, Result,
        ScanFilter, format_timestamp,
    };
    use crate::Error;

    /// Idempotent schema statements: uniqueness constraints and indexes.
    pub const SCHEMA: &[&str] = &[
        "CREATE CONSTRAINT memory_id_unique IF NOT EXISTS FOR (m:Memory) REQUIRE m.id IS UNIQUE",
        "CREATE CONSTRAINT entity_key_unique IF NOT EXISTS FOR (e:Entity) REQUIRE e.entity_key IS UNIQUE",
        "CREATE INDEX memory_type_index IF NOT EXISTS FOR (m:Memory) ON (m.memory_type)",
        "CREATE INDEX memory_created_index IF NOT EXISTS FOR (m:Memory) ON (m.created_at)",
    ];

    /// Counts memory nodes.
    pub const COUNT_MEMORIES: &str = "MATCH (m:Memory) RETURN count(m) AS n";
    /// Counts entity nodes.
    pub const COUNT_ENTITIES: &str = "MATCH (e:Entity) RETURN count(e) AS n";
    /// Counts relationships.
    pub const COUNT_RELATIONSHIPS: &str = "MATCH ()-[r]->() RETURN count(r) AS n";
    /// Memory counts grouped by type.
    pub const COUNT_MEMORIES_BY_TYPE: &str =
        "MATCH (m:Memory) RETURN m.memory_type AS memory_type, count(m) AS n";
    /// Relationship counts grouped by type.
    pub const COUNT_RELATIONSHIPS_BY_TYPE: &str =
        "MATCH ()-[r]->() RETURN toLower(type(r)) AS edge_type, count(r) AS n";

    const EDGE_RETURN: &str = "startNode(r).id AS from_id, endNode(r).id AS to_id, \
         toLower(type(r)) AS edge_type, r.properties AS edge_properties, \
         r.created_at AS edge_created_at";

    /// Returns every relationship with its endpoints.
    pub const ALL_RELATIONSHIPS: &str = "MATCH ()-[r]->() RETURN startNode(r).id AS from_id, \
         endNode(r).id AS to_id, toLower(type(r)) AS edge_type, \
         r.properties AS edge_properties, r.created_at AS edge_created_at \
         ORDER BY r.created_at";

    /// Builds the memory upsert statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when serialization fails.
    pub fn upsert_memory(memory: &Memory) -> Result<(String, Params)> {
        let blob =
            serde_json::to_string(memory).map_err(|e| Error::schema("serialize_memory", e))?;
        let mut params = Params::new();
        params.insert("id".into(), memory.id.as_str().into());
        params.insert("properties".into(), blob.into());
        params.insert("memory_type".into(), memory.memory_type.as_str().into());
        params.insert("importance".into(), f64::from(memory.importance).into());
        params.insert(
            "project".into(),
            memory
                .context
                .project
                .clone()
                .map_or(serde_json::Value::Null, Into::into),
        );
        params.insert(
            "created_at".into(),
            format_timestamp(memory.created_at).into(),
        );
        params.insert(
            "updated_at".into(),
            format_timestamp(memory.updated_at).into(),
        );
        let query = "MERGE (m:Memory {id: $id}) \
             SET m.properties = $properties, m.memory_type = $memory_type, \
                 m.importance = $importance, m.project = $project, \
                 m.created_at = $created_at, m.updated_at = $updated_at"
            .to_string();
        Ok((query, params))
    }

    /// Builds the memory fetch statement.
    #[must_use]
    pub fn fetch_memory(id: &MemoryId) -> (String, Params) {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        (
            "MATCH (m:Memory {id: $id}) RETURN m.properties AS properties".to_string(),
            params,
        )
    }

    /// Builds the cascading delete statement.
    #[must_use]
    pub fn delete_memory(id: &MemoryId) -> (String, Params) {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        (
            "MATCH (m:Memory {id: $id}) WITH m, count(m) AS n DETACH DELETE m RETURN n".to_string(),
            params,
        )
    }

    /// Builds the filtered memory scan.
    #[must_use]
    pub fn scan_memories(filter: &ScanFilter) -> (String, Params) {
        let mut conditions = Vec::new();
        let mut params = Params::new();

        if !filter.memory_types.is_empty() {
            conditions.push("m.memory_type IN $memory_types".to_string());
            let types: Vec<serde_json::Value> = filter
                .memory_types
                .iter()
                .map(|t| t.as_str().into())
                .collect();
            params.insert("memory_types".into(), serde_json::Value::Array(types));
        }
        if let Some(updated_after) = filter.updated_after {
            conditions.push("m.updated_at >= $updated_after".to_string());
            params.insert(
                "updated_after".into(),
                format_timestamp(updated_after).into(),
            );
        }
        if let Some(ref project) = filter.project {
            conditions.push("m.project = $project".to_string());
            params.insert("project".into(), project.clone().into());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        params.insert(
            "offset".into(),
            serde_json::Value::from(u64::try_from(filter.offset).unwrap_or(0)),
        );
        let limit_clause = filter.limit.map_or_else(String::new, |limit| {
            params.insert(
                "limit".into(),
                serde_json::Value::from(u64::try_from(limit).unwrap_or(0)),
            );
            " LIMIT $limit".to_string()
        });

        let query = format!(
            "MATCH (m:Memory){where_clause} RETURN m.properties AS properties \
             ORDER BY m.created_at, m.id SKIP $offset{limit_clause}"
        );
        (query, params)
    }

    /// Builds the relationship creation statement.
    ///
    /// Creation fails to match (and returns a zero count) when either
    /// endpoint is missing; duplicates are intentionally not merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when serialization fails.
    pub fn insert_relationship(relationship: &Relationship) -> Result<(String, Params)> {
        let blob = serde_json::to_string(&relationship.properties)
            .map_err(|e| Error::schema("serialize_relationship", e))?;
        let mut params = Params::new();
        params.insert(
            "from_id".into(),
            relationship.from_memory_id.as_str().into(),
        );
        params.insert("to_id".into(), relationship.to_memory_id.as_str().into());
        params.insert("properties".into(), blob.into());
        params.insert(
            "created_at".into(),
            format_timestamp(relationship.created_at).into(),
        );
        let query = format!(
            "MATCH (a {{id: $from_id}}), (b {{id: $to_id}}) \
             CREATE (a)-[r:{} {{properties: $properties, created_at: $created_at}}]->(b) \
             RETURN count(r) AS n",
            relationship.relationship_type.as_cypher()
        );
        Ok((query, params))
    }

    /// Builds the incident-edge query for one direction.
    #[must_use]
    pub fn relationships_for(id: &MemoryId, direction: Direction) -> (String, Params) {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        let pattern = match direction {
            Direction::Outgoing => "(a {id: $id})-[r]->()",
            Direction::Incoming => "()-[r]->(a {id: $id})",
            Direction::Both => "(a {id: $id})-[r]-()",
        };
        (
            format!("MATCH {pattern} RETURN {EDGE_RETURN} ORDER BY r.created_at"),
            params,
        )
    }

    /// Builds the neighbor query.
    #[must_use]
    pub fn neighbors(
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> (String, Params) {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        let type_names: Vec<serde_json::Value> = types
            .unwrap_or_default()
            .iter()
            .map(|t| t.as_str().into())
            .collect();
        params.insert("types".into(), serde_json::Value::Array(type_names));

        let pattern = match direction {
            Direction::Outgoing => "(a {id: $id})-[r]->(n:Memory)",
            Direction::Incoming => "(n:Memory)-[r]->(a {id: $id})",
            Direction::Both => "(a {id: $id})-[r]-(n:Memory)",
        };
        let query = format!(
            "MATCH {pattern} WHERE size($types) = 0 OR toLower(type(r)) IN $types \
             RETURN n.properties AS node_properties, {EDGE_RETURN}"
        );
        (query, params)
    }

    /// Builds the entity lookup by deduplication key.
    #[must_use]
    pub fn fetch_entity_by_key(key: &str) -> (String, Params) {
        let mut params = Params::new();
        params.insert("entity_key".into(), key.into());
        (
            "MATCH (e:Entity {entity_key: $entity_key}) RETURN e.properties AS properties"
                .to_string(),
            params,
        )
    }

    /// Builds the entity upsert statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] when serialization fails.
    pub fn upsert_entity(entity: &Entity) -> Result<(String, Params)> {
        let blob =
            serde_json::to_string(entity).map_err(|e| Error::schema("serialize_entity", e))?;
        let mut params = Params::new();
        params.insert("entity_key".into(), entity.dedup_key().into());
        params.insert("id".into(), entity.id.clone().into());
        params.insert("properties".into(), blob.into());
        let query = "MERGE (e:Entity {entity_key: $entity_key}) \
             ON CREATE SET e.id = $id \
             SET e.properties = $properties"
            .to_string();
        Ok((query, params))
    }

    /// Builds the mentioned-entities query for a memory.
    #[must_use]
    pub fn entities_for(id: &MemoryId) -> (String, Params) {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        (
            "MATCH (m {id: $id})-[:MENTIONS]->(e:Entity) \
             RETURN e.properties AS properties ORDER BY e.id"
                .to_string(),
            params,
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_require_connect() {
        let backend = CypherBackend::new("http://localhost:7474", "neo4j");
        assert!(backend.ensure_connected().is_err());
    }

    #[test]
    fn test_commit_url() {
        let backend = CypherBackend::new("http://localhost:7474/", "memories");
        assert_eq!(
            backend.commit_url(),
            "http://localhost:7474/db/memories/tx/commit"
        );
    }

    #[test]
    fn test_insert_relationship_embeds_enum_type_only() {
        let rel = Relationship::new("a", "b", RelationshipType::DependsOn);
        let (query, params) = statements::insert_relationship(&rel).expect("build");
        assert!(query.contains("[r:DEPENDS_ON"));
        // Endpoint ids travel as parameters, never in the statement text
        assert!(!query.contains("'a'"));
        assert_eq!(params.get("from_id"), Some(&serde_json::Value::from("a")));
    }

    #[test]
    fn test_scan_statement_shape() {
        let filter = ScanFilter::new()
            .with_memory_type(crate::models::MemoryType::Solution)
            .with_limit(10)
            .with_offset(20);
        let (query, params) = statements::scan_memories(&filter);
        assert!(query.contains("m.memory_type IN $memory_types"));
        assert!(query.contains("SKIP $offset"));
        assert!(query.contains("LIMIT $limit"));
        assert_eq!(params.get("offset"), Some(&serde_json::Value::from(20)));
    }

    #[test]
    fn test_neighbors_statement_direction() {
        let id = MemoryId::new("mem_1");
        let (outgoing, _) = statements::neighbors(&id, None, Direction::Outgoing);
        assert!(outgoing.contains("-[r]->(n:Memory)"));
        let (both, params) =
            statements::neighbors(&id, Some(&[RelationshipType::Solves]), Direction::Both);
        assert!(both.contains("-[r]-(n:Memory)"));
        assert_eq!(
            params.get("types"),
            Some(&serde_json::json!(["solves"]))
        );
    }

    #[test]
    fn test_delete_returns_count() {
        let (query, _) = statements::delete_memory(&MemoryId::new("mem_1"));
        assert!(query.contains("DETACH DELETE"));
        assert!(query.contains("RETURN n"));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "results": [{"columns": ["n"], "data": [{"row": [3]}]}],
            "errors": []
        }"#;
        let parsed: CommitResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results[0].columns, vec!["n"]);
        assert_eq!(parsed.results[0].data[0].row[0], serde_json::json!(3));
        assert!(parsed.errors.is_empty());
    }
}
