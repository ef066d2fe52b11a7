//! Embedded in-process graph engine.
//!
//! Keeps the whole graph in `RwLock`-guarded maps. Doubles as the test
//! backend. Its native protocol for [`Backend::execute_query`] is an
//! op-envelope: the query string names one operation (`memory.get`,
//! `edge.neighbors`, ...) and the structured parameter map carries the
//! arguments — the smallest honest query language for an engine without a
//! textual one.

use crate::models::{Entity, Memory, MemoryId, Relationship, RelationshipType};
use crate::storage::sqlite::parse_timestamp;
use crate::storage::traits::{
    Backend, BackendKind, Direction, GraphStore, HealthReport, Params, Row, ScanFilter, StoreStats,
};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// In-process graph engine.
///
/// Uses reader-writer locks for thread-safe access. Data is not persisted
/// between runs.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    connected: AtomicBool,
    memories: RwLock<HashMap<String, Memory>>,
    entities: RwLock<HashMap<String, Entity>>,
    edges: RwLock<Vec<Relationship>>,
}

impl InMemoryBackend {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Connection(
                "in-memory backend is not connected".to_string(),
            ))
        }
    }

    fn memories_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Memory>> {
        self.memories.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn memories_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Memory>> {
        self.memories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entities_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entity>> {
        self.entities.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entities_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entity>> {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn edges_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Relationship>> {
        self.edges.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn edges_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Relationship>> {
        self.edges.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn node_exists(&self, id: &str) -> bool {
        self.memories_read().contains_key(id) || self.entities_read().contains_key(id)
    }

    fn scan_core(&self, filter: &ScanFilter) -> Vec<Memory> {
        let memories = self.memories_read();
        let mut matched: Vec<Memory> = memories
            .values()
            .filter(|m| {
                (filter.memory_types.is_empty() || filter.memory_types.contains(&m.memory_type))
                    && filter.updated_after.is_none_or(|after| m.updated_at >= after)
                    && filter
                        .project
                        .as_ref()
                        .is_none_or(|p| m.context.project.as_ref() == Some(p))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        let tail: Vec<Memory> = matched.into_iter().skip(filter.offset).collect();
        match filter.limit {
            Some(limit) => tail.into_iter().take(limit).collect(),
            None => tail,
        }
    }

    fn insert_edge_core(&self, relationship: Relationship) -> Result<()> {
        for endpoint in [
            &relationship.from_memory_id,
            &relationship.to_memory_id,
        ] {
            if !self.node_exists(endpoint.as_str()) {
                return Err(Error::NotFound {
                    resource: "memory",
                    id: endpoint.to_string(),
                });
            }
        }
        self.edges_write().push(relationship);
        Ok(())
    }

    fn edge_matches(
        relationship: &Relationship,
        id: &str,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> bool {
        let direction_ok = match direction {
            Direction::Outgoing => relationship.from_memory_id.as_str() == id,
            Direction::Incoming => relationship.to_memory_id.as_str() == id,
            Direction::Both => {
                relationship.from_memory_id.as_str() == id
                    || relationship.to_memory_id.as_str() == id
            },
        };
        direction_ok && types.is_none_or(|ts| ts.contains(&relationship.relationship_type))
    }

    fn neighbors_core(
        &self,
        id: &str,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> Vec<(Memory, Relationship)> {
        let memories = self.memories_read();
        self.edges_read()
            .iter()
            .filter(|r| Self::edge_matches(r, id, types, direction))
            .filter_map(|r| {
                let far_end = if r.from_memory_id.as_str() == id {
                    r.to_memory_id.as_str()
                } else {
                    r.from_memory_id.as_str()
                };
                // Entity endpoints are not memory neighbors
                memories.get(far_end).map(|m| (m.clone(), r.clone()))
            })
            .collect()
    }

    fn upsert_entity_core(&self, entity: &Entity) -> Entity {
        let mut entities = self.entities_write();
        let key = entity.dedup_key();
        if let Some(existing) = entities.values_mut().find(|e| e.dedup_key() == key) {
            existing.occurrence_count += entity.occurrence_count.max(1);
            return existing.clone();
        }
        entities.insert(entity.id.clone(), entity.clone());
        entity.clone()
    }

    fn stats_core(&self) -> StoreStats {
        let memories = self.memories_read();
        let edges = self.edges_read();

        let mut memories_by_type = HashMap::new();
        for memory in memories.values() {
            *memories_by_type.entry(memory.memory_type).or_insert(0) += 1;
        }
        let mut relationships_by_type: HashMap<String, usize> = HashMap::new();
        for edge in edges.iter() {
            *relationships_by_type
                .entry(edge.relationship_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_relationships_per_memory = if memories.is_empty() {
            0.0
        } else {
            edges.len() as f32 / memories.len() as f32
        };

        StoreStats {
            memory_count: memories.len(),
            memories_by_type,
            relationship_count: edges.len(),
            relationships_by_type,
            entity_count: self.entities_read().len(),
            avg_relationships_per_memory,
        }
    }

    fn memory_to_row(memory: &Memory) -> Result<Row> {
        let blob =
            serde_json::to_string(memory).map_err(|e| Error::schema("serialize_memory", e))?;
        let mut row = Row::new();
        row.insert("properties".into(), blob.into());
        Ok(row)
    }

    fn param<'a>(params: &'a Params, key: &str) -> Result<&'a serde_json::Value> {
        params
            .get(key)
            .ok_or_else(|| Error::schema("op_envelope", format!("missing parameter '{key}'")))
    }

    fn param_str<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
        Self::param(params, key)?
            .as_str()
            .ok_or_else(|| Error::schema("op_envelope", format!("parameter '{key}' must be a string")))
    }

    fn parse_direction(params: &Params) -> Result<Direction> {
        match params.get("direction").and_then(serde_json::Value::as_str) {
            None | Some("both") => Ok(Direction::Both),
            Some("outgoing") => Ok(Direction::Outgoing),
            Some("incoming") => Ok(Direction::Incoming),
            Some(other) => Err(Error::schema(
                "op_envelope",
                format!("unknown direction '{other}'"),
            )),
        }
    }

    fn parse_scan_filter(params: &Params) -> Result<ScanFilter> {
        let mut filter = ScanFilter::new();
        if let Some(types) = params.get("memory_types").and_then(serde_json::Value::as_array) {
            for t in types {
                let name = t.as_str().unwrap_or_default();
                filter.memory_types.push(
                    crate::models::MemoryType::parse(name).ok_or_else(|| {
                        Error::schema("op_envelope", format!("unknown memory type '{name}'"))
                    })?,
                );
            }
        }
        if let Some(after) = params.get("updated_after").and_then(serde_json::Value::as_str) {
            filter.updated_after = Some(parse_timestamp(after)?);
        }
        if let Some(project) = params.get("project").and_then(serde_json::Value::as_str) {
            filter.project = Some(project.to_string());
        }
        if let Some(limit) = params.get("limit").and_then(serde_json::Value::as_u64) {
            filter.limit = Some(limit as usize);
        }
        if let Some(offset) = params.get("offset").and_then(serde_json::Value::as_u64) {
            filter.offset = offset as usize;
        }
        Ok(filter)
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<()> {
        // Maps are allocated at construction; nothing to create.
        self.ensure_connected()
    }

    async fn execute_query(&self, query: &str, params: &Params, _write: bool) -> Result<Vec<Row>> {
        self.ensure_connected()?;
        match query {
            "memory.upsert" => {
                let memory: Memory = serde_json::from_value(Self::param(params, "memory")?.clone())
                    .map_err(|e| Error::schema("op_envelope", e))?;
                self.memories_write().insert(memory.id.to_string(), memory);
                Ok(Vec::new())
            },
            "memory.get" => {
                let id = Self::param_str(params, "id")?;
                self.memories_read()
                    .get(id)
                    .map(Self::memory_to_row)
                    .transpose()
                    .map(|row| row.into_iter().collect())
            },
            "memory.delete" => {
                let id = Self::param_str(params, "id")?.to_string();
                let deleted = self.delete_core(&id);
                let mut row = Row::new();
                row.insert("deleted".into(), deleted.into());
                Ok(vec![row])
            },
            "memory.scan" => {
                let filter = Self::parse_scan_filter(params)?;
                self.scan_core(&filter)
                    .iter()
                    .map(Self::memory_to_row)
                    .collect()
            },
            "memory.count" => {
                let mut row = Row::new();
                row.insert("n".into(), serde_json::Value::from(self.memories_read().len()));
                Ok(vec![row])
            },
            "edge.insert" => {
                let relationship: Relationship =
                    serde_json::from_value(Self::param(params, "relationship")?.clone())
                        .map_err(|e| Error::schema("op_envelope", e))?;
                self.insert_edge_core(relationship)?;
                Ok(Vec::new())
            },
            "edge.neighbors" => {
                let id = Self::param_str(params, "id")?;
                let direction = Self::parse_direction(params)?;
                let types = match params.get("types").and_then(serde_json::Value::as_array) {
                    Some(values) => {
                        let mut parsed = Vec::new();
                        for v in values {
                            let name = v.as_str().unwrap_or_default();
                            parsed.push(RelationshipType::parse(name).ok_or_else(|| {
                                Error::schema(
                                    "op_envelope",
                                    format!("unknown relationship type '{name}'"),
                                )
                            })?);
                        }
                        Some(parsed)
                    },
                    None => None,
                };
                let pairs = self.neighbors_core(id, types.as_deref(), direction);
                pairs
                    .iter()
                    .map(|(memory, _)| Self::memory_to_row(memory))
                    .collect()
            },
            "stats" => {
                let stats = self.stats_core();
                let mut row = Row::new();
                row.insert("memory_count".into(), stats.memory_count.into());
                row.insert("entity_count".into(), stats.entity_count.into());
                row.insert(
                    "relationship_count".into(),
                    stats.relationship_count.into(),
                );
                Ok(vec![row])
            },
            other => Err(Error::schema(
                "op_envelope",
                format!("unknown operation '{other}'"),
            )),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        self.ensure_connected()?;
        let stats = self.stats_core();
        Ok(HealthReport {
            connected: true,
            backend_kind: BackendKind::Memory,
            memory_count: stats.memory_count,
            entity_count: stats.entity_count,
            relationship_count: stats.relationship_count,
        })
    }
}

impl InMemoryBackend {
    fn delete_core(&self, id: &str) -> bool {
        let mut memories = self.memories_write();
        if memories.remove(id).is_none() {
            return false;
        }
        // Node and incident edges go together; both maps are held here so no
        // reader can observe a dangling edge.
        self.edges_write()
            .retain(|r| r.from_memory_id.as_str() != id && r.to_memory_id.as_str() != id);
        true
    }
}

#[async_trait]
impl GraphStore for InMemoryBackend {
    async fn upsert_memory(&self, memory: &Memory) -> Result<()> {
        self.ensure_connected()?;
        self.memories_write()
            .insert(memory.id.to_string(), memory.clone());
        Ok(())
    }

    async fn fetch_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.ensure_connected()?;
        Ok(self.memories_read().get(id.as_str()).cloned())
    }

    async fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.ensure_connected()?;
        Ok(self.delete_core(id.as_str()))
    }

    async fn list_memories(&self, filter: &ScanFilter) -> Result<Vec<Memory>> {
        self.ensure_connected()?;
        Ok(self.scan_core(filter))
    }

    async fn count_memories(&self) -> Result<usize> {
        self.ensure_connected()?;
        Ok(self.memories_read().len())
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.ensure_connected()?;
        self.insert_edge_core(relationship.clone())
    }

    async fn relationships_for(
        &self,
        id: &MemoryId,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        self.ensure_connected()?;
        Ok(self
            .edges_read()
            .iter()
            .filter(|r| Self::edge_matches(r, id.as_str(), None, direction))
            .cloned()
            .collect())
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>> {
        self.ensure_connected()?;
        Ok(self.edges_read().clone())
    }

    async fn neighbors(
        &self,
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> Result<Vec<(Memory, Relationship)>> {
        self.ensure_connected()?;
        Ok(self.neighbors_core(id.as_str(), types, direction))
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<Entity> {
        self.ensure_connected()?;
        Ok(self.upsert_entity_core(entity))
    }

    async fn entities_for(&self, id: &MemoryId) -> Result<Vec<Entity>> {
        self.ensure_connected()?;
        let entities = self.entities_read();
        Ok(self
            .edges_read()
            .iter()
            .filter(|r| {
                r.from_memory_id.as_str() == id.as_str()
                    && r.relationship_type == RelationshipType::Mentions
            })
            .filter_map(|r| entities.get(r.to_memory_id.as_str()).cloned())
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.ensure_connected()?;
        Ok(self.stats_core())
    }
}
