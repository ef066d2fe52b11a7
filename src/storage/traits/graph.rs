//! Typed property-graph primitives layered on the backend contract.
//!
//! Each adapter translates these logical operations into its native protocol:
//! parameterized SQL for the relational adapter, Cypher for graph servers,
//! direct map access for the embedded engine. The rest of the system depends
//! only on this trait, never on a specific adapter.

use crate::models::{Entity, Memory, MemoryId, MemoryType, Relationship, RelationshipType};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::backend::Backend;

/// Edge direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges leaving the node.
    Outgoing,
    /// Edges arriving at the node.
    Incoming,
    /// Both directions.
    Both,
}

/// Filter for deterministic memory scans.
///
/// Results are ordered by `created_at`, then id, so paginated iteration is
/// stable across calls.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    /// Restrict to these memory types (empty = all).
    pub memory_types: Vec<MemoryType>,
    /// Only memories updated at or after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    /// Only memories whose context names this project.
    pub project: Option<String>,
    /// Maximum number of memories to return.
    pub limit: Option<usize>,
    /// Number of memories to skip.
    pub offset: usize,
}

impl ScanFilter {
    /// Creates an unrestricted scan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the scan to one memory type.
    #[must_use]
    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_types.push(memory_type);
        self
    }

    /// Restricts the scan to recently updated memories.
    #[must_use]
    pub const fn with_updated_after(mut self, instant: DateTime<Utc>) -> Self {
        self.updated_after = Some(instant);
        self
    }

    /// Restricts the scan to one project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Statistics about the stored graph.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Total memory nodes.
    pub memory_count: usize,
    /// Memory counts by type.
    pub memories_by_type: HashMap<MemoryType, usize>,
    /// Total edges.
    pub relationship_count: usize,
    /// Edge counts by lowercased type name.
    pub relationships_by_type: HashMap<String, usize>,
    /// Total entity nodes.
    pub entity_count: usize,
    /// Average edges per memory node.
    pub avg_relationships_per_memory: f32,
}

/// The logical property-graph operations every adapter must translate.
///
/// # Implementor Notes
///
/// - `delete_memory` removes the node and every incident edge atomically;
///   a failure partway through must leave neither a dangling edge nor a
///   half-deleted node.
/// - `insert_relationship` verifies both endpoints exist (at the application
///   layer for the relational adapter, via engine constraints for graph
///   engines) and does not deduplicate.
/// - `neighbors` is the single primitive the traversal engine builds on.
#[async_trait]
pub trait GraphStore: Backend {
    /// Inserts or replaces a memory node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn upsert_memory(&self, memory: &Memory) -> Result<()>;

    /// Fetches a memory by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn fetch_memory(&self, id: &MemoryId) -> Result<Option<Memory>>;

    /// Deletes a memory and all edges incident to it, atomically.
    ///
    /// Returns `true` if the memory existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails; on failure no partial state is
    /// left behind.
    async fn delete_memory(&self, id: &MemoryId) -> Result<bool>;

    /// Lists memories matching a scan filter, ordered by creation time then id.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    async fn list_memories(&self, filter: &ScanFilter) -> Result<Vec<Memory>>;

    /// Counts memory nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    async fn count_memories(&self) -> Result<usize>;

    /// Inserts an edge after verifying both endpoints exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] when an endpoint is missing.
    async fn insert_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Returns edges incident to a node in the given direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn relationships_for(
        &self,
        id: &MemoryId,
        direction: Direction,
    ) -> Result<Vec<Relationship>>;

    /// Returns every edge in the store. Used by export and statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    async fn list_relationships(&self) -> Result<Vec<Relationship>>;

    /// Fetches immediate memory neighbors of a node, optionally filtered by
    /// edge type, together with the connecting edge.
    ///
    /// Entity endpoints are skipped; only memory nodes are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn neighbors(
        &self,
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> Result<Vec<(Memory, Relationship)>>;

    /// Inserts an entity, deduplicating by `(lowercased text, type)`.
    ///
    /// On a duplicate, the stored entity's occurrence count is incremented
    /// and the stored entity is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn upsert_entity(&self, entity: &Entity) -> Result<Entity>;

    /// Returns the entities mentioned by a memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn entities_for(&self, id: &MemoryId) -> Result<Vec<Entity>>;

    /// Returns statistics about the stored graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the computation fails.
    async fn stats(&self) -> Result<StoreStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_filter_builder() {
        let filter = ScanFilter::new()
            .with_memory_type(MemoryType::Solution)
            .with_limit(10)
            .with_offset(5);
        assert_eq!(filter.memory_types, vec![MemoryType::Solution]);
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.offset, 5);
    }

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.memory_count, 0);
        assert_eq!(stats.relationship_count, 0);
    }
}
