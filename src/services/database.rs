//! The `Database` facade: the logical operation surface consumed by the
//! dispatch layer.
//!
//! Wraps a [`GraphStore`] and provides memory CRUD, search, relationship
//! management, traversal, versioning, entity linking, statistics, and the
//! deterministic scan/import/export boundary. Backend selection happens
//! outside this crate; the facade receives a ready store handle.

use crate::models::{
    Entity, Memory, MemoryId, MemoryPatch, MemoryType, PaginatedResult, Relationship,
    RelationshipProperties, RelationshipSummary, RelationshipType, SearchHit, SearchQuery,
};
use crate::services::{search, traversal, versioning};
use crate::services::traversal::{
    ChainLink, DependencyTrace, RelatedMemory, SimilarMatch,
};
use crate::services::versioning::VersionDiff;
use crate::storage::traits::{GraphStore, HealthReport, ScanFilter};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// A memory together with its optional relationship summary.
#[derive(Debug, Clone)]
pub struct MemoryDetails {
    /// The memory.
    pub memory: Memory,
    /// 1-hop relationship summary, when requested.
    pub relationships: Option<RelationshipSummary>,
}

/// Aggregate statistics over the stored graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatistics {
    /// Total memory nodes.
    pub total_memories: usize,
    /// Memory counts by type.
    pub memories_by_type: HashMap<MemoryType, usize>,
    /// Total edges.
    pub total_relationships: usize,
    /// Edge counts by lowercased type name.
    pub relationships_by_type: HashMap<String, usize>,
    /// Total entity nodes.
    pub entity_count: usize,
    /// Average edges per memory node.
    pub avg_relationships_per_memory: f32,
}

/// A relationship skipped during import, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedRelationship {
    /// Source id from the import record.
    pub from_memory_id: String,
    /// Target id from the import record.
    pub to_memory_id: String,
    /// Relationship type name from the import record.
    pub relationship_type: String,
    /// Why the record was skipped.
    pub reason: String,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Memories stored.
    pub imported_memories: usize,
    /// Relationships created.
    pub imported_relationships: usize,
    /// Memories rejected by validation, with reasons.
    pub skipped_memories: Vec<String>,
    /// Relationships skipped (dangling endpoints or invalid records).
    pub skipped_relationships: Vec<SkippedRelationship>,
}

/// The logical database facade over any graph backend.
///
/// # Thread Safety
///
/// The facade is thread-safe when the underlying store is; all adapters in
/// this crate use interior mutability and are shareable via [`Arc`].
pub struct Database<S: GraphStore> {
    store: Arc<S>,
}

impl<S: GraphStore> Database<S> {
    /// Wraps an already-connected store handle.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Connects and initializes a store, then wraps it.
    ///
    /// # Errors
    ///
    /// Returns connection or schema errors from the backend.
    pub async fn open(store: S) -> Result<Self> {
        store.connect().await?;
        store.initialize_schema().await?;
        Ok(Self::new(store))
    }

    /// Wraps a shared store handle.
    #[must_use]
    pub const fn with_shared_store(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // ========================================================================
    // Memory CRUD
    // ========================================================================

    /// Stores a memory, generating an id when absent.
    ///
    /// Tags are normalized and invariants validated before any backend call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for invalid input and backend errors
    /// otherwise.
    #[instrument(skip(self, memory))]
    pub async fn store_memory(&self, memory: Memory) -> Result<Memory> {
        let memory = memory.normalized();
        memory.validate()?;
        self.store.upsert_memory(&memory).await?;
        Ok(memory)
    }

    /// Fetches a memory, optionally with its 1-hop relationship summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not resolve.
    pub async fn get_memory(
        &self,
        id: &MemoryId,
        include_relationships: bool,
    ) -> Result<MemoryDetails> {
        let memory = self
            .store
            .fetch_memory(id)
            .await?
            .ok_or_else(|| Error::memory_not_found(id))?;
        let relationships = if include_relationships {
            Some(search::enrich(self.store.as_ref(), id).await)
        } else {
            None
        };
        Ok(MemoryDetails {
            memory,
            relationships,
        })
    }

    /// Applies a patch to a memory, bumping its version and stamping the
    /// acting user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not resolve and
    /// [`Error::Validation`] when the patched fields are invalid.
    #[instrument(skip(self, patch), fields(memory_id = %id))]
    pub async fn update_memory(&self, id: &MemoryId, patch: &MemoryPatch) -> Result<Memory> {
        let mut memory = self
            .store
            .fetch_memory(id)
            .await?
            .ok_or_else(|| Error::memory_not_found(id))?;
        if memory.apply_patch(patch) {
            memory.version += 1;
        }
        memory.touch(patch.updated_by.clone());
        memory.validate()?;
        self.store.upsert_memory(&memory).await?;
        Ok(memory)
    }

    /// Deletes a memory and every edge incident to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not resolve; a backend
    /// failure leaves the memory and its edges untouched.
    #[instrument(skip(self), fields(memory_id = %id))]
    pub async fn delete_memory(&self, id: &MemoryId) -> Result<()> {
        if self.store.delete_memory(id).await? {
            Ok(())
        } else {
            Err(Error::memory_not_found(id))
        }
    }

    /// Increments a memory's usage count without bumping its version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the id does not resolve.
    pub async fn record_usage(&self, id: &MemoryId) -> Result<Memory> {
        let mut memory = self
            .store
            .fetch_memory(id)
            .await?
            .ok_or_else(|| Error::memory_not_found(id))?;
        memory.usage_count += 1;
        memory.updated_at = crate::now();
        self.store.upsert_memory(&memory).await?;
        Ok(memory)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Searches memories, returning the ranked page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed queries and backend errors
    /// from the primary fetch.
    pub async fn search_memories(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        Ok(search::execute(self.store.as_ref(), query).await?.hits)
    }

    /// Searches memories with pagination metadata.
    ///
    /// # Errors
    ///
    /// Same as [`Self::search_memories`].
    pub async fn search_memories_paginated(
        &self,
        query: &SearchQuery,
    ) -> Result<PaginatedResult> {
        let outcome = search::execute(self.store.as_ref(), query).await?;
        let page_end = query.offset + outcome.hits.len();
        let has_more = page_end < outcome.total_count;
        Ok(PaginatedResult {
            hits: outcome.hits,
            total_count: outcome.total_count,
            has_more,
            next_offset: has_more.then_some(page_end),
        })
    }

    // ========================================================================
    // Relationships and traversal
    // ========================================================================

    /// Creates a relationship between two existing memories.
    ///
    /// Duplicate relationships are allowed; creation is not deduplicated.
    /// The reserved `PREVIOUS` and `MENTIONS` types cannot be created here;
    /// they belong to versioning and entity linking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for blank ids or out-of-range
    /// properties, [`Error::Relationship`] for a reserved type, and
    /// [`Error::NotFound`] when an endpoint is missing.
    #[instrument(skip(self, properties))]
    pub async fn create_relationship(
        &self,
        from: &MemoryId,
        to: &MemoryId,
        relationship_type: RelationshipType,
        properties: Option<RelationshipProperties>,
    ) -> Result<Relationship> {
        if from.is_blank() || to.is_blank() {
            return Err(Error::Validation(
                "relationship endpoints must not be empty".to_string(),
            ));
        }
        if relationship_type.is_reserved() {
            return Err(Error::Relationship(format!(
                "'{relationship_type}' is reserved for versioning and entity linking"
            )));
        }
        let mut relationship = Relationship::new(from.clone(), to.clone(), relationship_type);
        if let Some(properties) = properties {
            relationship.properties = properties;
        }
        relationship.properties.validate()?;
        self.store.insert_relationship(&relationship).await?;
        Ok(relationship)
    }

    /// Returns memories related to a node within `max_depth` hops
    /// (default 1), optionally restricted to the given edge types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`]/[`Error::NotFound`] per the traversal
    /// contract.
    pub async fn get_related_memories(
        &self,
        id: &MemoryId,
        relationship_types: Option<&[RelationshipType]>,
        max_depth: Option<u32>,
    ) -> Result<Vec<RelatedMemory>> {
        traversal::related_memories(
            self.store.as_ref(),
            id,
            relationship_types,
            max_depth.unwrap_or(1),
        )
        .await
    }

    /// Discovers the chain reachable along one relationship type.
    ///
    /// # Errors
    ///
    /// See [`traversal::find_chain`].
    pub async fn find_chain(
        &self,
        start: &MemoryId,
        relationship_type: RelationshipType,
        max_depth: u32,
    ) -> Result<Vec<ChainLink>> {
        traversal::find_chain(self.store.as_ref(), start, relationship_type, max_depth).await
    }

    /// Traces dependency edges to full depth, reporting cycles.
    ///
    /// # Errors
    ///
    /// See [`traversal::trace_dependencies`].
    pub async fn trace_dependencies(&self, start: &MemoryId) -> Result<DependencyTrace> {
        traversal::trace_dependencies(self.store.as_ref(), start).await
    }

    /// Finds memories of a target type textually similar to free text.
    ///
    /// # Errors
    ///
    /// See [`traversal::find_similar`].
    pub async fn find_similar(
        &self,
        problem_text: &str,
        target_type: MemoryType,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarMatch>> {
        traversal::find_similar(self.store.as_ref(), problem_text, target_type, threshold, limit)
            .await
    }

    /// Searches within the N-hop neighborhood of a root memory.
    ///
    /// # Errors
    ///
    /// See [`traversal::contextual_search`].
    pub async fn contextual_search(
        &self,
        root: &MemoryId,
        query_text: &str,
        max_hops: u32,
    ) -> Result<Vec<SearchHit>> {
        traversal::contextual_search(self.store.as_ref(), root, query_text, max_hops).await
    }

    // ========================================================================
    // Versioning
    // ========================================================================

    /// Creates a new version of a memory; the superseded version is kept.
    ///
    /// # Errors
    ///
    /// See [`versioning::create_version`].
    pub async fn create_version(
        &self,
        current_id: &MemoryId,
        fields: &MemoryPatch,
    ) -> Result<Memory> {
        versioning::create_version(self.store.as_ref(), current_id, fields).await
    }

    /// Returns a memory's version history, oldest first.
    ///
    /// # Errors
    ///
    /// See [`versioning::get_memory_history`].
    pub async fn get_memory_history(&self, id: &MemoryId) -> Result<Vec<Memory>> {
        versioning::get_memory_history(self.store.as_ref(), id).await
    }

    /// Returns the lineage state as of a timestamp.
    ///
    /// # Errors
    ///
    /// See [`versioning::get_state_at`].
    pub async fn get_state_at(
        &self,
        id: &MemoryId,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<Memory>> {
        versioning::get_state_at(self.store.as_ref(), id, timestamp).await
    }

    /// Compares two versions field by field.
    ///
    /// # Errors
    ///
    /// See [`versioning::get_version_diff`].
    pub async fn get_version_diff(
        &self,
        older_id: &MemoryId,
        newer_id: &MemoryId,
    ) -> Result<VersionDiff> {
        versioning::get_version_diff(self.store.as_ref(), older_id, newer_id).await
    }

    // ========================================================================
    // Entity linking
    // ========================================================================

    /// Upserts entities and links each to the memory with a `MENTIONS` edge.
    ///
    /// Entities deduplicate by `(lowercased text, type)`; a repeated entity
    /// increments the stored occurrence count and reuses the stored id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the memory does not exist.
    pub async fn link_entities(
        &self,
        memory_id: &MemoryId,
        entities: &[Entity],
    ) -> Result<Vec<String>> {
        if self.store.fetch_memory(memory_id).await?.is_none() {
            return Err(Error::memory_not_found(memory_id));
        }
        let mut linked = Vec::with_capacity(entities.len());
        for entity in entities {
            let stored = self.store.upsert_entity(entity).await?;
            let mention = Relationship::new(
                memory_id.clone(),
                MemoryId::new(stored.id.clone()),
                RelationshipType::Mentions,
            );
            self.store.insert_relationship(&mention).await?;
            linked.push(stored.id);
        }
        Ok(linked)
    }

    /// Returns the entities mentioned by a memory.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the lookup.
    pub async fn get_entities(&self, memory_id: &MemoryId) -> Result<Vec<Entity>> {
        self.store.entities_for(memory_id).await
    }

    // ========================================================================
    // Statistics, activity, health
    // ========================================================================

    /// Returns aggregate statistics over the stored graph.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the counts.
    pub async fn get_memory_statistics(&self) -> Result<MemoryStatistics> {
        let stats = self.store.stats().await?;
        Ok(MemoryStatistics {
            total_memories: stats.memory_count,
            memories_by_type: stats.memories_by_type,
            total_relationships: stats.relationship_count,
            relationships_by_type: stats.relationships_by_type,
            entity_count: stats.entity_count,
            avg_relationships_per_memory: stats.avg_relationships_per_memory,
        })
    }

    /// Returns memories updated within the last `days`, newest first,
    /// optionally restricted to one project.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the scan.
    pub async fn get_recent_activity(
        &self,
        days: u32,
        project: Option<&str>,
    ) -> Result<Vec<Memory>> {
        let cutoff = crate::now() - chrono::Duration::days(i64::from(days));
        let mut filter = ScanFilter::new().with_updated_after(cutoff);
        if let Some(project) = project {
            filter = filter.with_project(project);
        }
        let mut memories = self.store.list_memories(&filter).await?;
        memories.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(memories)
    }

    /// Reports connection state and store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the backend is not connected.
    pub async fn health_check(&self) -> Result<HealthReport> {
        self.store.health_check().await
    }

    // ========================================================================
    // Export/import boundary
    // ========================================================================

    /// Returns every memory, in deterministic creation order.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the scan.
    pub async fn get_all_memories(&self) -> Result<Vec<Memory>> {
        self.store.list_memories(&ScanFilter::new()).await
    }

    /// Returns one page of the deterministic memory scan.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the scan.
    pub async fn scan_memories(&self, limit: usize, offset: usize) -> Result<Vec<Memory>> {
        self.store
            .list_memories(&ScanFilter::new().with_limit(limit).with_offset(offset))
            .await
    }

    /// Returns every memory and relationship for the export collaborator.
    ///
    /// # Errors
    ///
    /// Returns backend errors from the scans.
    pub async fn export_records(&self) -> Result<(Vec<Memory>, Vec<Relationship>)> {
        let memories = self.get_all_memories().await?;
        let relationships = self.store.list_relationships().await?;
        Ok((memories, relationships))
    }

    /// Bulk-imports memories and relationships.
    ///
    /// Invalid memories and relationships referencing missing endpoints are
    /// skipped and reported; they never abort the import.
    ///
    /// # Errors
    ///
    /// Propagates backend errors other than missing endpoints.
    #[instrument(skip(self, memories, relationships))]
    pub async fn import_records(
        &self,
        memories: Vec<Memory>,
        relationships: Vec<Relationship>,
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();

        for memory in memories {
            let memory = memory.normalized();
            match memory.validate() {
                Ok(()) => {
                    self.store.upsert_memory(&memory).await?;
                    report.imported_memories += 1;
                },
                Err(e) => report
                    .skipped_memories
                    .push(format!("{}: {e}", memory.id)),
            }
        }

        for relationship in relationships {
            let outcome = match relationship.properties.validate() {
                Ok(()) => self.store.insert_relationship(&relationship).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.imported_relationships += 1,
                Err(e @ (Error::NotFound { .. } | Error::Validation(_))) => {
                    report.skipped_relationships.push(SkippedRelationship {
                        from_memory_id: relationship.from_memory_id.to_string(),
                        to_memory_id: relationship.to_memory_id.to_string(),
                        relationship_type: relationship.relationship_type.to_string(),
                        reason: e.to_string(),
                    });
                },
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Imports a JSON document with `memories` and `relationships` arrays.
    ///
    /// Thin deserialization layer over [`Self::import_records`]; file-format
    /// concerns beyond plain JSON records live in the external converters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when either array fails to deserialize.
    pub async fn import_from_json(&self, data: &serde_json::Value) -> Result<ImportReport> {
        let memories: Vec<Memory> = match data.get("memories") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Validation(format!("malformed memories: {e}")))?,
            None => Vec::new(),
        };
        let relationships: Vec<Relationship> = match data.get("relationships") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Validation(format!("malformed relationships: {e}")))?,
            None => Vec::new(),
        };
        self.import_records(memories, relationships).await
    }
}

impl<S: GraphStore> Clone for Database<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}
