//! Temporal versioning over the reserved `PREVIOUS` edge type.
//!
//! Each memory lineage is an append-only chain: creating a version inserts a
//! new current node and links it to its predecessor with a `PREVIOUS` edge.
//! Superseded memories are never deleted; they are marked non-current and
//! stamped with their successor.

use crate::models::{
    Memory, MemoryId, MemoryPatch, MemoryType, Relationship, RelationshipType,
};
use crate::storage::traits::{Direction, GraphStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Guard against a corrupted `PREVIOUS` chain; a well-formed chain is simple
/// and can never approach this.
const MAX_CHAIN_LENGTH: usize = 10_000;

/// Field-by-field difference between two versions. Only differing fields are
/// populated.
#[derive(Debug, Clone, Default)]
pub struct VersionDiff {
    /// Old and new title, when changed.
    pub title: Option<(String, String)>,
    /// Old and new content, when changed.
    pub content: Option<(String, String)>,
    /// Old and new type, when changed.
    pub memory_type: Option<(MemoryType, MemoryType)>,
    /// Tags present only in the newer version.
    pub tags_added: Vec<String>,
    /// Tags present only in the older version.
    pub tags_removed: Vec<String>,
}

impl VersionDiff {
    /// Returns true when the versions do not differ in any compared field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.memory_type.is_none()
            && self.tags_added.is_empty()
            && self.tags_removed.is_empty()
    }
}

/// Creates a new version of a memory.
///
/// The new node carries the patched fields, an incremented version number,
/// and becomes current; the superseded node is marked non-current and stamped
/// with its successor; a `PREVIOUS` edge links new to old. If a later step
/// fails the new node is removed again, so no half-created version survives.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the memory does not exist,
/// [`Error::Validation`] when the patched fields are invalid, and backend
/// errors otherwise.
pub async fn create_version<S: GraphStore>(
    store: &S,
    current_id: &MemoryId,
    fields: &MemoryPatch,
) -> Result<Memory> {
    let mut old = store
        .fetch_memory(current_id)
        .await?
        .ok_or_else(|| Error::memory_not_found(current_id))?;

    let mut new = old.clone().with_id(MemoryId::generate());
    new.apply_patch(fields);
    new.version = old.version + 1;
    new.is_current = true;
    new.superseded_by = None;
    let now = crate::now();
    new.created_at = now;
    new.updated_at = now;
    if fields.updated_by.is_some() {
        new.updated_by.clone_from(&fields.updated_by);
    }
    let new = new.normalized();
    new.validate()?;

    store.upsert_memory(&new).await?;

    let link = Relationship::new(
        new.id.clone(),
        old.id.clone(),
        RelationshipType::Previous,
    );
    if let Err(e) = store.insert_relationship(&link).await {
        let _ = store.delete_memory(&new.id).await;
        return Err(e);
    }

    old.is_current = false;
    old.superseded_by = Some(new.id.clone());
    old.touch(fields.updated_by.clone());
    if let Err(e) = store.upsert_memory(&old).await {
        let _ = store.delete_memory(&new.id).await;
        return Err(e);
    }

    Ok(new)
}

/// Walks the `PREVIOUS` chain from a node to its origin.
///
/// Returns versions oldest to newest; the starting node is included and is
/// the last element.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the memory does not exist and backend
/// errors from the walk.
pub async fn get_memory_history<S: GraphStore>(
    store: &S,
    id: &MemoryId,
) -> Result<Vec<Memory>> {
    let start = store
        .fetch_memory(id)
        .await?
        .ok_or_else(|| Error::memory_not_found(id))?;

    let mut newest_first = vec![start];
    let mut visited: HashSet<MemoryId> = HashSet::from([id.clone()]);

    loop {
        let current = match newest_first.last() {
            Some(memory) => memory.id.clone(),
            None => break,
        };
        let predecessors = store
            .neighbors(
                &current,
                Some(&[RelationshipType::Previous]),
                Direction::Outgoing,
            )
            .await?;
        // A well-formed chain has at most one predecessor; the visited guard
        // terminates the walk even on a corrupted one.
        let Some((predecessor, _)) = predecessors.into_iter().next() else {
            break;
        };
        if !visited.insert(predecessor.id.clone()) || newest_first.len() >= MAX_CHAIN_LENGTH {
            break;
        }
        newest_first.push(predecessor);
    }

    newest_first.reverse();
    Ok(newest_first)
}

/// Returns the newest version of a lineage created at or before `timestamp`,
/// or `None` when no version is that old.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the memory does not exist and backend
/// errors from the walk.
pub async fn get_state_at<S: GraphStore>(
    store: &S,
    id: &MemoryId,
    timestamp: DateTime<Utc>,
) -> Result<Option<Memory>> {
    let history = get_memory_history(store, id).await?;
    Ok(history
        .into_iter()
        .filter(|m| m.created_at <= timestamp)
        .next_back())
}

/// Compares two versions field by field.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when either memory does not exist.
pub async fn get_version_diff<S: GraphStore>(
    store: &S,
    older_id: &MemoryId,
    newer_id: &MemoryId,
) -> Result<VersionDiff> {
    let older = store
        .fetch_memory(older_id)
        .await?
        .ok_or_else(|| Error::memory_not_found(older_id))?;
    let newer = store
        .fetch_memory(newer_id)
        .await?
        .ok_or_else(|| Error::memory_not_found(newer_id))?;

    let mut diff = VersionDiff::default();
    if older.title != newer.title {
        diff.title = Some((older.title.clone(), newer.title.clone()));
    }
    if older.content != newer.content {
        diff.content = Some((older.content.clone(), newer.content.clone()));
    }
    if older.memory_type != newer.memory_type {
        diff.memory_type = Some((older.memory_type, newer.memory_type));
    }
    let older_tags: HashSet<&String> = older.tags.iter().collect();
    let newer_tags: HashSet<&String> = newer.tags.iter().collect();
    diff.tags_added = newer
        .tags
        .iter()
        .filter(|t| !older_tags.contains(t))
        .cloned()
        .collect();
    diff.tags_removed = older
        .tags
        .iter()
        .filter(|t| !newer_tags.contains(t))
        .cloned()
        .collect();
    Ok(diff)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBackend;
    use crate::storage::traits::Backend;

    async fn store() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.connect().await.expect("connect");
        backend
    }

    #[tokio::test]
    async fn test_create_version_preserves_predecessor() {
        let backend = store().await;
        let original = Memory::new(MemoryType::Decision, "Use sqlite", "embedded is enough");
        backend.upsert_memory(&original).await.unwrap();

        let v2 = create_version(
            &backend,
            &original.id,
            &MemoryPatch::new().content("switching to a graph server"),
        )
        .await
        .expect("version");

        assert_eq!(v2.version, 2);
        assert!(v2.is_current);

        let old = backend
            .fetch_memory(&original.id)
            .await
            .unwrap()
            .expect("superseded memory still present");
        assert!(!old.is_current);
        assert_eq!(old.superseded_by, Some(v2.id.clone()));
    }

    #[tokio::test]
    async fn test_history_is_oldest_first() {
        let backend = store().await;
        let v1 = Memory::new(MemoryType::Decision, "v1", "one");
        backend.upsert_memory(&v1).await.unwrap();
        let v2 = create_version(&backend, &v1.id, &MemoryPatch::new().content("two"))
            .await
            .unwrap();
        let v3 = create_version(&backend, &v2.id, &MemoryPatch::new().content("three"))
            .await
            .unwrap();

        let history = get_memory_history(&backend, &v3.id).await.unwrap();
        let versions: Vec<u32> = history.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(history[0].id, v1.id);
        assert!(!history[0].is_current);
        assert!(history[2].is_current);
    }

    #[tokio::test]
    async fn test_state_at_selects_by_creation_time() {
        let backend = store().await;
        let v1 = Memory::new(MemoryType::Decision, "v1", "one");
        backend.upsert_memory(&v1).await.unwrap();
        let v2 = create_version(&backend, &v1.id, &MemoryPatch::new().content("two"))
            .await
            .unwrap();

        let at_v2 = get_state_at(&backend, &v2.id, v2.created_at)
            .await
            .unwrap()
            .expect("state");
        assert_eq!(at_v2.id, v2.id);

        let before_everything = v1.created_at - chrono::Duration::days(1);
        assert!(get_state_at(&backend, &v2.id, before_everything)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_version_diff_reports_only_changes() {
        let backend = store().await;
        let v1 = Memory::new(MemoryType::Decision, "title", "one").with_tags(["a", "b"]);
        backend.upsert_memory(&v1).await.unwrap();
        let v2 = create_version(
            &backend,
            &v1.id,
            &MemoryPatch::new().content("two").tags(["b", "c"]),
        )
        .await
        .unwrap();

        let diff = get_version_diff(&backend, &v1.id, &v2.id).await.unwrap();
        assert!(diff.title.is_none());
        assert_eq!(diff.content, Some(("one".into(), "two".into())));
        assert_eq!(diff.tags_added, vec!["c"]);
        assert_eq!(diff.tags_removed, vec!["a"]);
    }
}
