//! Temporal versioning integration tests against the relational adapter.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use mnemograph::storage::SqliteBackend;
use mnemograph::{Database, Error, Memory, MemoryPatch, MemoryType, RelationshipType};

async fn open_db() -> Database<SqliteBackend> {
    Database::open(SqliteBackend::in_memory())
        .await
        .expect("open database")
}

#[tokio::test]
async fn test_create_version_never_deletes_the_predecessor() {
    let db = open_db().await;
    let v1 = db
        .store_memory(Memory::new(
            MemoryType::Decision,
            "Cache strategy",
            "Cache aside",
        ))
        .await
        .expect("store");

    let v2 = db
        .create_version(&v1.id, &MemoryPatch::new().content("Write through"))
        .await
        .expect("version");

    assert_eq!(v2.version, 2);
    assert!(v2.is_current);
    assert_ne!(v2.id, v1.id);

    let old = db.get_memory(&v1.id, false).await.expect("old still there");
    assert!(!old.memory.is_current);
    assert_eq!(old.memory.superseded_by, Some(v2.id.clone()));
    assert_eq!(old.memory.content, "Cache aside");
}

#[tokio::test]
async fn test_version_chain_edge_is_previous() {
    let db = open_db().await;
    let v1 = db
        .store_memory(Memory::new(MemoryType::Decision, "d", "one"))
        .await
        .expect("store");
    let v2 = db
        .create_version(&v1.id, &MemoryPatch::new().content("two"))
        .await
        .expect("version");

    let related = db
        .get_related_memories(&v2.id, Some(&[RelationshipType::Previous]), None)
        .await
        .expect("related");
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].memory.id, v1.id);
}

#[tokio::test]
async fn test_history_is_oldest_to_newest() {
    let db = open_db().await;
    let v1 = db
        .store_memory(Memory::new(MemoryType::Decision, "d", "one"))
        .await
        .expect("store");
    let v2 = db
        .create_version(&v1.id, &MemoryPatch::new().content("two"))
        .await
        .expect("v2");
    let v3 = db
        .create_version(&v2.id, &MemoryPatch::new().content("three"))
        .await
        .expect("v3");

    let history = db.get_memory_history(&v3.id).await.expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|m| m.version).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(history[0].created_at <= history[2].created_at);
    assert!(!history[0].is_current);
    assert!(!history[1].is_current);
    assert!(history[2].is_current);
}

#[tokio::test]
async fn test_get_state_at() {
    let db = open_db().await;
    let v1 = db
        .store_memory(Memory::new(MemoryType::Decision, "d", "one"))
        .await
        .expect("store");
    let v2 = db
        .create_version(&v1.id, &MemoryPatch::new().content("two"))
        .await
        .expect("v2");

    let state = db
        .get_state_at(&v2.id, v1.created_at)
        .await
        .expect("state")
        .expect("v1 qualifies");
    assert_eq!(state.id, v1.id);

    let before = v1.created_at - chrono::Duration::hours(1);
    assert!(db.get_state_at(&v2.id, before).await.expect("state").is_none());

    let after = v2.created_at + chrono::Duration::hours(1);
    let newest = db
        .get_state_at(&v2.id, after)
        .await
        .expect("state")
        .expect("v2 qualifies");
    assert_eq!(newest.id, v2.id);
}

#[tokio::test]
async fn test_version_diff_reports_only_differing_fields() {
    let db = open_db().await;
    let v1 = db
        .store_memory(
            Memory::new(MemoryType::Decision, "title", "one").with_tags(["keep", "drop"]),
        )
        .await
        .expect("store");
    let v2 = db
        .create_version(
            &v1.id,
            &MemoryPatch::new().content("two").tags(["keep", "add"]),
        )
        .await
        .expect("v2");

    let diff = db.get_version_diff(&v1.id, &v2.id).await.expect("diff");
    assert!(diff.title.is_none());
    assert!(diff.memory_type.is_none());
    assert_eq!(diff.content, Some(("one".into(), "two".into())));
    assert_eq!(diff.tags_added, vec!["add"]);
    assert_eq!(diff.tags_removed, vec!["drop"]);
    assert!(!diff.is_empty());

    let same = db.get_version_diff(&v1.id, &v1.id).await.expect("diff");
    assert!(same.is_empty());
}

#[tokio::test]
async fn test_versioning_missing_memory_is_not_found() {
    let db = open_db().await;
    let err = db
        .create_version(&"mem_ghost".into(), &MemoryPatch::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = db.get_memory_history(&"mem_ghost".into()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn test_updates_to_current_do_not_touch_history() {
    let db = open_db().await;
    let v1 = db
        .store_memory(Memory::new(MemoryType::Decision, "d", "one"))
        .await
        .expect("store");
    let v2 = db
        .create_version(&v1.id, &MemoryPatch::new().content("two"))
        .await
        .expect("v2");

    db.update_memory(&v2.id, &MemoryPatch::new().content("two, amended"))
        .await
        .expect("update");

    let old = db.get_memory(&v1.id, false).await.expect("old");
    assert_eq!(old.memory.content, "one");
    let history = db.get_memory_history(&v2.id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "two, amended");
}
