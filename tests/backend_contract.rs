//! Backend contract tests.
//!
//! Every adapter must honor the same query execution contract: connect
//! before anything else, idempotent schema initialization, structured
//! parameter passing, and a health report after connect. The parameter
//! round-trip test is a regression pin: an earlier implementation silently
//! dropped the parameter map on one backend.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use mnemograph::storage::{Backend, BackendKind, GraphStore, InMemoryBackend, SqliteBackend};
use mnemograph::{Error, Memory, MemoryType};
use std::collections::BTreeMap;
use tempfile::TempDir;

type Params = BTreeMap<String, serde_json::Value>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn assert_connect_gate<B: Backend>(backend: &B) {
    let err = backend.initialize_schema().await.unwrap_err();
    assert!(
        matches!(err, Error::Connection(_)),
        "initialize_schema before connect must be a connection error"
    );
    let err = backend.health_check().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn test_sqlite_requires_connect_first() {
    init_tracing();
    assert_connect_gate(&SqliteBackend::in_memory()).await;
}

#[tokio::test]
async fn test_memory_backend_requires_connect_first() {
    assert_connect_gate(&InMemoryBackend::new()).await;
}

#[tokio::test]
async fn test_sqlite_schema_is_idempotent_on_disk() {
    let dir = TempDir::new().expect("tempdir");
    let backend = SqliteBackend::new(dir.path().join("graph.db"));
    backend.connect().await.expect("connect");
    backend.initialize_schema().await.expect("first init");
    backend.initialize_schema().await.expect("second init");

    // Reconnecting against the same file must also be safe
    backend.disconnect().await.expect("disconnect");
    backend.connect().await.expect("reconnect");
    backend.initialize_schema().await.expect("init after reopen");
}

#[tokio::test]
async fn test_sqlite_parameters_reach_the_engine() {
    let backend = SqliteBackend::in_memory();
    backend.connect().await.expect("connect");
    backend.initialize_schema().await.expect("schema");

    let mut params = Params::new();
    params.insert("title".into(), serde_json::Value::from("param check"));
    params.insert("importance".into(), serde_json::Value::from(0.25));
    let rows = backend
        .execute_query(
            "SELECT :title AS title, :importance AS importance",
            &params,
            false,
        )
        .await
        .expect("query");
    assert_eq!(
        rows[0].get("title"),
        Some(&serde_json::Value::from("param check"))
    );
    assert_eq!(
        rows[0].get("importance"),
        Some(&serde_json::Value::from(0.25))
    );
}

#[tokio::test]
async fn test_sqlite_missing_parameter_is_an_error_not_a_drop() {
    let backend = SqliteBackend::in_memory();
    backend.connect().await.expect("connect");

    let err = backend
        .execute_query("SELECT :missing AS v", &Params::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_health_check_reports_counts() {
    let backend = SqliteBackend::in_memory();
    backend.connect().await.expect("connect");
    backend.initialize_schema().await.expect("schema");

    let report = backend.health_check().await.expect("health");
    assert!(report.connected);
    assert_eq!(report.backend_kind, BackendKind::Sqlite);
    assert_eq!(report.memory_count, 0);

    backend
        .upsert_memory(&Memory::new(MemoryType::General, "t", "c"))
        .await
        .expect("upsert");
    let report = backend.health_check().await.expect("health");
    assert_eq!(report.memory_count, 1);
}

#[tokio::test]
async fn test_disconnect_then_operation_fails() {
    for (name, backend) in [
        ("sqlite", Box::new(SqliteBackend::in_memory()) as Box<dyn Backend>),
        ("memory", Box::new(InMemoryBackend::new()) as Box<dyn Backend>),
    ] {
        backend.connect().await.expect("connect");
        backend.disconnect().await.expect("disconnect");
        let err = backend.health_check().await.unwrap_err();
        assert!(
            matches!(err, Error::Connection(_)),
            "{name} must gate after disconnect"
        );
    }
}

#[tokio::test]
async fn test_memory_backend_op_envelope_params() {
    let backend = InMemoryBackend::new();
    backend.connect().await.expect("connect");

    let memory = Memory::new(MemoryType::Solution, "envelope", "body");
    let mut params = Params::new();
    params.insert("memory".into(), serde_json::to_value(&memory).unwrap());
    backend
        .execute_query("memory.upsert", &params, true)
        .await
        .expect("upsert op");

    let rows = backend
        .execute_query("memory.count", &Params::new(), false)
        .await
        .expect("count op");
    assert_eq!(rows[0].get("n"), Some(&serde_json::Value::from(1)));
}
