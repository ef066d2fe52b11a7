//! `SQLite` relational adapter — the reference/fallback backend.
//!
//! Emulates the property graph on two generic tables (`nodes`, `edges`) with
//! JSON property blobs and indexed columns mirrored out of them. All logical
//! graph operations compile to parameterized SQL; node deletion removes the
//! node and its incident edges in one transaction.

// Allow cast_possible_truncation for SQLite i64 to usize conversions.
// SQLite returns i64, but node counts and offsets are inherently non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
// Allow significant_drop_tightening - dropping the connection guard slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

mod row;
pub mod sql;

pub use row::{
    count_from_rows, entity_from_row, entity_to_params, format_timestamp, memory_from_row,
    memory_to_params, parse_timestamp, relationship_from_row, relationship_to_params,
    string_column,
};

use crate::models::{Entity, Memory, MemoryId, MemoryType, Relationship, RelationshipType};
use crate::storage::traits::{
    Backend, BackendKind, Direction, GraphStore, HealthReport, Params, Row, ScanFilter, StoreStats,
};
use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::instrument;

/// Helper to acquire the connection lock with poison recovery.
fn acquire_lock(mutex: &Mutex<Option<Connection>>) -> MutexGuard<'_, Option<Connection>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("sqlite connection mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

fn not_connected() -> Error {
    Error::Connection("sqlite backend is not connected".to_string())
}

/// `SQLite`-backed graph store.
///
/// # Concurrency Model
///
/// A `Mutex<Option<Connection>>` serializes all access through one
/// connection; writes that span multiple statements run inside a rusqlite
/// transaction on that connection. WAL mode and `busy_timeout` handle
/// concurrent processes gracefully.
pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Creates an unconnected backend for the given database path.
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            conn: Mutex::new(None),
            db_path: Some(db_path.into()),
        }
    }

    /// Creates an unconnected backend over an in-memory database.
    ///
    /// Data does not survive `disconnect`.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            conn: Mutex::new(None),
            db_path: None,
        }
    }

    /// Returns the database path, when file-backed.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Binds a JSON value to one statement parameter.
    fn bind_value(
        stmt: &mut rusqlite::Statement<'_>,
        idx: usize,
        value: &serde_json::Value,
    ) -> rusqlite::Result<()> {
        use serde_json::Value;
        match value {
            Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
            Value::Bool(b) => stmt.raw_bind_parameter(idx, i64::from(*b)),
            Value::Number(n) if n.is_i64() || n.is_u64() => {
                stmt.raw_bind_parameter(idx, n.as_i64().unwrap_or(i64::MAX))
            },
            Value::Number(n) => stmt.raw_bind_parameter(idx, n.as_f64().unwrap_or(0.0)),
            Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
            // Arrays and objects are stored as JSON text
            other => stmt.raw_bind_parameter(idx, other.to_string()),
        }
    }

    fn value_ref_to_json(value: rusqlite::types::ValueRef<'_>) -> serde_json::Value {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null | ValueRef::Blob(_) => serde_json::Value::Null,
            ValueRef::Integer(i) => serde_json::Value::from(i),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        }
    }

    /// Runs one parameterized statement against a connection (or transaction,
    /// which derefs to one). Every named parameter must be present in the map.
    fn run_query(conn: &Connection, query: &str, params: &Params) -> Result<Vec<Row>> {
        let mut stmt = conn
            .prepare(query)
            .map_err(|e| Error::schema("prepare", e))?;

        for idx in 1..=stmt.parameter_count() {
            let name = stmt.parameter_name(idx).map(ToString::to_string);
            let Some(name) = name else {
                return Err(Error::schema(
                    "bind",
                    format!("statement uses a positional parameter at index {idx}; named parameters are required"),
                ));
            };
            let key = name.trim_start_matches([':', '@', '$']);
            let value = params
                .get(key)
                .ok_or_else(|| Error::schema("bind", format!("missing parameter '{key}'")))?;
            Self::bind_value(&mut stmt, idx, value).map_err(|e| Error::schema("bind", e))?;
        }

        let column_count = stmt.column_count();
        if column_count == 0 {
            let affected = stmt
                .raw_execute()
                .map_err(|e| Error::schema("execute", e))?;
            let mut result = Row::new();
            result.insert("rows_affected".into(), serde_json::Value::from(affected));
            return Ok(vec![result]);
        }

        let mut names = Vec::with_capacity(column_count);
        for i in 0..column_count {
            names.push(
                stmt.column_name(i)
                    .map_err(|e| Error::schema("columns", e))?
                    .to_string(),
            );
        }

        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(r) = rows.next().map_err(|e| Error::schema("query", e))? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = r.get_ref(i).map_err(|e| Error::schema("query", e))?;
                row.insert(name.clone(), Self::value_ref_to_json(value));
            }
            out.push(row);
        }
        Ok(out)
    }

    /// Runs a closure inside a transaction, rolling back on error.
    fn with_tx<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = acquire_lock(&self.conn);
        let conn = guard.as_mut().ok_or_else(not_connected)?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::schema(operation, e))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| Error::schema(operation, e))?;
        Ok(value)
    }

    fn node_exists(conn: &Connection, id: &str) -> Result<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            [id],
            |r| r.get(0),
        )
        .map_err(|e| Error::schema("node_exists", e))
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn connect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        if guard.is_some() {
            return Ok(());
        }
        let conn = match &self.db_path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| Error::Connection(format!("failed to open sqlite database: {e}")))?;

        // WAL improves concurrent read behavior; failures are non-fatal
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");

        *guard = Some(conn);
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<()> {
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(not_connected)?;

        for (name, statement) in [
            ("create_nodes_table", sql::CREATE_NODES_TABLE),
            ("create_edges_table", sql::CREATE_EDGES_TABLE),
        ] {
            conn.execute(statement, [])
                .map_err(|e| Error::schema(name, e))?;
        }
        for statement in sql::CREATE_INDEXES {
            conn.execute(statement, [])
                .map_err(|e| Error::schema("create_indexes", e))?;
        }
        Ok(())
    }

    async fn execute_query(&self, query: &str, params: &Params, _write: bool) -> Result<Vec<Row>> {
        // One serialized connection: the write flag carries no extra meaning here.
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        Self::run_query(conn, query, params)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        guard.take();
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        let guard = acquire_lock(&self.conn);
        let conn = guard.as_ref().ok_or_else(not_connected)?;
        let memory_count = count_from_rows(&Self::run_query(
            conn,
            sql::COUNT_MEMORIES,
            &Params::new(),
        )?);
        let entity_count = count_from_rows(&Self::run_query(
            conn,
            sql::COUNT_ENTITIES,
            &Params::new(),
        )?);
        let relationship_count =
            count_from_rows(&Self::run_query(conn, sql::COUNT_EDGES, &Params::new())?);
        Ok(HealthReport {
            connected: true,
            backend_kind: BackendKind::Sqlite,
            memory_count,
            entity_count,
            relationship_count,
        })
    }
}

#[async_trait]
impl GraphStore for SqliteBackend {
    #[instrument(skip(self, memory), fields(memory_id = %memory.id))]
    async fn upsert_memory(&self, memory: &Memory) -> Result<()> {
        let params = memory_to_params(memory)?;
        self.execute_query(sql::UPSERT_NODE, &params, true).await?;
        Ok(())
    }

    async fn fetch_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        let rows = self.execute_query(sql::SELECT_MEMORY, &params, false).await?;
        rows.first().map(memory_from_row).transpose()
    }

    #[instrument(skip(self), fields(memory_id = %id))]
    async fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.with_tx("delete_memory", |tx| {
            if !Self::node_exists(tx, id.as_str())? {
                return Ok(false);
            }
            // Edge cleanup and node removal commit or roll back together.
            tx.execute(
                "DELETE FROM edges WHERE from_id = :id OR to_id = :id",
                rusqlite::named_params! {":id": id.as_str()},
            )
            .map_err(|e| Error::schema("delete_edges", e))?;
            tx.execute(
                "DELETE FROM nodes WHERE id = :id",
                rusqlite::named_params! {":id": id.as_str()},
            )
            .map_err(|e| Error::schema("delete_node", e))?;
            Ok(true)
        })
    }

    async fn list_memories(&self, filter: &ScanFilter) -> Result<Vec<Memory>> {
        let (query, params) = sql::build_scan_sql(filter);
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter().map(memory_from_row).collect()
    }

    async fn count_memories(&self) -> Result<usize> {
        let rows = self
            .execute_query(sql::COUNT_MEMORIES, &Params::new(), false)
            .await?;
        Ok(count_from_rows(&rows))
    }

    #[instrument(skip(self, relationship), fields(
        from = %relationship.from_memory_id,
        to = %relationship.to_memory_id,
        edge_type = %relationship.relationship_type,
    ))]
    async fn insert_relationship(&self, relationship: &Relationship) -> Result<()> {
        let params = relationship_to_params(relationship)?;
        self.with_tx("insert_relationship", |tx| {
            // Endpoint existence is checked at the application layer; the
            // generic edges table carries no foreign keys.
            for (endpoint, resource) in [
                (&relationship.from_memory_id, "memory"),
                (&relationship.to_memory_id, "memory"),
            ] {
                if !Self::node_exists(tx, endpoint.as_str())? {
                    return Err(Error::NotFound {
                        resource,
                        id: endpoint.to_string(),
                    });
                }
            }
            Self::run_query(tx, sql::INSERT_EDGE, &params)?;
            Ok(())
        })
    }

    async fn relationships_for(
        &self,
        id: &MemoryId,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let (query, mut params) = sql::build_relationships_sql(direction, None);
        params.insert("id".into(), id.as_str().into());
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter().map(relationship_from_row).collect()
    }

    async fn list_relationships(&self) -> Result<Vec<Relationship>> {
        let rows = self
            .execute_query(sql::SELECT_ALL_EDGES, &Params::new(), false)
            .await?;
        rows.iter().map(relationship_from_row).collect()
    }

    async fn neighbors(
        &self,
        id: &MemoryId,
        types: Option<&[RelationshipType]>,
        direction: Direction,
    ) -> Result<Vec<(Memory, Relationship)>> {
        let (query, mut params) = sql::build_neighbors_sql(direction, types);
        params.insert("id".into(), id.as_str().into());
        let rows = self.execute_query(&query, &params, false).await?;
        rows.iter()
            .map(|row| Ok((memory_from_row(row)?, relationship_from_row(row)?)))
            .collect()
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<Entity> {
        let key = entity.dedup_key();
        let increment = entity.occurrence_count.max(1);
        self.with_tx("upsert_entity", |tx| {
            let mut params = Params::new();
            params.insert("entity_key".into(), key.clone().into());
            let existing = Self::run_query(tx, sql::SELECT_ENTITY_BY_KEY, &params)?;

            let stored = if let Some(row) = existing.first() {
                let mut stored = entity_from_row(row)?;
                stored.occurrence_count += increment;
                stored
            } else {
                entity.clone()
            };
            Self::run_query(tx, sql::UPSERT_NODE, &entity_to_params(&stored)?)?;
            Ok(stored)
        })
    }

    async fn entities_for(&self, id: &MemoryId) -> Result<Vec<Entity>> {
        let mut params = Params::new();
        params.insert("id".into(), id.as_str().into());
        let rows = self
            .execute_query(sql::SELECT_ENTITIES_FOR_MEMORY, &params, false)
            .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let memory_count = count_from_rows(
            &self
                .execute_query(sql::COUNT_MEMORIES, &Params::new(), false)
                .await?,
        );
        let entity_count = count_from_rows(
            &self
                .execute_query(sql::COUNT_ENTITIES, &Params::new(), false)
                .await?,
        );
        let relationship_count = count_from_rows(
            &self
                .execute_query(sql::COUNT_EDGES, &Params::new(), false)
                .await?,
        );

        let mut memories_by_type: HashMap<MemoryType, usize> = HashMap::new();
        for row in self
            .execute_query(sql::COUNT_MEMORIES_BY_TYPE, &Params::new(), false)
            .await?
        {
            if let (Some(type_str), Some(n)) = (
                row.get("memory_type").and_then(serde_json::Value::as_str),
                row.get("n").and_then(serde_json::Value::as_i64),
            ) {
                if let Some(memory_type) = sql::parse_memory_type(type_str) {
                    memories_by_type.insert(memory_type, n as usize);
                }
            }
        }

        let mut relationships_by_type: HashMap<String, usize> = HashMap::new();
        for row in self
            .execute_query(sql::COUNT_EDGES_BY_TYPE, &Params::new(), false)
            .await?
        {
            if let (Some(type_str), Some(n)) = (
                row.get("edge_type").and_then(serde_json::Value::as_str),
                row.get("n").and_then(serde_json::Value::as_i64),
            ) {
                relationships_by_type.insert(type_str.to_string(), n as usize);
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

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn connected() -> SqliteBackend {
        let backend = SqliteBackend::in_memory();
        backend.connect().await.expect("connect");
        backend.initialize_schema().await.expect("schema");
        backend
    }

    #[tokio::test]
    async fn test_operations_require_connect() {
        let backend = SqliteBackend::in_memory();
        let err = backend.initialize_schema().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));

        let err = backend
            .execute_query("SELECT 1 AS n", &Params::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_initialize_schema_is_idempotent() {
        let backend = connected().await;
        backend.initialize_schema().await.expect("second init");
    }

    #[tokio::test]
    async fn test_execute_query_binds_named_params() {
        let backend = connected().await;
        let mut params = Params::new();
        params.insert("value".into(), serde_json::Value::from(41));
        let rows = backend
            .execute_query("SELECT :value + 1 AS n", &params, false)
            .await
            .expect("query");
        assert_eq!(rows[0].get("n"), Some(&serde_json::Value::from(42)));
    }

    #[tokio::test]
    async fn test_execute_query_rejects_missing_param() {
        let backend = connected().await;
        let err = backend
            .execute_query("SELECT :value AS n", &Params::new(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing parameter 'value'"));
    }

    #[tokio::test]
    async fn test_disconnect_closes_connection() {
        let backend = connected().await;
        backend.disconnect().await.expect("disconnect");
        assert!(backend.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_delete_memory_missing_returns_false() {
        let backend = connected().await;
        let deleted = backend
            .delete_memory(&MemoryId::new("mem_missing"))
            .await
            .expect("delete");
        assert!(!deleted);
    }
}
