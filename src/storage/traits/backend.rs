//! The query execution contract every physical backend implements.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Native protocol |
//! |---------|----------|-----------------|
//! | [`SqliteBackend`](crate::storage::SqliteBackend) | Default; embedded fallback | Parameterized SQL over two generic tables |
//! | [`CypherBackend`](crate::storage::CypherBackend) | Graph servers | Cypher over the HTTP transactional endpoint |
//! | [`InMemoryBackend`](crate::storage::InMemoryBackend) | Embedded engine, tests | Op-envelope over in-process maps |
//!
//! # Contract
//!
//! - Calling any operation other than `connect` before a successful `connect`
//!   fails with [`crate::Error::Connection`].
//! - `initialize_schema` is idempotent: safe to call on an already-initialized
//!   store.
//! - Query parameters are always passed as a structured map and never
//!   interpolated into the query text. A prior implementation silently dropped
//!   the parameter map on one backend; the contract test suite pins the
//!   round-trip.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Structured parameter map passed alongside every query.
pub type Params = BTreeMap<String, serde_json::Value>;

/// One result row: column name to value.
pub type Row = BTreeMap<String, serde_json::Value>;

/// The kind of physical engine behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded relational store (`SQLite`).
    Sqlite,
    /// Cypher-speaking graph server.
    Cypher,
    /// Embedded in-process graph engine.
    Memory,
}

impl BackendKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Cypher => "cypher",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health snapshot returned by [`Backend::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Whether the backend is connected.
    pub connected: bool,
    /// Which engine is active.
    pub backend_kind: BackendKind,
    /// Number of memory nodes.
    pub memory_count: usize,
    /// Number of entity nodes.
    pub entity_count: usize,
    /// Number of edges.
    pub relationship_count: usize,
}

/// The minimal operation set every physical backend must implement.
///
/// # Implementor Notes
///
/// - Methods take `&self` to allow sharing via `Arc<dyn Backend>`; use
///   interior mutability for connection state.
/// - The `write` flag on [`Backend::execute_query`] routes the call through
///   the transactional/mutating path on engines that distinguish one.
///   Engines without the distinction ignore it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns which kind of engine this adapter drives.
    fn kind(&self) -> BackendKind;

    /// Establishes the connection. Must succeed before any other operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] if the engine is unreachable.
    async fn connect(&self) -> Result<()>;

    /// Creates the schema if it does not exist. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Schema`] if schema objects cannot be created,
    /// or [`crate::Error::Connection`] when called before `connect`.
    async fn initialize_schema(&self) -> Result<()>;

    /// Executes one parameterized query in the backend's native language.
    ///
    /// Parameters are bound from the structured map; adapters must never
    /// interpolate values into the query text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Schema`] for execution failures and
    /// [`crate::Error::Connection`] when called before `connect`.
    async fn execute_query(&self, query: &str, params: &Params, write: bool) -> Result<Vec<Row>>;

    /// Closes the connection. Subsequent operations fail until `connect`.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn disconnect(&self) -> Result<()>;

    /// Reports connection state and store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Connection`] when called before `connect`.
    async fn health_check(&self) -> Result<HealthReport>;
}
