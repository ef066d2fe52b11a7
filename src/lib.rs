//! # Mnemograph
//!
//! A knowledge graph memory store for AI agent workflows.
//!
//! Mnemograph stores units of knowledge ("memories") as property-graph nodes
//! connected by typed, weighted relationships, and answers free-text search,
//! tag/type filters, and graph traversal against one logical contract
//! regardless of the physical engine underneath.
//!
//! ## Features
//!
//! - Pluggable backends behind a single query contract (`SQLite`, Cypher
//!   servers over HTTP, embedded in-process engine)
//! - Tolerance-controlled text search (strict / normal / fuzzy) with
//!   per-field ranking and machine-checkable match info
//! - Relationship traversal: chain discovery, dependency tracing with cycle
//!   detection, keyword similarity matching, neighborhood-scoped search
//! - Append-only temporal versioning over a reserved `PREVIOUS` edge type
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnemograph::{Database, Memory, MemoryType};
//! use mnemograph::storage::SqliteBackend;
//!
//! let backend = SqliteBackend::new("memories.db");
//! let db = Database::open(backend).await?;
//! let stored = db
//!     .store_memory(Memory::new(MemoryType::Solution, "Pool fix", "Raise max connections"))
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod models;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use models::{
    Entity, MatchMode, Memory, MemoryContext, MemoryId, MemoryPatch, MemoryType, PaginatedResult,
    Relationship, RelationshipProperties, RelationshipType, SearchHit, SearchQuery,
    SearchTolerance,
};
pub use services::{Database, ImportReport, MemoryStatistics, VersionDiff};
pub use storage::{
    Backend, BackendKind, CypherBackend, Direction, GraphStore, HealthReport, InMemoryBackend,
    SqliteBackend,
};

/// Error type for mnemograph operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Connection` | Backend unreachable, or an operation was called before `connect` |
/// | `Schema` | Schema initialization or query execution fails |
/// | `Validation` | Malformed input rejected before any backend call |
/// | `NotFound` | A referenced memory or relationship endpoint does not exist |
/// | `Relationship` | Relationship creation/traversal failure not otherwise classified |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Backend unreachable or not yet connected.
    ///
    /// Raised when:
    /// - Any operation other than `connect` is called before a successful `connect`
    /// - The underlying engine cannot be opened or reached
    /// - The connection was closed by `disconnect`
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema initialization or query execution failed.
    ///
    /// Raised when:
    /// - `initialize_schema` cannot create tables or indexes
    /// - A query is syntactically invalid for the active engine
    /// - The engine reports an execution error for a well-formed call
    #[error("schema error in '{operation}': {cause}")]
    Schema {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A memory has an empty title or content
    /// - `importance`/`confidence`/`effectiveness` fall outside `[0, 1]`
    /// - An unknown memory type, relationship type, or search tolerance is given
    /// - A traversal is requested for an empty memory id
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// The kind of resource that was looked up.
        resource: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Relationship creation or traversal failed.
    #[error("relationship error: {0}")]
    Relationship(String),
}

impl Error {
    /// Builds a [`Error::Schema`] from an operation name and a cause.
    pub fn schema(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Schema {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a [`Error::NotFound`] for a memory id.
    pub fn memory_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: "memory",
            id: id.to_string(),
        }
    }
}

/// Result type alias for mnemograph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current UTC time.
///
/// Centralized so storage adapters and services share one clock source.
#[must_use]
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

/// Returns the current Unix timestamp in seconds.
///
/// # Examples
///
/// ```rust
/// use mnemograph::current_timestamp;
///
/// let ts = current_timestamp();
/// assert!(ts > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
