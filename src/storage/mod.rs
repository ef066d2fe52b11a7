//! Storage layer: the backend contract and one adapter per physical engine.
//!
//! All adapters present the same logical property-graph model:
//! - **`SQLite`** — the relational fallback, emulating the graph on two
//!   generic tables with JSON property blobs
//! - **Cypher** — native graph servers reached over the HTTP transactional
//!   endpoint
//! - **In-memory** — an embedded engine, also used by tests
//!
//! Backend selection is a construction-time decision made by an external
//! factory; this crate only ever sees a connected [`GraphStore`] handle.

pub mod cypher;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use cypher::CypherBackend;
pub use memory::InMemoryBackend;
pub use sqlite::SqliteBackend;
pub use traits::{
    Backend, BackendKind, Direction, GraphStore, HealthReport, Params, Row, ScanFilter, StoreStats,
};
