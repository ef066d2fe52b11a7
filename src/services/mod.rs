//! Service layer: the database facade and the engines it composes.

pub mod database;
pub mod search;
pub mod text;
pub mod traversal;
pub mod versioning;

pub use database::{
    Database, ImportReport, MemoryDetails, MemoryStatistics, SkippedRelationship,
};
pub use search::SearchOutcome;
pub use traversal::{
    ChainLink, DependencyNode, DependencyTrace, RelatedMemory, SimilarMatch,
};
pub use versioning::VersionDiff;
