//! SQL statements for the relational adapter.
//!
//! The property graph is emulated on two generic tables. All graph-shaped
//! queries (neighbor lookup, cascade delete) are explicit indexed SQL so the
//! deletion invariant is auditable in one place.

use crate::models::{MemoryType, RelationshipType};
use crate::storage::traits::{Direction, Params, ScanFilter};

/// Nodes table: one row per graph node, full state in the JSON blob plus
/// indexed columns mirrored out of it.
pub const CREATE_NODES_TABLE: &str = "CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    properties TEXT NOT NULL,
    memory_type TEXT,
    importance REAL,
    entity_key TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Edges table: directed, typed, JSON-encoded weighted properties.
pub const CREATE_EDGES_TABLE: &str = "CREATE TABLE IF NOT EXISTS edges (
    from_id TEXT NOT NULL,
    to_id TEXT NOT NULL,
    edge_type TEXT NOT NULL,
    properties TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

/// Index statements, all idempotent.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_memory_type ON nodes(memory_type)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_importance ON nodes(importance DESC)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_created_at ON nodes(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_updated_at ON nodes(updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_entity_key ON nodes(entity_key)",
    "CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type)",
];

/// Upserts one node row.
pub const UPSERT_NODE: &str = "INSERT INTO nodes (
    id, label, properties, memory_type, importance, entity_key, created_at, updated_at
) VALUES (:id, :label, :properties, :memory_type, :importance, :entity_key, :created_at, :updated_at)
ON CONFLICT(id) DO UPDATE SET
    label = excluded.label,
    properties = excluded.properties,
    memory_type = excluded.memory_type,
    importance = excluded.importance,
    entity_key = excluded.entity_key,
    updated_at = excluded.updated_at";

/// Fetches one memory node's properties.
pub const SELECT_MEMORY: &str =
    "SELECT properties FROM nodes WHERE id = :id AND label = 'memory'";

/// Counts memory nodes.
pub const COUNT_MEMORIES: &str = "SELECT COUNT(*) AS n FROM nodes WHERE label = 'memory'";

/// Counts entity nodes.
pub const COUNT_ENTITIES: &str = "SELECT COUNT(*) AS n FROM nodes WHERE label = 'entity'";

/// Counts edges.
pub const COUNT_EDGES: &str = "SELECT COUNT(*) AS n FROM edges";

/// Memory counts grouped by type.
pub const COUNT_MEMORIES_BY_TYPE: &str =
    "SELECT memory_type, COUNT(*) AS n FROM nodes WHERE label = 'memory' GROUP BY memory_type";

/// Edge counts grouped by type.
pub const COUNT_EDGES_BY_TYPE: &str =
    "SELECT edge_type, COUNT(*) AS n FROM edges GROUP BY edge_type";

/// Inserts one edge row.
pub const INSERT_EDGE: &str = "INSERT INTO edges (from_id, to_id, edge_type, properties, created_at)
VALUES (:from_id, :to_id, :edge_type, :properties, :created_at)";

/// All edges, used by export and statistics.
pub const SELECT_ALL_EDGES: &str = "SELECT from_id, to_id, edge_type,
    properties AS edge_properties, created_at AS edge_created_at
FROM edges ORDER BY created_at, from_id, to_id";

/// Entity lookup by deduplication key.
pub const SELECT_ENTITY_BY_KEY: &str =
    "SELECT id, properties FROM nodes WHERE label = 'entity' AND entity_key = :entity_key";

/// Entities mentioned by a memory.
pub const SELECT_ENTITIES_FOR_MEMORY: &str = "SELECT n.properties AS properties
FROM edges e
JOIN nodes n ON n.id = e.to_id AND n.label = 'entity'
WHERE e.from_id = :id AND e.edge_type = 'mentions'
ORDER BY n.id";

const EDGE_COLUMNS: &str =
    "e.from_id, e.to_id, e.edge_type, e.properties AS edge_properties, e.created_at AS edge_created_at";

/// Builds the edge query for one direction, with an optional type filter.
///
/// Returns the SQL and the type-filter parameters; the `:id` parameter is
/// bound by the caller.
#[must_use]
pub fn build_relationships_sql(
    direction: Direction,
    types: Option<&[RelationshipType]>,
) -> (String, Params) {
    let (type_clause, params) = type_filter(types);
    let where_clause = match direction {
        Direction::Outgoing => "e.from_id = :id".to_string(),
        Direction::Incoming => "e.to_id = :id".to_string(),
        Direction::Both => "(e.from_id = :id OR e.to_id = :id)".to_string(),
    };
    let sql = format!(
        "SELECT {EDGE_COLUMNS} FROM edges e WHERE {where_clause}{type_clause} ORDER BY e.created_at, e.to_id"
    );
    (sql, params)
}

/// Builds the neighbor query: edges in the given direction joined to the
/// memory node at the far end.
#[must_use]
pub fn build_neighbors_sql(
    direction: Direction,
    types: Option<&[RelationshipType]>,
) -> (String, Params) {
    let (type_clause, params) = type_filter(types);
    let select = |join_on: &str, where_on: &str| {
        format!(
            "SELECT n.properties AS node_properties, {EDGE_COLUMNS}
             FROM edges e
             JOIN nodes n ON n.id = e.{join_on} AND n.label = 'memory'
             WHERE e.{where_on} = :id{type_clause}"
        )
    };
    let sql = match direction {
        Direction::Outgoing => select("to_id", "from_id"),
        Direction::Incoming => select("from_id", "to_id"),
        Direction::Both => format!(
            "{} UNION ALL {}",
            select("to_id", "from_id"),
            select("from_id", "to_id")
        ),
    };
    (sql, params)
}

fn type_filter(types: Option<&[RelationshipType]>) -> (String, Params) {
    let mut params = Params::new();
    let clause = types.map_or_else(String::new, |types| {
        let placeholders: Vec<String> = types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let name = format!("type_{i}");
                params.insert(name.clone(), serde_json::Value::String(t.as_str().into()));
                format!(":{name}")
            })
            .collect();
        format!(" AND e.edge_type IN ({})", placeholders.join(", "))
    });
    (clause, params)
}

/// Builds the memory scan query from a [`ScanFilter`].
///
/// Order is `created_at`, then id, so paginated iteration is deterministic.
#[must_use]
pub fn build_scan_sql(filter: &ScanFilter) -> (String, Params) {
    let mut conditions = vec!["label = 'memory'".to_string()];
    let mut params = Params::new();

    if !filter.memory_types.is_empty() {
        let placeholders: Vec<String> = filter
            .memory_types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let name = format!("memory_type_{i}");
                params.insert(name.clone(), serde_json::Value::String(t.as_str().into()));
                format!(":{name}")
            })
            .collect();
        conditions.push(format!("memory_type IN ({})", placeholders.join(", ")));
    }

    if let Some(updated_after) = filter.updated_after {
        conditions.push("updated_at >= :updated_after".to_string());
        params.insert(
            "updated_after".to_string(),
            serde_json::Value::String(super::format_timestamp(updated_after)),
        );
    }

    if let Some(ref project) = filter.project {
        conditions.push("json_extract(properties, '$.context.project') = :project".to_string());
        params.insert(
            "project".to_string(),
            serde_json::Value::String(project.clone()),
        );
    }

    // LIMIT -1 means unbounded in SQLite
    let limit = filter.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(-1));
    params.insert("limit".to_string(), serde_json::Value::from(limit));
    params.insert(
        "offset".to_string(),
        serde_json::Value::from(u64::try_from(filter.offset).unwrap_or(0)),
    );

    let sql = format!(
        "SELECT properties FROM nodes WHERE {} ORDER BY created_at, id LIMIT :limit OFFSET :offset",
        conditions.join(" AND ")
    );
    (sql, params)
}

/// Returns true if a memory type string matches a known variant.
#[must_use]
pub fn parse_memory_type(s: &str) -> Option<MemoryType> {
    MemoryType::parse(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_scan_sql_unfiltered() {
        let (sql, params) = build_scan_sql(&ScanFilter::new());
        assert!(sql.contains("label = 'memory'"));
        assert!(sql.contains("ORDER BY created_at, id"));
        assert_eq!(params.get("limit"), Some(&serde_json::Value::from(-1)));
    }

    #[test]
    fn test_build_scan_sql_with_types() {
        let filter = ScanFilter::new()
            .with_memory_type(MemoryType::Solution)
            .with_memory_type(MemoryType::Problem);
        let (sql, params) = build_scan_sql(&filter);
        assert!(sql.contains("memory_type IN (:memory_type_0, :memory_type_1)"));
        assert_eq!(
            params.get("memory_type_0"),
            Some(&serde_json::Value::String("solution".into()))
        );
    }

    #[test]
    fn test_build_neighbors_sql_both_directions() {
        let (sql, _) = build_neighbors_sql(Direction::Both, None);
        assert!(sql.contains("UNION ALL"));
        assert!(sql.contains("e.from_id = :id"));
        assert!(sql.contains("e.to_id = :id"));
    }

    #[test]
    fn test_build_neighbors_sql_type_filter() {
        let (sql, params) = build_neighbors_sql(
            Direction::Outgoing,
            Some(&[RelationshipType::Solves, RelationshipType::UsedIn]),
        );
        assert!(sql.contains("e.edge_type IN (:type_0, :type_1)"));
        assert_eq!(
            params.get("type_1"),
            Some(&serde_json::Value::String("used_in".into()))
        );
    }
}
