//! Conversions between result rows and graph model types.
//!
//! Rows are column-name maps shared by every adapter, so these helpers are
//! reused by the Cypher and in-memory backends as well.

use crate::models::{Entity, Memory, Relationship, RelationshipProperties, RelationshipType};
use crate::storage::traits::{Params, Row};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp for indexed columns.
///
/// Fixed microsecond precision so lexicographic order equals chronological
/// order.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp.
///
/// # Errors
///
/// Returns [`Error::Schema`] when the stored value is not RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::schema("parse_timestamp", e))
}

/// Extracts a string column from a row.
///
/// # Errors
///
/// Returns [`Error::Schema`] when the column is absent or not a string.
pub fn string_column<'a>(row: &'a Row, name: &str) -> Result<&'a str> {
    row.get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::schema("read_row", format!("missing string column '{name}'")))
}

/// Sums the first integer column of a single-row count result.
#[must_use]
pub fn count_from_rows(rows: &[Row]) -> usize {
    rows.first()
        .and_then(|row| row.get("n"))
        .and_then(serde_json::Value::as_i64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// Builds the node-upsert parameter map for a memory.
///
/// # Errors
///
/// Returns [`Error::Schema`] when serialization fails.
pub fn memory_to_params(memory: &Memory) -> Result<Params> {
    let properties =
        serde_json::to_string(memory).map_err(|e| Error::schema("serialize_memory", e))?;
    let mut params = Params::new();
    params.insert("id".into(), memory.id.as_str().into());
    params.insert("label".into(), "memory".into());
    params.insert("properties".into(), properties.into());
    params.insert("memory_type".into(), memory.memory_type.as_str().into());
    params.insert("importance".into(), f64::from(memory.importance).into());
    params.insert("entity_key".into(), serde_json::Value::Null);
    params.insert(
        "created_at".into(),
        format_timestamp(memory.created_at).into(),
    );
    params.insert(
        "updated_at".into(),
        format_timestamp(memory.updated_at).into(),
    );
    Ok(params)
}

/// Builds the node-upsert parameter map for an entity.
///
/// # Errors
///
/// Returns [`Error::Schema`] when serialization fails.
pub fn entity_to_params(entity: &Entity) -> Result<Params> {
    let properties =
        serde_json::to_string(entity).map_err(|e| Error::schema("serialize_entity", e))?;
    let now = format_timestamp(crate::now());
    let mut params = Params::new();
    params.insert("id".into(), entity.id.clone().into());
    params.insert("label".into(), "entity".into());
    params.insert("properties".into(), properties.into());
    params.insert("memory_type".into(), serde_json::Value::Null);
    params.insert("importance".into(), serde_json::Value::Null);
    params.insert("entity_key".into(), entity.dedup_key().into());
    params.insert("created_at".into(), now.clone().into());
    params.insert("updated_at".into(), now.into());
    Ok(params)
}

/// Builds the edge-insert parameter map.
///
/// # Errors
///
/// Returns [`Error::Schema`] when serialization fails.
pub fn relationship_to_params(relationship: &Relationship) -> Result<Params> {
    let properties = serde_json::to_string(&relationship.properties)
        .map_err(|e| Error::schema("serialize_relationship", e))?;
    let mut params = Params::new();
    params.insert(
        "from_id".into(),
        relationship.from_memory_id.as_str().into(),
    );
    params.insert("to_id".into(), relationship.to_memory_id.as_str().into());
    params.insert(
        "edge_type".into(),
        relationship.relationship_type.as_str().into(),
    );
    params.insert("properties".into(), properties.into());
    params.insert(
        "created_at".into(),
        format_timestamp(relationship.created_at).into(),
    );
    Ok(params)
}

/// Parses a memory from a row carrying a `properties` (or `node_properties`)
/// JSON column.
///
/// # Errors
///
/// Returns [`Error::Schema`] when the blob is missing or malformed.
pub fn memory_from_row(row: &Row) -> Result<Memory> {
    let blob = row
        .get("properties")
        .or_else(|| row.get("node_properties"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::schema("read_row", "missing memory properties column"))?;
    serde_json::from_str(blob).map_err(|e| Error::schema("deserialize_memory", e))
}

/// Parses an entity from a row carrying a `properties` JSON column.
///
/// # Errors
///
/// Returns [`Error::Schema`] when the blob is missing or malformed.
pub fn entity_from_row(row: &Row) -> Result<Entity> {
    let blob = string_column(row, "properties")?;
    serde_json::from_str(blob).map_err(|e| Error::schema("deserialize_entity", e))
}

/// Parses a relationship from edge columns.
///
/// # Errors
///
/// Returns [`Error::Schema`] on missing columns or an unknown edge type.
pub fn relationship_from_row(row: &Row) -> Result<Relationship> {
    let from_id = string_column(row, "from_id")?;
    let to_id = string_column(row, "to_id")?;
    let type_str = string_column(row, "edge_type")?;
    let relationship_type = RelationshipType::parse(type_str)
        .ok_or_else(|| Error::schema("read_row", format!("unknown edge type '{type_str}'")))?;
    let properties: RelationshipProperties =
        serde_json::from_str(string_column(row, "edge_properties")?)
            .map_err(|e| Error::schema("deserialize_relationship", e))?;
    let created_at = parse_timestamp(string_column(row, "edge_created_at")?)?;

    Ok(Relationship {
        from_memory_id: from_id.into(),
        to_memory_id: to_id.into(),
        relationship_type,
        properties,
        created_at,
    })
}
