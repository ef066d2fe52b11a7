//! Auxiliary entity nodes.
//!
//! Entities are produced by an external extraction collaborator and linked to
//! memories via `MENTIONS` edges. They are deduplicated by
//! `(lowercased text, lowercased type)`.

use serde::{Deserialize, Serialize};

/// An entity node referenced by one or more memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier (`ent_` prefixed).
    pub id: String,
    /// The surface text of the entity.
    pub text: String,
    /// Free-form entity type (e.g. "technology", "person").
    pub entity_type: String,
    /// Number of times this entity has been observed.
    #[serde(default)]
    pub occurrence_count: u32,
}

impl Entity {
    /// Creates a new entity with a generated id and one occurrence.
    #[must_use]
    pub fn new(text: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: format!("ent_{}", uuid::Uuid::new_v4().simple()),
            text: text.into(),
            entity_type: entity_type.into(),
            occurrence_count: 1,
        }
    }

    /// Returns the deduplication key: lowercased text and type.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.text, &self.entity_type)
    }
}

/// Builds the entity deduplication key from raw text and type.
#[must_use]
pub fn dedup_key(text: &str, entity_type: &str) -> String {
    format!(
        "{}\u{1f}{}",
        text.trim().to_lowercase(),
        entity_type.trim().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_is_case_insensitive() {
        let a = Entity::new("Redis", "Technology");
        let b = Entity::new("redis", "technology");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_dedup_key_separates_fields() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(dedup_key("ab", "c"), dedup_key("a", "bc"));
    }
}
