//! Relationship edge types.
//!
//! Edges are directed, typed, and weighted. Multiple edges may exist between
//! the same pair of nodes; creation is not deduplicated. Two types are
//! reserved: [`RelationshipType::Previous`] links a memory version to its
//! immediate predecessor and must form a simple chain, and
//! [`RelationshipType::Mentions`] links a memory to an extracted entity node.

use crate::models::MemoryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of relationship between memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source solves the target problem.
    Solves,
    /// Source causes the target.
    Causes,
    /// Source triggers the target.
    Triggers,
    /// General association.
    RelatedTo,
    /// Source depends on the target.
    DependsOn,
    /// Source requires the target.
    Requires,
    /// Source addresses the target.
    Addresses,
    /// Source is used in the target.
    UsedIn,
    /// Source is an alternative to the target.
    AlternativeTo,
    /// Reserved: source version supersedes the target version.
    Previous,
    /// Reserved: source memory mentions the target entity.
    Mentions,
}

/// Edge types that express a dependency, used by dependency tracing.
pub const DEPENDENCY_TYPES: &[RelationshipType] =
    &[RelationshipType::DependsOn, RelationshipType::Requires];

impl RelationshipType {
    /// Returns all relationship type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Solves,
            Self::Causes,
            Self::Triggers,
            Self::RelatedTo,
            Self::DependsOn,
            Self::Requires,
            Self::Addresses,
            Self::UsedIn,
            Self::AlternativeTo,
            Self::Previous,
            Self::Mentions,
        ]
    }

    /// Returns the relationship type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Solves => "solves",
            Self::Causes => "causes",
            Self::Triggers => "triggers",
            Self::RelatedTo => "related_to",
            Self::DependsOn => "depends_on",
            Self::Requires => "requires",
            Self::Addresses => "addresses",
            Self::UsedIn => "used_in",
            Self::AlternativeTo => "alternative_to",
            Self::Previous => "previous",
            Self::Mentions => "mentions",
        }
    }

    /// Returns the uppercase form used by Cypher-speaking engines.
    #[must_use]
    pub const fn as_cypher(&self) -> &'static str {
        match self {
            Self::Solves => "SOLVES",
            Self::Causes => "CAUSES",
            Self::Triggers => "TRIGGERS",
            Self::RelatedTo => "RELATED_TO",
            Self::DependsOn => "DEPENDS_ON",
            Self::Requires => "REQUIRES",
            Self::Addresses => "ADDRESSES",
            Self::UsedIn => "USED_IN",
            Self::AlternativeTo => "ALTERNATIVE_TO",
            Self::Previous => "PREVIOUS",
            Self::Mentions => "MENTIONS",
        }
    }

    /// Returns true for types reserved by versioning and entity linking.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Previous | Self::Mentions)
    }

    /// Parses a relationship type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "solves" => Some(Self::Solves),
            "causes" => Some(Self::Causes),
            "triggers" => Some(Self::Triggers),
            "related_to" | "related" => Some(Self::RelatedTo),
            "depends_on" => Some(Self::DependsOn),
            "requires" => Some(Self::Requires),
            "addresses" => Some(Self::Addresses),
            "used_in" => Some(Self::UsedIn),
            "alternative_to" | "alternative" => Some(Self::AlternativeTo),
            "previous" => Some(Self::Previous),
            "mentions" => Some(Self::Mentions),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::Validation(format!("unknown relationship type: {s}")))
    }
}

fn default_strength() -> f32 {
    0.5
}

fn default_confidence() -> f32 {
    0.8
}

/// Weighted properties carried by an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProperties {
    /// Strength of the relationship in `[0, 1]`.
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Confidence in the relationship in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Free-text context for the relationship.
    #[serde(default)]
    pub context: Option<String>,
}

impl Default for RelationshipProperties {
    fn default() -> Self {
        Self {
            strength: default_strength(),
            confidence: default_confidence(),
            context: None,
        }
    }
}

impl RelationshipProperties {
    /// Validates the property bounds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] if strength or confidence is
    /// outside `[0, 1]`.
    pub fn validate(&self) -> crate::Result<()> {
        for (field, v) in [("strength", self.strength), ("confidence", self.confidence)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(crate::Error::Validation(format!(
                    "relationship {field} must be within [0, 1], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// A directed, typed, weighted edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source node id.
    pub from_memory_id: MemoryId,
    /// Target node id.
    pub to_memory_id: MemoryId,
    /// Type of relationship.
    pub relationship_type: RelationshipType,
    /// Weighted properties.
    #[serde(default)]
    pub properties: RelationshipProperties,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Creates a new relationship with default properties.
    #[must_use]
    pub fn new(
        from: impl Into<MemoryId>,
        to: impl Into<MemoryId>,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            from_memory_id: from.into(),
            to_memory_id: to.into(),
            relationship_type,
            properties: RelationshipProperties::default(),
            created_at: crate::now(),
        }
    }

    /// Sets the strength.
    #[must_use]
    pub const fn with_strength(mut self, strength: f32) -> Self {
        self.properties.strength = strength;
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.properties.confidence = confidence;
        self
    }

    /// Sets the free-text context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.properties.context = Some(context.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_round_trip() {
        for rt in RelationshipType::all() {
            assert_eq!(RelationshipType::parse(rt.as_str()), Some(*rt));
        }
    }

    #[test]
    fn test_relationship_type_parse_variants() {
        assert_eq!(
            RelationshipType::parse("DEPENDS_ON"),
            Some(RelationshipType::DependsOn)
        );
        assert_eq!(
            RelationshipType::parse("related-to"),
            Some(RelationshipType::RelatedTo)
        );
        assert_eq!(RelationshipType::parse("bogus"), None);
    }

    #[test]
    fn test_reserved_types() {
        assert!(RelationshipType::Previous.is_reserved());
        assert!(RelationshipType::Mentions.is_reserved());
        assert!(!RelationshipType::Solves.is_reserved());
    }

    #[test]
    fn test_relationship_defaults() {
        let rel = Relationship::new("a", "b", RelationshipType::Solves);
        assert_eq!(rel.properties.strength, 0.5);
        assert_eq!(rel.properties.confidence, 0.8);
        assert!(rel.properties.context.is_none());
    }

    #[test]
    fn test_properties_validation() {
        let rel = Relationship::new("a", "b", RelationshipType::Causes).with_strength(1.2);
        assert!(rel.properties.validate().is_err());

        let rel = Relationship::new("a", "b", RelationshipType::Causes).with_strength(0.95);
        assert!(rel.properties.validate().is_ok());
    }
}
