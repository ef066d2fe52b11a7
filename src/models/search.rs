//! Search query and result types.

use crate::models::{Memory, MemoryType, RelationshipType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Matching strictness for text search.
///
/// The result-count ordering `Fuzzy ⊇ Normal ⊇ Strict` holds for any query:
/// each tier matches everything the tier below it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTolerance {
    /// Case-insensitive exact substring match only.
    Strict,
    /// Substring match plus lightweight morphology (plurals, verb tenses).
    #[default]
    Normal,
    /// Normal plus trigram-based typo tolerance (best-effort).
    Fuzzy,
}

impl SearchTolerance {
    /// Returns the tolerance as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Fuzzy => "fuzzy",
        }
    }

    /// Parses a tolerance from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "normal" => Some(Self::Normal),
            "fuzzy" => Some(Self::Fuzzy),
            _ => None,
        }
    }

    /// Resolves an optional string: absent means [`Self::Normal`], an unknown
    /// value is a validation error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unrecognized tolerance name.
    pub fn from_optional(s: Option<&str>) -> Result<Self> {
        s.map_or(Ok(Self::Normal), |v| {
            Self::parse(v).ok_or_else(|| Error::Validation(format!("invalid search_tolerance: {v}")))
        })
    }
}

/// How term matches combine across a term list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Logical OR: any matching term qualifies the memory.
    #[default]
    Any,
    /// Logical AND: every term must match.
    All,
}

impl MatchMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// A search request against the memory graph.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Free-text query, tokenized into terms when `terms` is empty.
    pub query: Option<String>,
    /// Explicit term list; takes precedence over `query` when non-empty.
    pub terms: Vec<String>,
    /// Term combination mode.
    pub match_mode: MatchMode,
    /// Matching strictness.
    pub tolerance: SearchTolerance,
    /// Restrict to these memory types (empty = all).
    pub memory_types: Vec<MemoryType>,
    /// Restrict to memories carrying all of these tags.
    pub tags: Vec<String>,
    /// Minimum importance threshold.
    pub min_importance: Option<f32>,
    /// Only memories created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only memories created at or before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Restrict to memories participating in at least one relationship of
    /// these types (empty = no restriction).
    pub relationship_filter: Vec<RelationshipType>,
    /// Attach a 1-hop relationship summary to each hit.
    pub include_relationships: bool,
    /// Maximum number of hits to return.
    pub limit: Option<usize>,
    /// Number of hits to skip, applied after scoring.
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: None,
            terms: Vec::new(),
            match_mode: MatchMode::default(),
            tolerance: SearchTolerance::default(),
            memory_types: Vec::new(),
            tags: Vec::new(),
            min_importance: None,
            created_after: None,
            created_before: None,
            relationship_filter: Vec::new(),
            include_relationships: true,
            limit: None,
            offset: 0,
        }
    }
}

impl SearchQuery {
    /// Creates an empty query that matches all memories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the free-text query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the explicit term list.
    #[must_use]
    pub fn with_terms<I, T>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.terms = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the match mode.
    #[must_use]
    pub const fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Sets the tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: SearchTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Adds a memory type restriction.
    #[must_use]
    pub fn with_memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_types.push(memory_type);
        self
    }

    /// Adds a required tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the minimum importance.
    #[must_use]
    pub const fn with_min_importance(mut self, min: f32) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Adds a relationship participation restriction.
    #[must_use]
    pub fn with_relationship_filter(mut self, relationship_type: RelationshipType) -> Self {
        self.relationship_filter.push(relationship_type);
        self
    }

    /// Disables relationship enrichment.
    #[must_use]
    pub const fn without_relationships(mut self) -> Self {
        self.include_relationships = false;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page offset.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Resolves the effective term list: explicit `terms` win when non-empty,
    /// otherwise the free-text `query` is tokenized on whitespace. Terms are
    /// lowercased; an empty result means no text restriction.
    #[must_use]
    pub fn effective_terms(&self) -> Vec<String> {
        let raw: Vec<String> = if self.terms.is_empty() {
            self.query
                .as_deref()
                .unwrap_or("")
                .split_whitespace()
                .map(str::to_string)
                .collect()
        } else {
            self.terms.clone()
        };
        raw.into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// The field a term matched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    /// The memory title.
    Title,
    /// The memory content.
    Content,
    /// The memory summary.
    Summary,
    /// The memory tag list.
    Tags,
}

impl MatchField {
    /// Returns the field name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Summary => "summary",
            Self::Tags => "tags",
        }
    }
}

/// Machine-checkable record of what matched, part of the result contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    /// Fields that contained at least one term match, deduplicated and ordered.
    pub fields: Vec<MatchField>,
    /// The literal terms that matched.
    pub terms: Vec<String>,
}

/// A reference to a related memory inside a relationship summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRef {
    /// The related memory id.
    pub id: String,
    /// The related memory title.
    pub title: String,
}

/// Compact 1-hop relationship summary attached to a search hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    /// Lowercased relationship-type name to related memories.
    pub related: BTreeMap<String, Vec<RelatedRef>>,
    /// Short natural-language context sentence (< 100 characters).
    pub context: Option<String>,
}

impl RelationshipSummary {
    /// Returns true if no relationships were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.related.is_empty()
    }
}

/// A single search hit with score and match provenance.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched memory.
    pub memory: Memory,
    /// Relevance score; higher sorts earlier.
    pub score: f32,
    /// Which fields and terms matched.
    pub match_info: MatchInfo,
    /// 1-hop relationship summary, present when enrichment is enabled and
    /// the backend call succeeded.
    pub relationships: Option<RelationshipSummary>,
}

/// One page of search results plus pagination metadata.
#[derive(Debug, Clone)]
pub struct PaginatedResult {
    /// The hits for this page.
    pub hits: Vec<SearchHit>,
    /// Total matches before pagination.
    pub total_count: usize,
    /// Whether further pages exist.
    pub has_more: bool,
    /// Offset of the next page, when `has_more`.
    pub next_offset: Option<usize>,
}
