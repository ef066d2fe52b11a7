//! Memory node types and identifiers.
//!
//! A [`Memory`] is one stored unit of knowledge: the node type of the property
//! graph. Invariants enforced by [`Memory::validate`]:
//!
//! - `title` and `content` are non-empty
//! - `importance`, `confidence`, and `effectiveness` lie in `[0, 1]`
//! - `tags` are lowercase, trimmed, non-empty, and free of duplicates
//! - `version` is at least 1

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a memory node.
///
/// Entity nodes share the same id space; an edge endpoint is any node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a memory ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique memory ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("mem_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the ID is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Enumerated category of a memory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A working solution to a problem.
    Solution,
    /// A problem statement or symptom.
    Problem,
    /// An observed error or failure.
    Error,
    /// A fix applied for an error.
    Fix,
    /// A reusable code pattern.
    CodePattern,
    /// A recorded decision and its rationale.
    Decision,
    /// A unit of work.
    Task,
    /// A project-level memory.
    Project,
    /// Anything that fits no other category.
    General,
}

impl MemoryType {
    /// Returns all memory type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Solution,
            Self::Problem,
            Self::Error,
            Self::Fix,
            Self::CodePattern,
            Self::Decision,
            Self::Task,
            Self::Project,
            Self::General,
        ]
    }

    /// Returns the memory type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Solution => "solution",
            Self::Problem => "problem",
            Self::Error => "error",
            Self::Fix => "fix",
            Self::CodePattern => "code_pattern",
            Self::Decision => "decision",
            Self::Task => "task",
            Self::Project => "project",
            Self::General => "general",
        }
    }

    /// Parses a memory type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "solution" => Some(Self::Solution),
            "problem" => Some(Self::Problem),
            "error" => Some(Self::Error),
            "fix" => Some(Self::Fix),
            "code_pattern" | "pattern" => Some(Self::CodePattern),
            "decision" => Some(Self::Decision),
            "task" => Some(Self::Task),
            "project" => Some(Self::Project),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::Validation(format!("unknown memory type: {s}")))
    }
}

/// Structured context attached to a memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryContext {
    /// Project path or identifier the memory belongs to.
    pub project: Option<String>,
    /// Files involved.
    pub files: Vec<String>,
    /// Programming languages involved.
    pub languages: Vec<String>,
    /// Frameworks involved.
    pub frameworks: Vec<String>,
    /// Tenant scope, passed through as an ordinary filter.
    pub tenant: Option<String>,
    /// Team scope.
    pub team: Option<String>,
    /// Visibility marker (e.g. "private", "team").
    pub visibility: Option<String>,
    /// Actor that created the memory.
    pub created_by: Option<String>,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}

/// Normalizes a tag list: lowercase, trimmed, empties dropped, duplicates
/// removed while preserving first-seen order.
#[must_use]
pub fn normalize_tags<I, T>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let normalized = tag.as_ref().trim().to_lowercase();
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f32 {
    0.8
}

fn default_importance() -> f32 {
    0.5
}

fn default_version() -> u32 {
    1
}

/// A memory node in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// Enumerated category.
    pub memory_type: MemoryType,
    /// Short human-readable title. Must be non-empty.
    pub title: String,
    /// Full content. Must be non-empty.
    pub content: String,
    /// Optional condensed summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Normalized lowercase tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`.
    #[serde(default = "default_importance")]
    pub importance: f32,
    /// Confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Optional effectiveness in `[0, 1]`.
    #[serde(default)]
    pub effectiveness: Option<f32>,
    /// Number of times the memory has been used.
    #[serde(default)]
    pub usage_count: u32,
    /// Structured context.
    #[serde(default)]
    pub context: MemoryContext,
    /// Version number, starting at 1.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Whether this is the current version in its lineage.
    #[serde(default = "default_true")]
    pub is_current: bool,
    /// Successor id once superseded by a newer version.
    #[serde(default)]
    pub superseded_by: Option<MemoryId>,
    /// Actor that last mutated the memory.
    #[serde(default)]
    pub updated_by: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Creates a new memory with a generated id and default scores.
    #[must_use]
    pub fn new(
        memory_type: MemoryType,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = crate::now();
        Self {
            id: MemoryId::generate(),
            memory_type,
            title: title.into(),
            content: content.into(),
            summary: None,
            tags: Vec::new(),
            importance: default_importance(),
            confidence: default_confidence(),
            effectiveness: None,
            usage_count: 0,
            context: MemoryContext::default(),
            version: 1,
            is_current: true,
            superseded_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the generated id with a specific one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<MemoryId>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the tags, normalizing them.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// Sets the importance. Out-of-range values are rejected by [`Self::validate`].
    #[must_use]
    pub const fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the effectiveness.
    #[must_use]
    pub const fn with_effectiveness(mut self, effectiveness: f32) -> Self {
        self.effectiveness = Some(effectiveness);
        self
    }

    /// Sets the context.
    #[must_use]
    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = context;
        self
    }

    /// Returns a copy with tags normalized and a generated id if blank.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.id.is_blank() {
            self.id = MemoryId::generate();
        }
        self.tags = normalize_tags(&self.tags);
        self
    }

    /// Validates the memory invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty title or content, any score
    /// outside `[0, 1]`, or a version below 1.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("memory title must not be empty".into()));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Validation("memory content must not be empty".into()));
        }
        for (field, value) in [
            ("importance", Some(self.importance)),
            ("confidence", Some(self.confidence)),
            ("effectiveness", self.effectiveness),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::Validation(format!(
                        "{field} must be within [0, 1], got {v}"
                    )));
                }
            }
        }
        if self.version < 1 {
            return Err(Error::Validation(format!(
                "version must be at least 1, got {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Refreshes `updated_at` and stamps the acting user.
    pub fn touch(&mut self, updated_by: Option<String>) {
        self.updated_at = crate::now();
        if updated_by.is_some() {
            self.updated_by = updated_by;
        }
    }

    /// Applies a patch, returning whether any field changed.
    pub fn apply_patch(&mut self, patch: &MemoryPatch) -> bool {
        let mut changed = false;
        if let Some(ref title) = patch.title {
            self.title = title.clone();
            changed = true;
        }
        if let Some(ref content) = patch.content {
            self.content = content.clone();
            changed = true;
        }
        if let Some(ref summary) = patch.summary {
            self.summary = Some(summary.clone());
            changed = true;
        }
        if let Some(memory_type) = patch.memory_type {
            self.memory_type = memory_type;
            changed = true;
        }
        if let Some(ref tags) = patch.tags {
            self.tags = normalize_tags(tags);
            changed = true;
        }
        if let Some(importance) = patch.importance {
            self.importance = importance;
            changed = true;
        }
        if let Some(confidence) = patch.confidence {
            self.confidence = confidence;
            changed = true;
        }
        if let Some(effectiveness) = patch.effectiveness {
            self.effectiveness = Some(effectiveness);
            changed = true;
        }
        if let Some(ref context) = patch.context {
            self.context = context.clone();
            changed = true;
        }
        changed
    }
}

/// Partial update for a memory, used by `update_memory` and version creation.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    /// New title.
    pub title: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New summary.
    pub summary: Option<String>,
    /// New memory type.
    pub memory_type: Option<MemoryType>,
    /// Replacement tag list (normalized on apply).
    pub tags: Option<Vec<String>>,
    /// New importance.
    pub importance: Option<f32>,
    /// New confidence.
    pub confidence: Option<f32>,
    /// New effectiveness.
    pub effectiveness: Option<f32>,
    /// Replacement context.
    pub context: Option<MemoryContext>,
    /// Actor performing the mutation.
    pub updated_by: Option<String>,
}

impl MemoryPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.tags = Some(tags.into_iter().map(|t| t.as_ref().to_string()).collect());
        self
    }

    /// Sets the importance.
    #[must_use]
    pub const fn importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Sets the acting user.
    #[must_use]
    pub fn updated_by(mut self, actor: impl Into<String>) -> Self {
        self.updated_by = Some(actor.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_generate_is_unique() {
        let a = MemoryId::generate();
        let b = MemoryId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("mem_"));
    }

    #[test]
    fn test_memory_type_parse() {
        assert_eq!(MemoryType::parse("solution"), Some(MemoryType::Solution));
        assert_eq!(MemoryType::parse("SOLUTION"), Some(MemoryType::Solution));
        assert_eq!(
            MemoryType::parse("code-pattern"),
            Some(MemoryType::CodePattern)
        );
        assert_eq!(MemoryType::parse("unknown"), None);
    }

    #[test]
    fn test_memory_type_round_trip() {
        for mt in MemoryType::all() {
            assert_eq!(MemoryType::parse(mt.as_str()), Some(*mt));
        }
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["Redis", "  performance ", "", "redis", "  "]);
        assert_eq!(tags, vec!["redis", "performance"]);
    }

    #[test]
    fn test_memory_defaults() {
        let m = Memory::new(MemoryType::General, "t", "c");
        assert_eq!(m.importance, 0.5);
        assert_eq!(m.confidence, 0.8);
        assert_eq!(m.version, 1);
        assert!(m.is_current);
        assert_eq!(m.usage_count, 0);
    }

    #[test]
    fn test_validate_rejects_empty_title() {
        let m = Memory::new(MemoryType::General, "  ", "content");
        assert!(matches!(m.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_scores() {
        let m = Memory::new(MemoryType::General, "t", "c").with_importance(1.5);
        assert!(m.validate().is_err());

        let m = Memory::new(MemoryType::General, "t", "c").with_confidence(-0.1);
        assert!(m.validate().is_err());

        let m = Memory::new(MemoryType::General, "t", "c").with_effectiveness(2.0);
        assert!(m.validate().is_err());

        let m = Memory::new(MemoryType::General, "t", "c")
            .with_importance(0.9)
            .with_effectiveness(1.0);
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_apply_patch_reports_changes() {
        let mut m = Memory::new(MemoryType::Problem, "old", "body");
        assert!(!m.apply_patch(&MemoryPatch::new()));
        assert!(m.apply_patch(&MemoryPatch::new().title("new")));
        assert_eq!(m.title, "new");
    }

    #[test]
    fn test_serde_round_trip() {
        let m = Memory::new(MemoryType::Solution, "title", "content")
            .with_tags(["A", "b"])
            .with_summary("s");
        let json = serde_json::to_string(&m).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
