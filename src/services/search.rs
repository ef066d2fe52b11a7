//! Search and ranking engine.
//!
//! Executes a [`SearchQuery`] as a broad candidate fetch from the active
//! backend followed by an in-process matching/scoring pass. One matcher owns
//! the tolerance semantics for every backend, which is what makes the
//! result-count guarantee (fuzzy ⊇ normal ⊇ strict) provable.
//!
//! Filtering order: text/term matching, relationship filter, memory types,
//! tags, minimum importance, creation window, then pagination over the fully
//! scored set so ranking stays consistent across pages.

use crate::models::{
    MatchField, MatchInfo, MatchMode, Memory, MemoryId, RelatedRef, RelationshipSummary,
    SearchHit, SearchQuery, SearchTolerance, normalize_tags,
};
use crate::services::text;
use crate::storage::traits::{Direction, GraphStore, ScanFilter};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Field weights: title outranks everything else at equal importance.
const TITLE_WEIGHT: f32 = 3.0;
const TAGS_WEIGHT: f32 = 1.5;
const SUMMARY_WEIGHT: f32 = 1.2;
const CONTENT_WEIGHT: f32 = 1.0;

/// Maximum length of the synthesized context sentence.
const CONTEXT_SENTENCE_MAX: usize = 100;

/// Search output before pagination metadata is attached.
#[derive(Debug)]
pub struct SearchOutcome {
    /// The requested page of hits, ranked.
    pub hits: Vec<SearchHit>,
    /// Total matches before pagination.
    pub total_count: usize,
}

fn field_text(memory: &Memory, field: MatchField) -> String {
    match field {
        MatchField::Title => memory.title.to_lowercase(),
        MatchField::Content => memory.content.to_lowercase(),
        MatchField::Summary => memory.summary.as_deref().unwrap_or("").to_lowercase(),
        MatchField::Tags => memory.tags.join(" "),
    }
}

fn term_matches_field(term: &str, haystack: &str, tolerance: SearchTolerance) -> bool {
    match tolerance {
        SearchTolerance::Strict => haystack.contains(term),
        SearchTolerance::Normal => text::normal_match(term, haystack),
        SearchTolerance::Fuzzy => {
            text::normal_match(term, haystack)
                || text::fuzzy_token_match(term, &text::tokenize(haystack))
        },
    }
}

/// Matches one memory against the term list.
///
/// Returns the match info when the memory qualifies under the given mode, or
/// `None` when it does not. An empty term list matches everything with empty
/// match info.
#[must_use]
pub fn match_memory(
    memory: &Memory,
    terms: &[String],
    mode: MatchMode,
    tolerance: SearchTolerance,
) -> Option<MatchInfo> {
    if terms.is_empty() {
        return Some(MatchInfo::default());
    }

    let fields = [
        MatchField::Title,
        MatchField::Content,
        MatchField::Summary,
        MatchField::Tags,
    ];
    let haystacks: Vec<(MatchField, String)> = fields
        .iter()
        .map(|&f| (f, field_text(memory, f)))
        .collect();

    let mut matched_fields = Vec::new();
    let mut matched_terms = Vec::new();

    for term in terms {
        let mut term_matched = false;
        for (field, haystack) in &haystacks {
            if term_matches_field(term, haystack, tolerance) {
                term_matched = true;
                if !matched_fields.contains(field) {
                    matched_fields.push(*field);
                }
            }
        }
        if term_matched {
            matched_terms.push(term.clone());
        } else if mode == MatchMode::All {
            return None;
        }
    }

    if matched_terms.is_empty() {
        return None;
    }
    matched_fields.sort();
    Some(MatchInfo {
        fields: matched_fields,
        terms: matched_terms,
    })
}

/// Scores a matched memory.
///
/// The sum of matched-field weights is blended with importance; a memory with
/// no text restriction scores by importance alone.
#[must_use]
pub fn score_hit(memory: &Memory, info: &MatchInfo, term_count: usize) -> f32 {
    if term_count == 0 {
        return memory.importance;
    }
    let field_score: f32 = info
        .fields
        .iter()
        .map(|f| match f {
            MatchField::Title => TITLE_WEIGHT,
            MatchField::Tags => TAGS_WEIGHT,
            MatchField::Summary => SUMMARY_WEIGHT,
            MatchField::Content => CONTENT_WEIGHT,
        })
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let coverage = info.terms.len() as f32 / term_count as f32;
    (field_score + coverage) * (0.5 + memory.importance / 2.0)
}

fn validate(query: &SearchQuery) -> Result<()> {
    if let Some(min) = query.min_importance {
        if !(0.0..=1.0).contains(&min) {
            return Err(Error::Validation(format!(
                "min_importance must be within [0, 1], got {min}"
            )));
        }
    }
    if let (Some(after), Some(before)) = (query.created_after, query.created_before) {
        if after > before {
            return Err(Error::Validation(
                "created_after must not be later than created_before".to_string(),
            ));
        }
    }
    Ok(())
}

/// Executes a search against the store.
///
/// # Errors
///
/// Returns [`Error::Validation`] for malformed inputs before any backend
/// call, and propagates backend errors from the primary candidate fetch and
/// the relationship filter. Enrichment failures degrade to hits without
/// relationship summaries.
pub async fn execute<S: GraphStore>(store: &S, query: &SearchQuery) -> Result<SearchOutcome> {
    validate(query)?;
    let terms = query.effective_terms();

    // Text/term matching comes first; remaining filters narrow the matched set.
    let candidates = store.list_memories(&ScanFilter::new()).await?;
    let mut matched: Vec<(Memory, MatchInfo)> = candidates
        .into_iter()
        .filter_map(|memory| {
            match_memory(&memory, &terms, query.match_mode, query.tolerance)
                .map(|info| (memory, info))
        })
        .collect();

    if !query.relationship_filter.is_empty() {
        let mut kept = Vec::with_capacity(matched.len());
        for (memory, info) in matched {
            let relationships = store
                .relationships_for(&memory.id, Direction::Both)
                .await?;
            if relationships
                .iter()
                .any(|r| query.relationship_filter.contains(&r.relationship_type))
            {
                kept.push((memory, info));
            }
        }
        matched = kept;
    }

    if !query.memory_types.is_empty() {
        matched.retain(|(m, _)| query.memory_types.contains(&m.memory_type));
    }

    if !query.tags.is_empty() {
        let required = normalize_tags(&query.tags);
        matched.retain(|(m, _)| required.iter().all(|t| m.tags.contains(t)));
    }

    if let Some(min) = query.min_importance {
        matched.retain(|(m, _)| m.importance >= min);
    }
    if let Some(after) = query.created_after {
        matched.retain(|(m, _)| m.created_at >= after);
    }
    if let Some(before) = query.created_before {
        matched.retain(|(m, _)| m.created_at <= before);
    }

    let term_count = terms.len();
    let mut scored: Vec<SearchHit> = matched
        .into_iter()
        .map(|(memory, info)| {
            let score = score_hit(&memory, &info, term_count);
            SearchHit {
                memory,
                score,
                match_info: info,
                relationships: None,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.memory.importance.total_cmp(&a.memory.importance))
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.as_str().cmp(b.memory.id.as_str()))
    });

    // Pagination is applied last, over the fully filtered and scored set.
    let total_count = scored.len();
    let mut page: Vec<SearchHit> = scored
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    if query.include_relationships {
        for hit in &mut page {
            hit.relationships = Some(enrich(store, &hit.memory.id).await);
        }
    }

    Ok(SearchOutcome {
        hits: page,
        total_count,
    })
}

/// Builds the 1-hop relationship summary for a memory.
///
/// Best-effort: a backend failure is logged and yields an empty summary
/// rather than failing the search.
pub async fn enrich<S: GraphStore>(store: &S, id: &MemoryId) -> RelationshipSummary {
    let pairs = match store.neighbors(id, None, Direction::Both).await {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::warn!(memory_id = %id, error = %e, "relationship enrichment failed");
            return RelationshipSummary::default();
        },
    };

    let mut related: BTreeMap<String, Vec<RelatedRef>> = BTreeMap::new();
    let mut solves = Vec::new();
    let mut used_in = Vec::new();
    for (neighbor, relationship) in &pairs {
        let entry = related
            .entry(relationship.relationship_type.as_str().to_string())
            .or_default();
        entry.push(RelatedRef {
            id: neighbor.id.to_string(),
            title: neighbor.title.clone(),
        });
        if relationship.from_memory_id == *id {
            match relationship.relationship_type {
                crate::models::RelationshipType::Solves => solves.push(neighbor.title.clone()),
                crate::models::RelationshipType::UsedIn => used_in.push(neighbor.title.clone()),
                _ => {},
            }
        }
    }

    let context = if related.is_empty() {
        None
    } else {
        Some(context_sentence(&solves, &used_in, pairs.len()))
    };
    RelationshipSummary { related, context }
}

fn context_sentence(solves: &[String], used_in: &[String], total: usize) -> String {
    let mut parts = Vec::new();
    if let Some(first) = solves.first() {
        parts.push(format!("Solves '{first}'"));
    }
    if let Some(first) = used_in.first() {
        parts.push(format!("used in '{first}'"));
    }
    if parts.is_empty() {
        parts.push(format!("Linked to {total} memories"));
    }
    let mut sentence = format!("{}.", parts.join("; "));
    if sentence.len() > CONTEXT_SENTENCE_MAX {
        let mut cut = CONTEXT_SENTENCE_MAX - 4;
        while !sentence.is_char_boundary(cut) {
            cut -= 1;
        }
        sentence.truncate(cut);
        sentence.push_str("...");
    }
    sentence
}
