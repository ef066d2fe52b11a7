//! Relationship traversal engine.
//!
//! Everything here is built on one backend primitive:
//! [`GraphStore::neighbors`] — immediate neighbors of a node filtered by edge
//! type and direction. Termination is guaranteed by visited-set (or
//! current-path) tracking, never by recursion depth or wall-clock timeouts.
//!
//! Failure semantics: validation errors (blank ids) precede any backend
//! call; a backend failure mid-walk is logged and degrades to the results
//! accumulated so far, so partial graph data never corrupts what was already
//! collected.

use crate::models::{
    DEPENDENCY_TYPES, Memory, MemoryId, Relationship, RelationshipType, SearchHit, SearchQuery,
};
use crate::services::search;
use crate::storage::traits::{Direction, GraphStore, ScanFilter};
use crate::{Error, Result};
use std::collections::{HashSet, VecDeque};

/// One hop in a discovered chain.
#[derive(Debug, Clone)]
pub struct ChainLink {
    /// The memory reached at this hop.
    pub memory: Memory,
    /// The edge that reached it.
    pub relationship: Relationship,
    /// Hop count from the start node (1 = immediate neighbor).
    pub depth: u32,
}

/// A memory reachable through dependency edges.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// The dependency.
    pub memory: Memory,
    /// Hop count from the start node.
    pub depth: u32,
}

/// Result of a dependency trace.
#[derive(Debug, Clone, Default)]
pub struct DependencyTrace {
    /// Reachable dependencies, deduplicated.
    pub nodes: Vec<DependencyNode>,
    /// Circular dependency paths discovered during the walk. Each path starts
    /// and ends at the repeated node.
    pub cycles: Vec<Vec<MemoryId>>,
}

impl DependencyTrace {
    /// Returns true when at least one cycle was found.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// A candidate from similar-problem matching.
#[derive(Debug, Clone)]
pub struct SimilarMatch {
    /// The similar memory.
    pub memory: Memory,
    /// Matched-keyword fraction in `[0, 1]`.
    pub similarity: f32,
    /// The keywords that matched.
    pub matched_keywords: Vec<String>,
    /// Solving/related neighbors of the candidate.
    pub related: Vec<(Memory, Relationship)>,
}

/// A memory related to a start node within a bounded number of hops.
#[derive(Debug, Clone)]
pub struct RelatedMemory {
    /// The related memory.
    pub memory: Memory,
    /// The edge that first reached it.
    pub relationship: Relationship,
    /// Hop count from the start node.
    pub depth: u32,
}

fn validate_id(id: &MemoryId) -> Result<()> {
    if id.is_blank() {
        return Err(Error::Validation("memory id must not be empty".to_string()));
    }
    Ok(())
}

async fn require_memory<S: GraphStore>(store: &S, id: &MemoryId) -> Result<Memory> {
    validate_id(id)?;
    store
        .fetch_memory(id)
        .await?
        .ok_or_else(|| Error::memory_not_found(id))
}

/// Discovers the chain reachable from `start` along one relationship type.
///
/// Breadth-first up to `max_depth` hops, stopping early when a hop yields no
/// new neighbors. A node already visited is truncated there rather than
/// followed again, so cyclic graphs terminate.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a blank id and [`Error::NotFound`] when
/// the start node does not exist. Backend failures mid-walk degrade to the
/// links accumulated so far.
pub async fn find_chain<S: GraphStore>(
    store: &S,
    start: &MemoryId,
    relationship_type: RelationshipType,
    max_depth: u32,
) -> Result<Vec<ChainLink>> {
    require_memory(store, start).await?;

    let types = [relationship_type];
    let mut links = Vec::new();
    let mut visited: HashSet<MemoryId> = HashSet::from([start.clone()]);
    let mut frontier = vec![start.clone()];

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        for node in &frontier {
            let neighbors = match store
                .neighbors(node, Some(&types), Direction::Outgoing)
                .await
            {
                Ok(neighbors) => neighbors,
                Err(e) => {
                    tracing::warn!(start = %start, error = %e, "chain traversal degraded");
                    return Ok(links);
                },
            };
            for (memory, relationship) in neighbors {
                if visited.insert(memory.id.clone()) {
                    next.push(memory.id.clone());
                    links.push(ChainLink {
                        memory,
                        relationship,
                        depth,
                    });
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }
    Ok(links)
}

/// Traces dependency edges (`DEPENDS_ON`, `REQUIRES`) to full reachable
/// depth, reporting circular dependencies instead of re-expanding them.
///
/// Cycle detection uses the current path, not a global visited set, so a node
/// reachable via two different paths is still expanded from both — only a
/// true cycle stops a branch.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a blank id and [`Error::NotFound`] when
/// the start node does not exist. Backend failures mid-walk degrade to the
/// trace accumulated so far.
pub async fn trace_dependencies<S: GraphStore>(
    store: &S,
    start: &MemoryId,
) -> Result<DependencyTrace> {
    require_memory(store, start).await?;

    let mut trace = DependencyTrace::default();
    let mut reported: HashSet<MemoryId> = HashSet::new();
    let mut stack: Vec<(MemoryId, u32, Vec<MemoryId>)> =
        vec![(start.clone(), 0, vec![start.clone()])];

    while let Some((node, depth, path)) = stack.pop() {
        let neighbors = match store
            .neighbors(&node, Some(DEPENDENCY_TYPES), Direction::Outgoing)
            .await
        {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(start = %start, error = %e, "dependency trace degraded");
                return Ok(trace);
            },
        };
        for (memory, _relationship) in neighbors {
            if let Some(position) = path.iter().position(|p| *p == memory.id) {
                let mut cycle: Vec<MemoryId> = path[position..].to_vec();
                cycle.push(memory.id.clone());
                trace.cycles.push(cycle);
                continue;
            }
            if reported.insert(memory.id.clone()) {
                trace.nodes.push(DependencyNode {
                    memory: memory.clone(),
                    depth: depth + 1,
                });
            }
            let mut next_path = path.clone();
            next_path.push(memory.id.clone());
            stack.push((memory.id.clone(), depth + 1, next_path));
        }
    }
    Ok(trace)
}

/// Finds memories of `target_type` whose text shares keywords with the given
/// free text.
///
/// Similarity is the matched-keyword fraction. Text with no extractable
/// keywords yields an empty result, not an error.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the threshold is outside `[0, 1]`.
/// Backend failures degrade to an empty result.
pub async fn find_similar<S: GraphStore>(
    store: &S,
    problem_text: &str,
    target_type: crate::models::MemoryType,
    threshold: f32,
    limit: usize,
) -> Result<Vec<SimilarMatch>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Validation(format!(
            "similarity threshold must be within [0, 1], got {threshold}"
        )));
    }
    let keywords = crate::services::text::keywords(problem_text);
    if keywords.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = match store
        .list_memories(&ScanFilter::new().with_memory_type(target_type))
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!(error = %e, "similar-problem scan failed");
            return Ok(Vec::new());
        },
    };

    #[allow(clippy::cast_precision_loss)]
    let total = keywords.len() as f32;
    let mut matches = Vec::new();
    for memory in candidates {
        let haystack = format!(
            "{} {} {} {}",
            memory.title,
            memory.content,
            memory.summary.as_deref().unwrap_or(""),
            memory.tags.join(" ")
        )
        .to_lowercase();
        let matched: Vec<String> = keywords
            .iter()
            .filter(|kw| haystack.contains(kw.as_str()))
            .cloned()
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let similarity = matched.len() as f32 / total;
        if similarity < threshold || matched.is_empty() {
            continue;
        }

        let related = store
            .neighbors(
                &memory.id,
                Some(&[RelationshipType::Solves, RelationshipType::RelatedTo]),
                Direction::Both,
            )
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(memory_id = %memory.id, error = %e, "related lookup degraded");
                Vec::new()
            });

        matches.push(SimilarMatch {
            memory,
            similarity,
            matched_keywords: matched,
            related,
        });
    }

    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.memory.id.as_str().cmp(b.memory.id.as_str()))
    });
    matches.truncate(limit);
    Ok(matches)
}

/// Search scoped to the neighborhood of a root node: the intersection of
/// "within `max_hops` of `root`" and "matches the text query".
///
/// The root itself is not part of its neighborhood.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a blank id and [`Error::NotFound`] when
/// the root does not exist. Backend failures mid-walk degrade to the nodes
/// gathered so far.
pub async fn contextual_search<S: GraphStore>(
    store: &S,
    root: &MemoryId,
    query_text: &str,
    max_hops: u32,
) -> Result<Vec<SearchHit>> {
    require_memory(store, root).await?;

    let mut visited: HashSet<MemoryId> = HashSet::from([root.clone()]);
    let mut neighborhood: Vec<Memory> = Vec::new();
    let mut queue: VecDeque<(MemoryId, u32)> = VecDeque::from([(root.clone(), 0)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_hops {
            continue;
        }
        let neighbors = match store.neighbors(&node, None, Direction::Both).await {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(root = %root, error = %e, "contextual search degraded");
                break;
            },
        };
        for (memory, _relationship) in neighbors {
            if visited.insert(memory.id.clone()) {
                queue.push_back((memory.id.clone(), depth + 1));
                neighborhood.push(memory);
            }
        }
    }

    let search_query = SearchQuery::new().with_query(query_text);
    let terms = search_query.effective_terms();
    let term_count = terms.len();
    let mut hits: Vec<SearchHit> = neighborhood
        .into_iter()
        .filter_map(|memory| {
            search::match_memory(&memory, &terms, search_query.match_mode, search_query.tolerance)
                .map(|info| {
                    let score = search::score_hit(&memory, &info, term_count);
                    SearchHit {
                        memory,
                        score,
                        match_info: info,
                        relationships: None,
                    }
                })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.memory.id.as_str().cmp(b.memory.id.as_str()))
    });
    Ok(hits)
}

/// Collects memories related to a node within `max_depth` hops, in either
/// direction, optionally restricted by edge types.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a blank id and [`Error::NotFound`] when
/// the node does not exist. Backend failures mid-walk degrade to the results
/// accumulated so far.
pub async fn related_memories<S: GraphStore>(
    store: &S,
    id: &MemoryId,
    types: Option<&[RelationshipType]>,
    max_depth: u32,
) -> Result<Vec<RelatedMemory>> {
    require_memory(store, id).await?;

    let mut related = Vec::new();
    let mut visited: HashSet<MemoryId> = HashSet::from([id.clone()]);
    let mut queue: VecDeque<(MemoryId, u32)> = VecDeque::from([(id.clone(), 0)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let neighbors = match store.neighbors(&node, types, Direction::Both).await {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(memory_id = %id, error = %e, "related traversal degraded");
                break;
            },
        };
        for (memory, relationship) in neighbors {
            if visited.insert(memory.id.clone()) {
                queue.push_back((memory.id.clone(), depth + 1));
                related.push(RelatedMemory {
                    memory,
                    relationship,
                    depth: depth + 1,
                });
            }
        }
    }
    Ok(related)
}
