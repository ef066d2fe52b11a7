//! Search engine integration tests against the relational adapter.
//!
//! Pins the tolerance ordering guarantee (fuzzy ⊇ normal ⊇ strict), match
//! mode semantics, term precedence, filter composition, pagination, and the
//! match-info/enrichment result contract.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use mnemograph::models::MatchField;
use mnemograph::storage::SqliteBackend;
use mnemograph::{
    Database, MatchMode, Memory, MemoryType, RelationshipType, SearchQuery, SearchTolerance,
};

async fn open_db() -> Database<SqliteBackend> {
    Database::open(SqliteBackend::in_memory())
        .await
        .expect("open database")
}

async fn seed(db: &Database<SqliteBackend>) -> Vec<Memory> {
    let mut stored = Vec::new();
    let fixtures = [
        (
            MemoryType::Solution,
            "Redis Connection Pool Fix",
            "Increased max connections from 10 to 50",
            vec!["redis", "performance"],
            0.9,
        ),
        (
            MemoryType::Problem,
            "Request timeouts under load",
            "Seeing frequent connection timeouts at peak",
            vec!["reliability"],
            0.7,
        ),
        (
            MemoryType::Decision,
            "Retry policy",
            "We keep retrying with exponential backoff",
            vec!["reliability"],
            0.6,
        ),
        (
            MemoryType::General,
            "Deployment notes",
            "Ship on Tuesdays",
            vec!["process"],
            0.3,
        ),
    ];
    for (memory_type, title, content, tags, importance) in fixtures {
        let memory = Memory::new(memory_type, title, content)
            .with_tags(tags)
            .with_importance(importance);
        stored.push(db.store_memory(memory).await.expect("seed"));
    }
    stored
}

#[tokio::test]
async fn test_redis_scenario() {
    let db = open_db().await;
    seed(&db).await;

    let hits = db
        .search_memories(&SearchQuery::new().with_query("redis"))
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.title, "Redis Connection Pool Fix");

    // Uppercase terms with match_mode=all must also find it
    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_terms(["REDIS", "CONNECTIONS"])
                .with_match_mode(MatchMode::All),
        )
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.title, "Redis Connection Pool Fix");
}

#[tokio::test]
async fn test_terms_take_precedence_over_query() {
    let db = open_db().await;
    seed(&db).await;

    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_query("redis")
                .with_terms(["timeouts"]),
        )
        .await
        .expect("search");
    assert!(hits
        .iter()
        .all(|h| h.memory.title != "Redis Connection Pool Fix"));
    assert!(hits
        .iter()
        .any(|h| h.memory.title == "Request timeouts under load"));
}

#[tokio::test]
async fn test_tolerance_result_counts_are_ordered() {
    let db = open_db().await;
    seed(&db).await;

    for term in ["timeout", "timeouts", "retry", "retrying", "timout", "conection"] {
        let mut counts = Vec::new();
        for tolerance in [
            SearchTolerance::Strict,
            SearchTolerance::Normal,
            SearchTolerance::Fuzzy,
        ] {
            let hits = db
                .search_memories(
                    &SearchQuery::new()
                        .with_terms([term])
                        .with_tolerance(tolerance)
                        .without_relationships(),
                )
                .await
                .expect("search");
            counts.push(hits.len());
        }
        assert!(
            counts[0] <= counts[1] && counts[1] <= counts[2],
            "tolerance ordering violated for '{term}': {counts:?}"
        );
    }
}

#[tokio::test]
async fn test_normal_tier_matches_morphological_variants() {
    let db = open_db().await;
    seed(&db).await;

    // "timeout" must match text containing "timeouts"
    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_terms(["timeout"])
                .with_tolerance(SearchTolerance::Normal),
        )
        .await
        .expect("search");
    assert!(hits
        .iter()
        .any(|h| h.memory.title == "Request timeouts under load"));

    // "retry" must match "retrying"
    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_terms(["retry"])
                .with_tolerance(SearchTolerance::Normal),
        )
        .await
        .expect("search");
    assert!(hits.iter().any(|h| h.memory.title == "Retry policy"));
}

#[tokio::test]
async fn test_match_mode_all_is_subset_of_any() {
    let db = open_db().await;
    seed(&db).await;

    let terms = ["connection", "timeouts"];
    let any_hits = db
        .search_memories(&SearchQuery::new().with_terms(terms).with_match_mode(MatchMode::Any))
        .await
        .expect("any");
    let all_hits = db
        .search_memories(&SearchQuery::new().with_terms(terms).with_match_mode(MatchMode::All))
        .await
        .expect("all");

    assert!(all_hits.len() <= any_hits.len());
    for hit in &all_hits {
        assert!(
            any_hits.iter().any(|h| h.memory.id == hit.memory.id),
            "all-mode hit missing from any-mode results"
        );
    }
}

#[tokio::test]
async fn test_impossible_all_terms_returns_empty_not_error() {
    let db = open_db().await;
    seed(&db).await;

    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_terms(["nonexistent", "impossible"])
                .with_match_mode(MatchMode::All),
        )
        .await
        .expect("search must not error");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_invalid_tolerance_string_is_validation_error() {
    let err = SearchTolerance::from_optional(Some("sloppy")).unwrap_err();
    assert!(matches!(err, mnemograph::Error::Validation(_)));
    assert_eq!(
        SearchTolerance::from_optional(None).unwrap(),
        SearchTolerance::Normal
    );
}

#[tokio::test]
async fn test_filters_compose() {
    let db = open_db().await;
    seed(&db).await;

    // type filter
    let hits = db
        .search_memories(
            &SearchQuery::new()
                .with_terms(["connection"])
                .with_memory_type(MemoryType::Solution),
        )
        .await
        .expect("search");
    assert!(hits.iter().all(|h| h.memory.memory_type == MemoryType::Solution));

    // tag filter
    let hits = db
        .search_memories(&SearchQuery::new().with_tag("reliability"))
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);

    // importance floor
    let hits = db
        .search_memories(&SearchQuery::new().with_min_importance(0.65))
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn test_relationship_filter() {
    let db = open_db().await;
    let stored = seed(&db).await;
    let solution = &stored[0];
    let problem = &stored[1];
    db.create_relationship(&solution.id, &problem.id, RelationshipType::Solves, None)
        .await
        .expect("relate");

    let hits = db
        .search_memories(
            &SearchQuery::new().with_relationship_filter(RelationshipType::Solves),
        )
        .await
        .expect("search");
    let titles: Vec<&str> = hits.iter().map(|h| h.memory.title.as_str()).collect();
    assert_eq!(hits.len(), 2, "both edge participants qualify: {titles:?}");
}

#[tokio::test]
async fn test_match_info_is_part_of_the_result_contract() {
    let db = open_db().await;
    seed(&db).await;

    let hits = db
        .search_memories(&SearchQuery::new().with_terms(["redis", "connections"]))
        .await
        .expect("search");
    let hit = &hits[0];
    assert!(hit.match_info.fields.contains(&MatchField::Title));
    assert!(hit.match_info.fields.contains(&MatchField::Tags));
    assert!(hit.match_info.terms.contains(&"redis".to_string()));
}

#[tokio::test]
async fn test_title_matches_rank_above_content_matches() {
    let db = open_db().await;
    db.store_memory(
        Memory::new(MemoryType::General, "Connection handling", "general notes")
            .with_importance(0.5),
    )
    .await
    .expect("store");
    db.store_memory(
        Memory::new(MemoryType::General, "Misc notes", "about connection handling")
            .with_importance(0.5),
    )
    .await
    .expect("store");

    let hits = db
        .search_memories(&SearchQuery::new().with_terms(["connection"]))
        .await
        .expect("search");
    assert_eq!(hits[0].memory.title, "Connection handling");
}

#[tokio::test]
async fn test_enrichment_summary_and_context_sentence() {
    let db = open_db().await;
    let stored = seed(&db).await;
    let solution = &stored[0];
    let problem = &stored[1];
    db.create_relationship(&solution.id, &problem.id, RelationshipType::Solves, None)
        .await
        .expect("relate");

    let hits = db
        .search_memories(&SearchQuery::new().with_terms(["redis"]))
        .await
        .expect("search");
    let summary = hits[0]
        .relationships
        .as_ref()
        .expect("enrichment requested by default");
    let solves = summary.related.get("solves").expect("solves bucket");
    assert_eq!(solves[0].id, problem.id.to_string());
    assert_eq!(solves[0].title, problem.title);
    let context = summary.context.as_ref().expect("context sentence");
    assert!(context.len() < 100);
    assert!(context.contains("Solves"));
}

#[tokio::test]
async fn test_enrichment_can_be_disabled() {
    let db = open_db().await;
    seed(&db).await;
    let hits = db
        .search_memories(&SearchQuery::new().with_terms(["redis"]).without_relationships())
        .await
        .expect("search");
    assert!(hits[0].relationships.is_none());
}

#[tokio::test]
async fn test_pagination_is_consistent_across_pages() {
    let db = open_db().await;
    for i in 0..7 {
        db.store_memory(
            Memory::new(MemoryType::General, format!("entry {i}"), "shared corpus text")
                .with_importance(0.1 + 0.1 * f32::from(u8::try_from(i).unwrap())),
        )
        .await
        .expect("store");
    }

    let query = SearchQuery::new().with_terms(["corpus"]).without_relationships();
    let page1 = db
        .search_memories_paginated(&query.clone().with_limit(3))
        .await
        .expect("page 1");
    assert_eq!(page1.total_count, 7);
    assert_eq!(page1.hits.len(), 3);
    assert!(page1.has_more);
    assert_eq!(page1.next_offset, Some(3));

    let page2 = db
        .search_memories_paginated(&query.clone().with_limit(3).with_offset(3))
        .await
        .expect("page 2");
    assert_eq!(page2.hits.len(), 3);
    assert_eq!(page2.next_offset, Some(6));

    let page3 = db
        .search_memories_paginated(&query.clone().with_limit(3).with_offset(6))
        .await
        .expect("page 3");
    assert_eq!(page3.hits.len(), 1);
    assert!(!page3.has_more);
    assert_eq!(page3.next_offset, None);

    // No id may appear on two pages
    let mut seen = std::collections::HashSet::new();
    for hit in page1.hits.iter().chain(&page2.hits).chain(&page3.hits) {
        assert!(seen.insert(hit.memory.id.clone()), "duplicate across pages");
    }
}

#[tokio::test]
async fn test_empty_query_matches_all_ordered_by_importance() {
    let db = open_db().await;
    seed(&db).await;

    let hits = db
        .search_memories(&SearchQuery::new().without_relationships())
        .await
        .expect("search");
    assert_eq!(hits.len(), 4);
    for window in hits.windows(2) {
        assert!(window[0].memory.importance >= window[1].memory.importance);
    }
}
