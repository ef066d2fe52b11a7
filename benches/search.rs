//! Benchmarks for the search pipeline.
//!
//! Benchmark targets:
//! - 100 memories: <20ms
//! - 1,000 memories: <50ms
//!
//! Exercises candidate scan, tolerance matching, scoring, and pagination
//! against the embedded engine, with and without relationship enrichment.

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mnemograph::storage::InMemoryBackend;
use mnemograph::{
    Database, Memory, MemoryType, RelationshipType, SearchQuery, SearchTolerance,
};
use tokio::runtime::Runtime;

const CORPUS: &[&str] = &[
    "Connection pool exhausted under peak redis load",
    "Retry with exponential backoff on timeout",
    "Schema migration failed on startup",
    "Cache invalidation strategy for session data",
    "Deadlock between writer threads in the queue",
];

fn seeded_database(rt: &Runtime, size: usize) -> Database<InMemoryBackend> {
    rt.block_on(async {
        let db = Database::open(InMemoryBackend::new())
            .await
            .expect("open database");
        let mut previous: Option<Memory> = None;
        for i in 0..size {
            let body = CORPUS[i % CORPUS.len()];
            let memory = db
                .store_memory(
                    Memory::new(MemoryType::Solution, format!("memory {i}"), body)
                        .with_tags(["bench", "seed"]),
                )
                .await
                .expect("seed");
            if let Some(prev) = &previous {
                db.create_relationship(
                    &memory.id,
                    &prev.id,
                    RelationshipType::RelatedTo,
                    None,
                )
                .await
                .expect("relate");
            }
            previous = Some(memory);
        }
        db
    })
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("search");

    for size in [100usize, 1_000] {
        let db = seeded_database(&rt, size);

        group.bench_with_input(BenchmarkId::new("normal", size), &size, |b, _| {
            let query = SearchQuery::new()
                .with_query("redis timeout")
                .without_relationships()
                .with_limit(10);
            b.iter(|| {
                rt.block_on(async { db.search_memories(&query).await.expect("search") })
            });
        });

        group.bench_with_input(BenchmarkId::new("fuzzy", size), &size, |b, _| {
            let query = SearchQuery::new()
                .with_query("rediss timout")
                .with_tolerance(SearchTolerance::Fuzzy)
                .without_relationships()
                .with_limit(10);
            b.iter(|| {
                rt.block_on(async { db.search_memories(&query).await.expect("search") })
            });
        });

        group.bench_with_input(BenchmarkId::new("enriched", size), &size, |b, _| {
            let query = SearchQuery::new().with_query("redis").with_limit(10);
            b.iter(|| {
                rt.block_on(async { db.search_memories(&query).await.expect("search") })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
