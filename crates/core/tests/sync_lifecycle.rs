//! Sync lifecycle integration tests.
//!
//! These tests verify the full cache-then-refresh cycle across several
//! sources: provisional emission, per-source fan-out, deduplication, and
//! degraded behavior when sources fail mid-cycle.

use std::sync::Arc;

use futures::StreamExt;

use medley_core::{
    cache::keys,
    library::LibraryQuery,
    testing::{fixtures, MockSourceClient, MockSourceProvider},
    LibraryStore, ResponseCache, SourceHandle, SourceRegistry, SqliteLibraryStore,
    SqliteResponseCache, SyncCoordinator,
};

/// Test helper wiring a coordinator to mock sources and in-memory stores.
struct TestHarness {
    coordinator: SyncCoordinator,
    mocks: Vec<Arc<MockSourceClient>>,
    library: Arc<SqliteLibraryStore>,
    cache: Arc<SqliteResponseCache>,
}

impl TestHarness {
    fn new(source_specs: &[(&str, bool)]) -> Self {
        let mut mocks = Vec::new();
        let mut handles = Vec::new();
        for (id, owned) in source_specs {
            let mock = Arc::new(MockSourceClient::new(*id));
            handles.push(SourceHandle {
                descriptor: fixtures::source_descriptor(id, *owned),
                client: mock.clone(),
            });
            mocks.push(mock);
        }

        let registry = Arc::new(SourceRegistry::new(Arc::new(
            MockSourceProvider::with_handles(handles),
        )));
        let cache = Arc::new(SqliteResponseCache::in_memory().expect("cache"));
        let library = Arc::new(SqliteLibraryStore::in_memory().expect("library"));

        let coordinator = SyncCoordinator::new(
            registry,
            cache.clone() as Arc<dyn ResponseCache>,
            library.clone() as Arc<dyn LibraryStore>,
        );

        Self {
            coordinator,
            mocks,
            library,
            cache,
        }
    }
}

#[tokio::test]
async fn full_cycle_emits_provisional_then_refreshed() {
    let h = TestHarness::new(&[("srv-a", true), ("srv-b", false)]);
    h.mocks[0].set_on_deck(vec![fixtures::movie_record("1", "Inception")]);
    h.mocks[1].set_on_deck(vec![fixtures::movie_record("9", "Tenet")]);

    let snapshots: Vec<_> = h.coordinator.observe_on_deck().collect().await;
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].provisional);
    assert!(!snapshots[1].provisional);
    assert_eq!(snapshots[1].value.len(), 2);
}

#[tokio::test]
async fn duplicate_title_across_sources_becomes_one_canonical_item() {
    let h = TestHarness::new(&[("srv-owned", true), ("srv-shared", false)]);

    let mut owned_copy = fixtures::movie_record_with_imdb("5921", "Inception", "tt1375666");
    owned_copy.updated_at = chrono::DateTime::from_timestamp(100, 0).unwrap();
    owned_copy.rating = Some(8.0);
    let mut shared_copy = fixtures::movie_record_with_imdb("77", "Inception", "tt1375666");
    shared_copy.updated_at = chrono::DateTime::from_timestamp(200, 0).unwrap();
    shared_copy.rating = Some(6.0);

    h.mocks[0].set_on_deck(vec![owned_copy]);
    h.mocks[1].set_on_deck(vec![shared_copy]);

    let snapshots: Vec<_> = h.coordinator.observe_on_deck().collect().await;
    let refreshed = &snapshots[1].value;

    assert_eq!(refreshed.len(), 1);
    let item = &refreshed[0];
    // Owned source wins the primary fields despite being older.
    assert_eq!(item.source_id, "srv-owned");
    assert_eq!(item.item_id, "5921");
    // Ratings averaged across the group; both physical copies kept.
    assert_eq!(item.rating, Some(7.0));
    assert_eq!(item.refs.len(), 2);
    let ref_sources: Vec<&str> = item.refs.iter().map(|r| r.source_id.as_str()).collect();
    assert!(ref_sources.contains(&"srv-owned"));
    assert!(ref_sources.contains(&"srv-shared"));
}

#[tokio::test]
async fn source_failing_mid_fanout_does_not_fail_the_collection() {
    let h = TestHarness::new(&[("srv-a", true), ("srv-b", false)]);
    h.mocks[0].set_on_deck(vec![fixtures::movie_record("1", "Inception")]);
    h.mocks[1].set_unreachable("mid-fanout outage");

    let snapshots: Vec<_> = h.coordinator.observe_on_deck().collect().await;
    let refreshed = &snapshots[1].value;
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].source_id, "srv-a");
}

#[tokio::test]
async fn unreachable_source_keeps_its_cached_contribution() {
    let h = TestHarness::new(&[("srv-a", true), ("srv-b", false)]);
    h.mocks[0].set_on_deck(vec![fixtures::movie_record("1", "Inception")]);
    h.mocks[1].set_on_deck(vec![fixtures::movie_record("9", "Tenet")]);

    // First cycle populates the cache for both sources.
    let _: Vec<_> = h.coordinator.observe_on_deck().collect().await;

    // srv-b goes dark; its cached records still appear in the next cycle.
    h.mocks[1].set_unreachable("gone");
    let snapshots: Vec<_> = h.coordinator.observe_on_deck().collect().await;
    let titles: Vec<&str> = snapshots[1].value.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"Inception"));
    assert!(titles.contains(&"Tenet"));
}

#[tokio::test]
async fn corrupt_cache_payload_is_a_miss_not_a_failure() {
    let h = TestHarness::new(&[("srv-a", true)]);
    h.mocks[0].set_on_deck(vec![fixtures::movie_record("1", "Inception")]);

    h.cache
        .put(&keys::on_deck("srv-a"), "{not valid json", 1800)
        .unwrap();

    let snapshots: Vec<_> = h.coordinator.observe_on_deck().collect().await;
    // The provisional emission skips the corrupt payload; the refresh
    // fetches past it.
    assert!(snapshots[0].value.is_empty());
    assert_eq!(snapshots[1].value.len(), 1);
}

#[tokio::test]
async fn refreshed_records_land_in_the_virtual_library() {
    let h = TestHarness::new(&[("srv-a", true), ("srv-b", false)]);
    h.mocks[0].set_on_deck(vec![fixtures::movie_record_with_imdb(
        "1",
        "Inception",
        "tt1375666",
    )]);
    h.mocks[1].set_on_deck(vec![
        fixtures::movie_record_with_imdb("9", "Inception", "tt1375666"),
        fixtures::movie_record("10", "Tenet"),
    ]);

    let _: Vec<_> = h.coordinator.observe_on_deck().collect().await;

    // The unified query sees one group for the duplicated title.
    let rows = h.library.query_unified(&LibraryQuery::unified()).unwrap();
    assert_eq!(rows.len(), 2);
    let inception = rows
        .iter()
        .find(|r| r.unification_key == "imdb://tt1375666")
        .unwrap();
    assert_eq!(inception.source_ids.len(), 2);

    // And the canonical item can be rebuilt from the row.
    let item = h
        .coordinator
        .resolve_unified(inception, Some("srv-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.refs.len(), 2);
    assert_eq!(item.refs[0].source_id, "srv-b");
}

#[tokio::test]
async fn federated_search_survives_a_dead_source() {
    let h = TestHarness::new(&[("srv-a", true), ("srv-b", false)]);
    h.mocks[0].set_items(vec![fixtures::movie_record("1", "Inception")]);
    h.mocks[1].set_unreachable("down");

    let results = h.coordinator.search("inception").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source_id, "srv-a");
}
