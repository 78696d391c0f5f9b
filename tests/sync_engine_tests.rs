//! End-to-end board runs against the in-memory and SQLite catalogs
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use roster_sync_lib::application::CatalogSyncEngine;
use roster_sync_lib::domain::{
    CatalogStore, Gender, Identifier, Measurements, RosterRecord, RunPhase, SyncError,
};
use roster_sync_lib::infrastructure::config::BoardConfig;
use roster_sync_lib::infrastructure::{InMemoryCatalogStore, StoreCall};
use roster_sync_lib::test_utils::{
    ScriptedEntry, ScriptedListingSource, profile, profile_url, sqlite_store, test_board,
};
use tokio_util::sync::CancellationToken;

fn stored(board: &BoardConfig, slug: &str) -> (Identifier, RosterRecord) {
    let id = Identifier::new(slug.replace('-', "_"));
    (
        id.clone(),
        RosterRecord {
            identifier: id,
            name: slug.to_string(),
            profile_url: profile_url(board, slug),
            board: board.key.clone(),
            agency: board.agency.clone(),
            gender: Gender::Female,
            portfolio_images: vec!["https://agency.test/old.jpg".to_string()],
            measurements: Measurements::with_keys(board.measurement_keys()),
            out_of_town: false,
        },
    )
}

fn ids(values: &[&str]) -> BTreeSet<Identifier> {
    values.iter().map(|v| Identifier::from(*v)).collect()
}

/// Listing of `slugs` where each has a one-image profile
fn listing(board: &BoardConfig, slugs: &[&str]) -> ScriptedListingSource {
    let entries = slugs.iter().map(|s| ScriptedEntry::slug(s)).collect();
    slugs.iter().fold(ScriptedListingSource::new(entries), |source, slug| {
        let image = format!("/img/{slug}.jpg");
        source.with_profile(
            &profile_url(board, slug),
            profile(&[image.as_str()], &[("Height", "175")], false),
        )
    })
}

#[tokio::test]
async fn adds_new_skips_known_and_deletes_gone() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded(
        ["a", "b", "c"].map(|s| stored(&board, s)),
    ));
    let mut source = listing(&board, &["b", "c", "d"]);

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!(result.phase, RunPhase::Reported);
    assert_eq!((result.added, result.skipped, result.removed, result.failed), (1, 2, 1, 0));

    let calls = store.calls().await;
    assert_eq!(
        calls,
        vec![
            StoreCall::Upsert {
                board: "x".to_string(),
                identifier: Identifier::new("d")
            },
            StoreCall::Delete {
                board: "x".to_string(),
                identifier: Identifier::new("a")
            },
            StoreCall::AppendLog {
                board: "x".to_string()
            },
        ]
    );
    // Known entries are never visited
    assert_eq!(source.opened, vec![profile_url(&board, "d")]);
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["b", "c", "d"]));
}

#[tokio::test]
async fn second_run_with_unchanged_listing_is_noop() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded(
        ["a", "b", "c"].map(|s| stored(&board, s)),
    ));
    let engine = CatalogSyncEngine::new(store.clone(), board.clone());

    engine
        .run(&mut listing(&board, &["b", "c", "d"]), &CancellationToken::new())
        .await;
    let second = engine
        .run(&mut listing(&board, &["b", "c", "d"]), &CancellationToken::new())
        .await;

    assert!(second.success);
    assert_eq!((second.added, second.skipped, second.removed), (0, 3, 0));
}

#[tokio::test]
async fn extraction_failure_is_isolated() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded(
        ["a", "b", "c"].map(|s| stored(&board, s)),
    ));
    // "d" is listed but its profile never renders
    let entries = ["b", "c", "d"].map(ScriptedEntry::slug).to_vec();
    let mut source = ScriptedListingSource::new(entries);

    let engine = CatalogSyncEngine::new(store.clone(), board);
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!((result.added, result.skipped, result.removed, result.failed), (0, 2, 1, 1));
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["b", "c"]));
}

#[tokio::test]
async fn zero_image_profile_is_discarded() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::new());
    let mut source = ScriptedListingSource::new(vec![ScriptedEntry::slug("e")])
        .with_profile(&profile_url(&board, "e"), profile(&[], &[("Height", "170")], false));

    let engine = CatalogSyncEngine::new(store.clone(), board);
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!((result.added, result.failed), (0, 1));
    assert!(store.list_identifiers("x").await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_profile_is_abandoned_and_run_continues() {
    let mut board = test_board("x");
    board.detail_timeout_ms = 50;
    let store = Arc::new(InMemoryCatalogStore::new());
    let mut source = listing(&board, &["fast", "slow"])
        .with_slow_profile(&profile_url(&board, "slow"), Duration::from_secs(2));

    let engine = CatalogSyncEngine::new(store.clone(), board);
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(result.success);
    assert_eq!((result.added, result.failed), (1, 1));
}

#[tokio::test]
async fn other_boards_are_never_touched() {
    let x = test_board("x");
    let y = test_board("y");
    let store = Arc::new(InMemoryCatalogStore::seeded([
        stored(&x, "a"),
        stored(&y, "a"),
        stored(&y, "z"),
    ]));

    let engine = CatalogSyncEngine::new(store.clone(), x.clone());
    let result = engine
        .run(&mut listing(&x, &["b"]), &CancellationToken::new())
        .await;

    assert_eq!((result.added, result.removed), (1, 1));
    assert_eq!(store.list_identifiers("y").await.unwrap(), ids(&["a", "z"]));
    assert!(store.calls().await.iter().all(|call| match call {
        StoreCall::Upsert { board, .. }
        | StoreCall::Delete { board, .. }
        | StoreCall::AppendLog { board } => board == "x",
    }));
}

#[tokio::test]
async fn unrendered_listing_aborts_without_mutations() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded([stored(&board, "a")]));
    let mut source = ScriptedListingSource::unrendered(&board.base_url);

    let engine = CatalogSyncEngine::new(store.clone(), board);
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.phase, RunPhase::Aborted);
    assert!(result.error.as_deref().unwrap_or_default().contains("Precondition"));
    // Only the report is written
    assert_eq!(
        store.calls().await,
        vec![StoreCall::AppendLog {
            board: "x".to_string()
        }]
    );
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["a"]));
}

#[tokio::test]
async fn unreachable_store_aborts_and_still_reports() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::new());
    store.set_offline(true);

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let mut source = listing(&board, &["a"]);
    let result = engine.run(&mut source, &CancellationToken::new()).await;

    assert!(!result.success);
    assert_eq!(result.phase, RunPhase::Aborted);
    assert_eq!(source.load_calls, 0);
    assert!(
        result
            .error
            .unwrap_or_default()
            .contains(&SyncError::StoreUnavailable("in-memory store is offline".into()).to_string())
    );
}

#[tokio::test]
async fn rejected_write_is_counted_not_fatal() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded([stored(&board, "a")]));
    store.reject("b").await;

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let result = engine
        .run(&mut listing(&board, &["b", "c"]), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!((result.added, result.removed, result.failed), (1, 1, 1));
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["c"]));
}

#[tokio::test]
async fn refresh_rewrites_changed_entries() {
    let mut board = test_board("x");
    board.refresh_existing = true;
    let store = Arc::new(InMemoryCatalogStore::seeded(
        ["b", "c"].map(|s| stored(&board, s)),
    ));

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let result = engine
        .run(&mut listing(&board, &["b", "c"]), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!((result.added, result.skipped, result.refreshed), (0, 2, 2));
    let b = store.record("x", "b").await.unwrap();
    assert_eq!(b.measurements.get("height"), "175");

    // Nothing changed since the refresh
    let again = engine
        .run(&mut listing(&board, &["b", "c"]), &CancellationToken::new())
        .await;
    assert_eq!(again.refreshed, 0);
}

#[tokio::test]
async fn cancelled_run_is_aborted() {
    let board = test_board("x");
    let store = Arc::new(InMemoryCatalogStore::seeded([stored(&board, "a")]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let result = engine.run(&mut listing(&board, &["b"]), &cancel).await;

    assert!(!result.success);
    assert_eq!(result.phase, RunPhase::Aborted);
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["a"]));
}

#[tokio::test]
async fn sqlite_catalog_end_to_end() {
    let board = test_board("x");
    let store = Arc::new(sqlite_store().await.unwrap());
    for (id, record) in ["a", "b", "c"].map(|s| stored(&board, s)) {
        store.upsert(&id, &record).await.unwrap();
    }

    let engine = CatalogSyncEngine::new(store.clone(), board.clone());
    let result = engine
        .run(&mut listing(&board, &["b", "c", "d"]), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!((result.added, result.skipped, result.removed), (1, 2, 1));
    assert_eq!(store.list_identifiers("x").await.unwrap(), ids(&["b", "c", "d"]));

    let logs = store.recent_logs(5).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].run_id, result.run_id);
    assert_eq!(logs[0].counts(), result.counts());
}
