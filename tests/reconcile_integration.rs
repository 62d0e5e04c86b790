//! Batch reconciliation properties against a real SQLite store.

mod common;

use common::{count, mappings, record, setup_db, snapshot, FakeAdapter, RecordingMintQueue};
use pubharvest::batch::{import_one, run_batch, BatchRequest, Selection};
use pubharvest::error::BatchError;
use pubharvest::mint::{self, MintQueue, OutboxMintQueue};
use pubharvest::models::{ContributorRole, ItemStatus, PageParams, RecordCreator};

fn page(update_existing: bool) -> BatchRequest {
    BatchRequest {
        update_existing,
        selection: Selection::Page(PageParams::default()),
    }
}

fn ids(update_existing: bool, ids: &[&str]) -> BatchRequest {
    BatchRequest {
        update_existing,
        selection: Selection::Ids(ids.iter().map(|s| s.to_string()).collect()),
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![
        record("a", "Alpha", None),
        record("b", "Beta", Some("10.5555/beta")),
        record("c", "Gamma", None),
    ]);
    let minter = RecordingMintQueue::default();

    let first = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(first.created, 3);
    assert_eq!(first.errors, 0);
    let before = mappings(&pool).await;

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let second = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(second.total, 3);
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);

    assert_eq!(count(&pool, "publications").await, 3);
    assert_eq!(count(&pool, "source_mappings").await, 3);
    assert_eq!(count(&pool, "contributors").await, 6);
    // Unchanged records keep their sync timestamp.
    assert_eq!(mappings(&pool).await, before);
}

#[tokio::test]
async fn test_existing_records_are_skipped_by_default() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![record("a", "Alpha", None), record("b", "Beta", None)]);
    let minter = RecordingMintQueue::default();

    run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();
    adapter.set(record("a", "Alpha, revised", None));

    let result = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();
    assert_eq!(result.skipped, 2);
    assert!(result.items.iter().all(|i| i.publication_id.is_some()));

    let title: String = sqlx::query_scalar(
        "SELECT p.title FROM publications p JOIN source_mappings m ON m.publication_id = p.id \
         WHERE m.external_id = 'a'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(title, "Alpha");
}

#[tokio::test]
async fn test_change_rewrites_publication_and_contributors() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![record("a", "Alpha", None), record("b", "Beta", None)]);
    let minter = RecordingMintQueue::default();

    run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    let before = mappings(&pool).await;

    let mut changed = record("a", "Alpha, second edition", None);
    changed.creators = vec![RecordCreator::named("Poe, Edgar", ContributorRole::Editor)];
    adapter.set(changed);

    let result = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(result.unchanged, 1);
    assert_eq!(result.items[0].status, ItemStatus::Updated);

    let after = mappings(&pool).await;
    let (pid_before, _, fp_before) = &before["a"];
    let (pid_after, _, fp_after) = &after["a"];
    assert_eq!(pid_before, pid_after, "update must not create a new publication");
    assert_ne!(fp_before, fp_after);
    assert_eq!(before["b"], after["b"]);

    let title: String = sqlx::query_scalar("SELECT title FROM publications WHERE id = ?")
        .bind(pid_after)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(title, "Alpha, second edition");

    let contributors: Vec<(String, String)> = sqlx::query_as(
        "SELECT family_name, role FROM contributors WHERE publication_id = ? ORDER BY position",
    )
    .bind(pid_after)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(contributors, vec![("Poe".to_string(), "editor".to_string())]);
    assert_eq!(count(&pool, "publications").await, 2);
}

#[tokio::test]
async fn test_failed_detail_fetch_does_not_undo_other_items() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::summaries(vec![
        record("1", "First", None),
        record("2", "Second", None),
        record("3", "Third", None),
    ]);
    adapter.fail_fetch("2");
    let minter = RecordingMintQueue::default();

    let result = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();

    let statuses: Vec<_> = result
        .items
        .iter()
        .map(|i| (i.external_id.as_str(), i.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("1", ItemStatus::Created),
            ("2", ItemStatus::Error),
            ("3", ItemStatus::Created),
        ]
    );
    assert!(result.items[1].error.as_deref().unwrap().contains("503"));
    assert_eq!(result.created, 2);
    assert_eq!(result.errors, 1);

    assert_eq!(count(&pool, "publications").await, 2);
    let stored = mappings(&pool).await;
    assert!(stored.contains_key("1"));
    assert!(!stored.contains_key("2"));
    assert!(stored.contains_key("3"));
}

#[tokio::test]
async fn test_unmappable_record_leaves_no_trace() {
    let (_tmp, pool) = setup_db().await;
    let mut untitled = record("b", "", None);
    untitled.title = None;
    let adapter = FakeAdapter::full(vec![
        record("a", "Alpha", None),
        untitled,
        record("c", "Gamma", None),
    ]);
    let minter = RecordingMintQueue::default();

    let result = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();
    assert_eq!(result.created, 2);
    assert_eq!(result.errors, 1);
    assert!(result.items[1].error.as_deref().unwrap().contains("no title"));
    assert_eq!(count(&pool, "publications").await, 2);
    assert_eq!(count(&pool, "contributors").await, 4);
}

#[tokio::test]
async fn test_failed_update_leaves_existing_rows_untouched() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![record("a", "Alpha", None), record("b", "Beta", None)]);
    let minter = RecordingMintQueue::default();

    run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    let before = snapshot(&pool, "a").await;

    // Fails while mapping, before any write.
    let mut untitled = record("a", "", None);
    untitled.title = None;
    adapter.set(untitled);

    let result = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(result.items[0].status, ItemStatus::Error);
    assert_eq!(result.unchanged, 1);
    assert_eq!(snapshot(&pool, "a").await, before);

    // Fails on the mapping write, after publication and contributors were rewritten.
    let mut changed = record("a", "Alpha, revised", None);
    changed.creators = vec![RecordCreator::named("Poe, Edgar", ContributorRole::Editor)];
    adapter.set(changed);
    sqlx::query(
        "CREATE TRIGGER lock_mapping BEFORE UPDATE ON source_mappings \
         WHEN NEW.external_id = 'a' BEGIN SELECT RAISE(ABORT, 'mapping locked'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(result.items[0].status, ItemStatus::Error);
    assert!(result.items[0].error.as_deref().unwrap().contains("mapping locked"));
    assert_eq!(result.unchanged, 1);
    assert_eq!(snapshot(&pool, "a").await, before);
    assert_eq!(count(&pool, "contributors").await, 4);
}

#[tokio::test]
async fn test_rerun_finds_mapping_under_the_source_id() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::summaries(vec![record("7", "Seven", None)]).with_numeric_ids();
    let minter = RecordingMintQueue::default();

    let created = import_one(&pool, &adapter, &minter, "library", "007", false)
        .await
        .unwrap();
    assert_eq!(created.status, ItemStatus::Created);
    assert_eq!(created.external_id, "7");

    let again = import_one(&pool, &adapter, &minter, "library", "007", false)
        .await
        .unwrap();
    assert_eq!(again.status, ItemStatus::Skipped);
    assert_eq!(again.publication_id, created.publication_id);

    let result = run_batch(&pool, &adapter, &minter, "library", &ids(true, &["007", "07"]))
        .await
        .unwrap();
    assert_eq!(result.errors, 0, "{:?}", result.items);
    assert_eq!(result.unchanged, 2);
    assert!(result.items.iter().all(|i| i.external_id == "7"));

    assert_eq!(count(&pool, "publications").await, 1);
    assert_eq!(count(&pool, "source_mappings").await, 1);
}

#[tokio::test]
async fn test_duplicate_id_in_page_is_a_conflict() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![
        record("dup", "First copy", None),
        record("dup", "Second copy", None),
    ]);
    let minter = RecordingMintQueue::default();

    let result = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.errors, 1);
    assert!(result.items[1].error.as_deref().unwrap().contains("conflict"));

    // The second copy's publication insert was rolled back with its savepoint.
    assert_eq!(count(&pool, "publications").await, 1);
    assert_eq!(count(&pool, "contributors").await, 2);
    assert_eq!(count(&pool, "source_mappings").await, 1);
    // Only the committed copy asked for an identifier.
    assert_eq!(minter.requested().len(), 1);
}

#[tokio::test]
async fn test_doi_decides_minting() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![
        record("A", "With DOI", Some("https://doi.org/10.5555/A")),
        record("B", "Without DOI", None),
    ]);
    let minter = RecordingMintQueue::default();

    let result = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();
    let pub_a = result.items[0].publication_id.clone().unwrap();
    let pub_b = result.items[1].publication_id.clone().unwrap();

    let rows: Vec<(String, Option<String>, Option<String>, String)> = sqlx::query_as(
        "SELECT id, resolvable_id, external_doi, mint_status FROM publications ORDER BY title",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    let a = rows.iter().find(|r| r.0 == pub_a).unwrap();
    let b = rows.iter().find(|r| r.0 == pub_b).unwrap();
    assert_eq!(a.1.as_deref(), Some("10.5555/A"));
    assert_eq!(a.2.as_deref(), Some("10.5555/A"));
    assert_eq!(a.3, "not_needed");
    assert_eq!(b.1, None);
    assert_eq!(b.3, "pending");

    assert_eq!(minter.requested(), vec![pub_b.clone()]);

    // Once minted downstream, an update without a DOI keeps the identifier
    // and does not ask again.
    sqlx::query("UPDATE publications SET resolvable_id = 'hdl:20.500/77', mint_status = 'not_needed' WHERE id = ?")
        .bind(&pub_b)
        .execute(&pool)
        .await
        .unwrap();
    adapter.set(record("B", "Without DOI, corrected", None));

    let result = run_batch(&pool, &adapter, &minter, "library", &page(true))
        .await
        .unwrap();
    assert_eq!(result.updated, 1);
    assert_eq!(minter.requested(), vec![pub_b.clone()]);

    let (resolvable, status): (Option<String>, String) =
        sqlx::query_as("SELECT resolvable_id, mint_status FROM publications WHERE id = ?")
            .bind(&pub_b)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(resolvable.as_deref(), Some("hdl:20.500/77"));
    assert_eq!(status, "not_needed");
}

#[tokio::test]
async fn test_unreachable_source_fails_whole_batch() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::unreachable();
    let minter = RecordingMintQueue::default();

    let err = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Fetch(_)));
    assert_eq!(count(&pool, "publications").await, 0);
}

#[tokio::test]
async fn test_id_list_is_bounded_by_page_cap() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::summaries(vec![
        record("a", "Alpha", None),
        record("b", "Beta", None),
        record("c", "Gamma", None),
    ])
    .with_cap(2);
    let minter = RecordingMintQueue::default();

    let err = run_batch(&pool, &adapter, &minter, "library", &ids(false, &["a", "b", "c"]))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::InvalidRequest(_)));

    let result = run_batch(&pool, &adapter, &minter, "library", &ids(false, &["c", "a"]))
        .await
        .unwrap();
    assert_eq!(result.created, 2);
    assert_eq!(result.items[0].external_id, "c");

    // Page listings are clamped to the cap as well.
    let result = run_batch(&pool, &adapter, &minter, "library", &page(false))
        .await
        .unwrap();
    assert_eq!(result.total, 2);
}

#[tokio::test]
async fn test_import_one() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::summaries(vec![record("a", "Alpha", None)]);
    let minter = RecordingMintQueue::default();

    let err = import_one(&pool, &adapter, &minter, "library", "missing", false)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::NotFound(_)));

    let created = import_one(&pool, &adapter, &minter, "library", "a", false)
        .await
        .unwrap();
    assert_eq!(created.status, ItemStatus::Created);

    let again = import_one(&pool, &adapter, &minter, "library", "a", false)
        .await
        .unwrap();
    assert_eq!(again.status, ItemStatus::Skipped);
    assert_eq!(again.publication_id, created.publication_id);

    adapter.fail_fetch("a");
    let err = import_one(&pool, &adapter, &minter, "library", "a", true)
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::Fetch(_)));
}

#[tokio::test]
async fn test_outbox_keeps_one_request_per_publication() {
    let (_tmp, pool) = setup_db().await;
    let adapter = FakeAdapter::full(vec![record("a", "Alpha", None)]);
    let outbox = OutboxMintQueue::new(pool.clone());

    let result = run_batch(&pool, &adapter, &outbox, "library", &page(false))
        .await
        .unwrap();
    let publication_id = result.items[0].publication_id.clone().unwrap();

    outbox.request_mint(&publication_id).await.unwrap();
    assert_eq!(count(&pool, "mint_requests").await, 1);
    assert_eq!(mint::pending_count(&pool).await.unwrap(), 1);
}
