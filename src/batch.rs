//! Batch transaction manager.
//!
//! Drives the reconciliation engine over one page (or id list) of a
//! source inside a single store transaction:
//!
//! 1. Resolve the selection (`fetch_page`, or the explicit ids).
//! 2. Fetch details for summary entries. All network I/O is done here,
//!    before the transaction opens.
//! 3. Begin the transaction and bulk-load the mapping index.
//! 4. Run each record in its own savepoint; release it on success, roll it
//!    back on error so the item leaves no trace.
//! 5. Commit once.
//! 6. Send mint requests for publications that still need an identifier.
//!
//! A failure in step 1 or 5 fails the whole request. Failures of single
//! records only mark that record as an error.
//!
//! Sources may canonicalise the id they are asked for (`"007"` becomes
//! `"7"`). Mappings are looked up and stored under the id on the returned
//! record, and items are reported under that id too.

use sqlx::{Connection, SqlitePool};
use tracing::{info, warn};

use crate::adapter::SourceAdapter;
use crate::error::{AdapterError, BatchError};
use crate::mint::MintQueue;
use crate::models::{BatchItemResult, BatchResult, ExternalRecord, PageEntry, PageParams};
use crate::reconcile::{reconcile_record, ItemOutcome, ReconcileContext, Reconciliation};
use crate::resolver::MappingIndex;

/// Which records a batch covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Explicit external ids, fetched one by one.
    Ids(Vec<String>),
    /// One page of the source's listing.
    Page(PageParams),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Overwrite publications whose source content changed. When `false`,
    /// already-mapped records are skipped without comparing fingerprints.
    pub update_existing: bool,
    pub selection: Selection,
}

/// Import one page or id list from `adapter`.
pub async fn run_batch(
    pool: &SqlitePool,
    adapter: &dyn SourceAdapter,
    minter: &dyn MintQueue,
    owner: &str,
    request: &BatchRequest,
) -> Result<BatchResult, BatchError> {
    let cap = adapter.max_page_size();
    let entries = match &request.selection {
        Selection::Ids(ids) => {
            if ids.len() > cap as usize {
                return Err(BatchError::InvalidRequest(format!(
                    "{} ids requested but {} allows at most {} per batch",
                    ids.len(),
                    adapter.source_name(),
                    cap
                )));
            }
            if let Some(blank) = ids.iter().position(|id| id.trim().is_empty()) {
                return Err(BatchError::InvalidRequest(format!(
                    "ids[{}] must not be empty",
                    blank
                )));
            }
            ids.iter()
                .map(|id| PageEntry::Summary {
                    external_id: id.trim().to_string(),
                })
                .collect()
        }
        Selection::Page(params) => adapter
            .fetch_page(&params.clamped(cap))
            .await
            .map_err(BatchError::Fetch)?,
    };

    let fetched = fetch_details(adapter, entries).await;
    let (result, mint_requests) =
        reconcile_fetched(pool, adapter, owner, request.update_existing, fetched).await?;

    info!(
        source = adapter.source_name(),
        total = result.total,
        created = result.created,
        updated = result.updated,
        unchanged = result.unchanged,
        skipped = result.skipped,
        errors = result.errors,
        "batch committed"
    );

    send_mint_requests(minter, &mint_requests).await;
    Ok(result)
}

/// Import a single record by external id.
///
/// Unlike a batch, a record the source does not have is reported as
/// [`BatchError::NotFound`] rather than as an item error, and any other
/// fetch failure as [`BatchError::Fetch`].
pub async fn import_one(
    pool: &SqlitePool,
    adapter: &dyn SourceAdapter,
    minter: &dyn MintQueue,
    owner: &str,
    external_id: &str,
    update_existing: bool,
) -> Result<BatchItemResult, BatchError> {
    let external_id = external_id.trim();
    if external_id.is_empty() {
        return Err(BatchError::InvalidRequest(
            "external id must not be empty".to_string(),
        ));
    }

    let record = match adapter.fetch_one(external_id).await {
        Ok(record) => record,
        Err(e) if e.is_not_found() => return Err(BatchError::NotFound(e)),
        Err(e @ AdapterError::InvalidRecord { .. }) => {
            return Ok(ItemOutcome::Error {
                reason: e.to_string(),
            }
            .into_item_result(external_id))
        }
        Err(e) => return Err(BatchError::Fetch(e)),
    };

    let fetched = vec![(external_id.to_string(), Ok(record))];
    let (mut result, mint_requests) =
        reconcile_fetched(pool, adapter, owner, update_existing, fetched).await?;
    send_mint_requests(minter, &mint_requests).await;

    result
        .items
        .pop()
        .ok_or_else(|| BatchError::InvalidRequest("no record processed".to_string()))
}

type Fetched = (String, Result<ExternalRecord, AdapterError>);

async fn fetch_details(adapter: &dyn SourceAdapter, entries: Vec<PageEntry>) -> Vec<Fetched> {
    let mut fetched = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            PageEntry::Full(record) => fetched.push((record.external_id.clone(), Ok(record))),
            PageEntry::Summary { external_id } => {
                let record = adapter.fetch_one(&external_id).await;
                if let Err(e) = &record {
                    warn!(
                        source = adapter.source_name(),
                        external_id = %external_id,
                        error = %e,
                        "detail fetch failed"
                    );
                }
                fetched.push((external_id, record));
            }
        }
    }
    fetched
}

/// Steps 3 to 5: one transaction, one savepoint per record, one commit.
async fn reconcile_fetched(
    pool: &SqlitePool,
    adapter: &dyn SourceAdapter,
    owner: &str,
    update_existing: bool,
    fetched: Vec<Fetched>,
) -> Result<(BatchResult, Vec<String>), BatchError> {
    let source = adapter.source_name();
    // The source may canonicalise the id it was asked for; mappings are keyed
    // by the id on the returned record.
    let fetched: Vec<Fetched> = fetched
        .into_iter()
        .map(|(requested, record)| match record {
            Ok(record) => (record.external_id.clone(), Ok(record)),
            Err(e) => (requested, Err(e)),
        })
        .collect();
    let ids: Vec<String> = fetched.iter().map(|(id, _)| id.clone()).collect();
    let ctx = ReconcileContext {
        owner,
        update_existing,
        now: chrono::Utc::now().timestamp(),
    };

    let mut tx = pool.begin().await.map_err(BatchError::store)?;
    let index = MappingIndex::load(&mut *tx, source, &ids)
        .await
        .map_err(BatchError::Store)?;

    let mut result = BatchResult::new();
    let mut mint_requests = Vec::new();

    for (external_id, record) in fetched {
        let reconciliation = match record {
            Err(e) => Reconciliation::failed(e.to_string()),
            Ok(record) => {
                let mut scope = tx.begin().await.map_err(BatchError::store)?;
                let reconciliation = reconcile_record(
                    &mut *scope,
                    adapter,
                    &record,
                    index.get(&external_id),
                    &ctx,
                )
                .await;
                if reconciliation.outcome.is_error() {
                    scope.rollback().await.map_err(BatchError::store)?;
                } else {
                    scope.commit().await.map_err(BatchError::store)?;
                }
                reconciliation
            }
        };

        let item = reconciliation.outcome.into_item_result(&external_id);
        match &item.error {
            Some(reason) => warn!(
                source,
                external_id = %item.external_id,
                reason = %reason,
                "item failed"
            ),
            None => info!(
                source,
                external_id = %item.external_id,
                outcome = item.status.as_str(),
                "item reconciled"
            ),
        }
        if let Some(publication_id) = reconciliation.mint_request {
            mint_requests.push(publication_id);
        }
        result.record(item);
    }

    tx.commit().await.map_err(BatchError::Commit)?;
    Ok((result, mint_requests))
}

/// Fire-and-forget; a failed request is picked up on a later run.
async fn send_mint_requests(minter: &dyn MintQueue, publication_ids: &[String]) {
    for publication_id in publication_ids {
        if let Err(e) = minter.request_mint(publication_id).await {
            warn!(publication_id = %publication_id, error = %e, "mint request failed");
        }
    }
}
