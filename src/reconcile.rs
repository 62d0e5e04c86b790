//! Reconciliation engine: one external record in, one terminal outcome out.
//!
//! ```text
//!                ┌──────────── mapping? ────────────┐
//!                │ no                               │ yes
//!                ▼                                  ▼
//!             CREATE                     update_existing?
//!   publication + contributors          no │          │ yes
//!        + mapping (synced)                ▼          ▼
//!                                       SKIPPED   fingerprint equal?
//!                                                yes │        │ no
//!                                                    ▼        ▼
//!                                               UNCHANGED   UPDATE
//!                                                        publication,
//!                                                     contributors, mapping
//! ```
//!
//! Any failure on the way yields [`ItemOutcome::Error`]. The engine writes
//! through the connection it is handed and never opens, commits or rolls
//! back a scope; discarding a failed item's writes is the caller's job.

use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::debug;

use crate::adapter::SourceAdapter;
use crate::contributors::replace_contributors;
use crate::detector::{classify, Change};
use crate::error::{AdapterError, StoreError};
use crate::models::{BatchItemResult, ExternalRecord, ItemStatus, SourceMapping, SyncStatus};
use crate::store;

/// Terminal state of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created { publication_id: String },
    Updated { publication_id: String },
    Unchanged { publication_id: String },
    Skipped { publication_id: String },
    Error { reason: String },
}

impl ItemOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ItemOutcome::Error { .. })
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            ItemOutcome::Created { .. } => ItemStatus::Created,
            ItemOutcome::Updated { .. } => ItemStatus::Updated,
            ItemOutcome::Unchanged { .. } => ItemStatus::Unchanged,
            ItemOutcome::Skipped { .. } => ItemStatus::Skipped,
            ItemOutcome::Error { .. } => ItemStatus::Error,
        }
    }

    pub fn into_item_result(self, external_id: &str) -> BatchItemResult {
        let status = self.status();
        let (publication_id, error) = match self {
            ItemOutcome::Created { publication_id }
            | ItemOutcome::Updated { publication_id }
            | ItemOutcome::Unchanged { publication_id }
            | ItemOutcome::Skipped { publication_id } => (Some(publication_id), None),
            ItemOutcome::Error { reason } => (None, Some(reason)),
        };
        BatchItemResult {
            external_id: external_id.to_string(),
            status,
            publication_id,
            error,
        }
    }
}

/// Engine output: the outcome plus the publication to mint for, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: ItemOutcome,
    pub mint_request: Option<String>,
}

impl Reconciliation {
    fn done(outcome: ItemOutcome) -> Self {
        Self {
            outcome,
            mint_request: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::done(ItemOutcome::Error {
            reason: reason.into(),
        })
    }
}

/// What the engine will do with a record, decided before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Skip,
    Unchanged,
    Update,
}

pub fn decide(mapping: Option<&SourceMapping>, fingerprint: &str, update_existing: bool) -> Decision {
    match (mapping, update_existing) {
        (None, _) => Decision::Create,
        (Some(_), false) => Decision::Skip,
        (Some(_), true) => match classify(mapping, fingerprint) {
            Change::Modified => Decision::Update,
            Change::Unchanged | Change::New => Decision::Unchanged,
        },
    }
}

/// Per-batch settings the engine needs for every record.
#[derive(Debug, Clone)]
pub struct ReconcileContext<'a> {
    pub owner: &'a str,
    pub update_existing: bool,
    /// Unix seconds used for every timestamp written in this batch.
    pub now: i64,
}

#[derive(Debug, Error)]
enum EngineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reconcile one fetched record against its existing mapping, if any.
pub async fn reconcile_record(
    conn: &mut SqliteConnection,
    adapter: &dyn SourceAdapter,
    record: &ExternalRecord,
    existing: Option<&SourceMapping>,
    ctx: &ReconcileContext<'_>,
) -> Reconciliation {
    let fingerprint = adapter.fingerprint(record);
    let decision = decide(existing, &fingerprint, ctx.update_existing);
    debug!(
        source = adapter.source_name(),
        external_id = %record.external_id,
        ?decision,
        "reconciling"
    );

    let result = match (decision, existing) {
        (Decision::Create, _) => create(conn, adapter, record, &fingerprint, ctx).await,
        (Decision::Skip, Some(mapping)) => Ok(Reconciliation::done(ItemOutcome::Skipped {
            publication_id: mapping.publication_id.clone(),
        })),
        (Decision::Unchanged, Some(mapping)) => Ok(Reconciliation::done(ItemOutcome::Unchanged {
            publication_id: mapping.publication_id.clone(),
        })),
        (Decision::Update, Some(mapping)) => {
            update(conn, adapter, record, mapping, &fingerprint, ctx).await
        }
        (_, None) => Ok(Reconciliation::failed("no mapping to update")),
    };

    result.unwrap_or_else(|e| Reconciliation::failed(e.to_string()))
}

async fn create(
    conn: &mut SqliteConnection,
    adapter: &dyn SourceAdapter,
    record: &ExternalRecord,
    fingerprint: &str,
    ctx: &ReconcileContext<'_>,
) -> Result<Reconciliation, EngineError> {
    let mapped = adapter.map_to_canonical(record, ctx.owner)?;

    let publication_id = store::create_publication(&mut *conn, &mapped.fields, ctx.now).await?;
    store::insert_contributors(&mut *conn, &publication_id, &mapped.contributors).await?;
    store::insert_mapping(
        &mut *conn,
        &SourceMapping {
            source: adapter.source_name().to_string(),
            external_id: record.external_id.clone(),
            publication_id: publication_id.clone(),
            fingerprint: fingerprint.to_string(),
            last_synced_at: ctx.now,
            sync_status: SyncStatus::Synced,
            last_error: None,
            retry_count: 0,
        },
    )
    .await?;

    let mint_request = mapped
        .fields
        .resolvable_id
        .is_none()
        .then(|| publication_id.clone());
    Ok(Reconciliation {
        outcome: ItemOutcome::Created { publication_id },
        mint_request,
    })
}

async fn update(
    conn: &mut SqliteConnection,
    adapter: &dyn SourceAdapter,
    record: &ExternalRecord,
    mapping: &SourceMapping,
    fingerprint: &str,
    ctx: &ReconcileContext<'_>,
) -> Result<Reconciliation, EngineError> {
    let mapped = adapter.map_to_canonical(record, ctx.owner)?;
    let publication_id = mapping.publication_id.clone();

    let stored_id =
        store::update_publication(&mut *conn, &publication_id, &mapped.fields, ctx.now).await?;
    replace_contributors(&mut *conn, &publication_id, &mapped.contributors).await?;
    store::update_mapping(
        &mut *conn,
        &mapping.source,
        &mapping.external_id,
        fingerprint,
        ctx.now,
    )
    .await?;

    let mint_request = stored_id.is_none().then(|| publication_id.clone());
    Ok(Reconciliation {
        outcome: ItemOutcome::Updated { publication_id },
        mint_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> SourceMapping {
        SourceMapping {
            source: "dspace".to_string(),
            external_id: "x".to_string(),
            publication_id: "p".to_string(),
            fingerprint: "f1".to_string(),
            last_synced_at: 0,
            sync_status: SyncStatus::Synced,
            last_error: None,
            retry_count: 0,
        }
    }

    #[test]
    fn test_decide_state_machine() {
        let m = mapping();
        assert_eq!(decide(None, "f1", false), Decision::Create);
        assert_eq!(decide(None, "f1", true), Decision::Create);
        assert_eq!(decide(Some(&m), "f2", false), Decision::Skip);
        assert_eq!(decide(Some(&m), "f1", true), Decision::Unchanged);
        assert_eq!(decide(Some(&m), "f2", true), Decision::Update);
    }

    #[test]
    fn test_outcome_into_item_result() {
        let ok = ItemOutcome::Updated {
            publication_id: "p".to_string(),
        }
        .into_item_result("x");
        assert_eq!(ok.status, ItemStatus::Updated);
        assert_eq!(ok.publication_id.as_deref(), Some("p"));
        assert!(ok.error.is_none());

        let failed = ItemOutcome::Error {
            reason: "boom".to_string(),
        }
        .into_item_result("y");
        assert_eq!(failed.status, ItemStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.publication_id.is_none());
    }
}
