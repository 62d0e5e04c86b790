//! Contributor reconciliation.
//!
//! Contributors carry no stable identity across sources, so an update
//! replaces the whole list rather than diffing it.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::StoreError;
use crate::models::ContributorEntry;
use crate::store;

/// Replace every contributor of `publication_id` with `contributors`,
/// preserving list order as position.
pub async fn replace_contributors(
    conn: &mut SqliteConnection,
    publication_id: &str,
    contributors: &[ContributorEntry],
) -> Result<(), StoreError> {
    let removed = store::delete_contributors(&mut *conn, publication_id).await?;
    store::insert_contributors(&mut *conn, publication_id, contributors).await?;
    debug!(
        publication_id,
        removed,
        inserted = contributors.len(),
        "replaced contributors"
    );
    Ok(())
}
