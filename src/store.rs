//! Canonical store operations.
//!
//! Every function takes a plain `&mut SqliteConnection` so it runs inside
//! whatever scope the caller holds: the batch transaction, a savepoint
//! nested in it, or a pooled connection in tests. Nothing here opens or
//! commits a transaction.

use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CanonicalFields, ContributorEntry, SourceMapping, SyncStatus};

/// Largest number of ids bound into one `IN (...)` list.
const LOOKUP_CHUNK: usize = 500;

// ═══════════════════════════════════════════════════════════════════════
// Publications
// ═══════════════════════════════════════════════════════════════════════

/// Insert a new publication and return its generated id.
pub async fn create_publication(
    conn: &mut SqliteConnection,
    fields: &CanonicalFields,
    now: i64,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO publications (id, title, description, resource_type, owner, source, external_id,
            source_ref, source_url, resolvable_id, external_doi, mint_status, language,
            publication_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.resource_type.as_str())
    .bind(&fields.owner)
    .bind(&fields.source)
    .bind(&fields.external_id)
    .bind(&fields.source_ref)
    .bind(&fields.source_url)
    .bind(&fields.resolvable_id)
    .bind(&fields.external_doi)
    .bind(fields.mint_status.as_str())
    .bind(&fields.language)
    .bind(&fields.publication_date)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

/// Overwrite a publication's content fields in place.
///
/// The owner and `created_at` are kept. A `None` resolvable id keeps the
/// stored one (it may have been minted since the first import), and the
/// stored mint status goes with it. Returns the resolvable id now stored.
pub async fn update_publication(
    conn: &mut SqliteConnection,
    publication_id: &str,
    fields: &CanonicalFields,
    now: i64,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query(
        r#"
        UPDATE publications SET
            title = ?1,
            description = ?2,
            resource_type = ?3,
            source = ?4,
            external_id = ?5,
            source_ref = ?6,
            source_url = ?7,
            mint_status = CASE WHEN ?8 IS NULL AND resolvable_id IS NOT NULL
                THEN mint_status ELSE ?9 END,
            resolvable_id = COALESCE(?8, resolvable_id),
            external_doi = ?10,
            language = ?11,
            publication_date = ?12,
            updated_at = ?13
        WHERE id = ?14
        RETURNING resolvable_id
        "#,
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.resource_type.as_str())
    .bind(&fields.source)
    .bind(&fields.external_id)
    .bind(&fields.source_ref)
    .bind(&fields.source_url)
    .bind(&fields.resolvable_id)
    .bind(fields.mint_status.as_str())
    .bind(&fields.external_doi)
    .bind(&fields.language)
    .bind(&fields.publication_date)
    .bind(now)
    .bind(publication_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(row.try_get("resolvable_id")?),
        None => Err(StoreError::MissingPublication(publication_id.to_string())),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Contributors
// ═══════════════════════════════════════════════════════════════════════

/// Delete every contributor of a publication. Returns the number removed.
pub async fn delete_contributors(
    conn: &mut SqliteConnection,
    publication_id: &str,
) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM contributors WHERE publication_id = ?")
        .bind(publication_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Insert contributors in list order; `position` is the list index.
pub async fn insert_contributors(
    conn: &mut SqliteConnection,
    publication_id: &str,
    contributors: &[ContributorEntry],
) -> Result<(), StoreError> {
    for (position, c) in contributors.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO contributors (id, publication_id, position, family_name, given_name,
                identifier, identifier_type, role)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(publication_id)
        .bind(position as i64)
        .bind(&c.family_name)
        .bind(&c.given_name)
        .bind(&c.identifier)
        .bind(&c.identifier_type)
        .bind(c.role.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Source mappings
// ═══════════════════════════════════════════════════════════════════════

/// Insert a new mapping.
///
/// Never overwrites: an existing `(source, external_id)` row surfaces as
/// [`StoreError::Conflict`].
pub async fn insert_mapping(
    conn: &mut SqliteConnection,
    mapping: &SourceMapping,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO source_mappings (source, external_id, publication_id, fingerprint,
            last_synced_at, sync_status, last_error, retry_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&mapping.source)
    .bind(&mapping.external_id)
    .bind(&mapping.publication_id)
    .bind(&mapping.fingerprint)
    .bind(mapping.last_synced_at)
    .bind(mapping.sync_status.as_str())
    .bind(&mapping.last_error)
    .bind(mapping.retry_count)
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::from_mapping_insert(e, &mapping.source, &mapping.external_id))?;
    Ok(())
}

/// Record a successful re-sync: new fingerprint, fresh timestamp, status
/// `synced`, last error cleared and retry counter reset.
pub async fn update_mapping(
    conn: &mut SqliteConnection,
    source: &str,
    external_id: &str,
    fingerprint: &str,
    now: i64,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE source_mappings SET
            fingerprint = ?,
            last_synced_at = ?,
            sync_status = ?,
            last_error = NULL,
            retry_count = 0
        WHERE source = ? AND external_id = ?
        "#,
    )
    .bind(fingerprint)
    .bind(now)
    .bind(SyncStatus::Synced.as_str())
    .bind(source)
    .bind(external_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::MissingMapping {
            source_name: source.to_string(),
            external_id: external_id.to_string(),
        });
    }
    Ok(())
}

/// Bulk lookup of the mappings for `ids` under one source.
pub async fn find_mappings_by_source_and_ids(
    conn: &mut SqliteConnection,
    source: &str,
    ids: &[String],
) -> Result<Vec<SourceMapping>, StoreError> {
    let mut mappings = Vec::new();
    for chunk in ids.chunks(LOOKUP_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT source, external_id, publication_id, fingerprint, last_synced_at, \
             sync_status, last_error, retry_count FROM source_mappings WHERE source = ",
        );
        builder.push_bind(source);
        builder.push(" AND external_id IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&mut *conn).await?;
        for row in &rows {
            mappings.push(mapping_from_row(row)?);
        }
    }
    Ok(mappings)
}

/// Single mapping lookup.
pub async fn find_mapping(
    conn: &mut SqliteConnection,
    source: &str,
    external_id: &str,
) -> Result<Option<SourceMapping>, StoreError> {
    let row = sqlx::query(
        "SELECT source, external_id, publication_id, fingerprint, last_synced_at, sync_status, \
         last_error, retry_count FROM source_mappings WHERE source = ? AND external_id = ?",
    )
    .bind(source)
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(mapping_from_row).transpose()
}

/// Every mapping that points at a publication.
pub async fn mappings_for_publication(
    conn: &mut SqliteConnection,
    publication_id: &str,
) -> Result<Vec<SourceMapping>, StoreError> {
    let rows = sqlx::query(
        "SELECT source, external_id, publication_id, fingerprint, last_synced_at, sync_status, \
         last_error, retry_count FROM source_mappings WHERE publication_id = ? \
         ORDER BY source, external_id",
    )
    .bind(publication_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(mapping_from_row).collect()
}

fn mapping_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SourceMapping, StoreError> {
    let status: String = row.try_get("sync_status")?;
    Ok(SourceMapping {
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        publication_id: row.try_get("publication_id")?,
        fingerprint: row.try_get("fingerprint")?,
        last_synced_at: row.try_get("last_synced_at")?,
        sync_status: SyncStatus::parse(&status),
        last_error: row.try_get("last_error")?,
        retry_count: row.try_get("retry_count")?,
    })
}
