use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Canonical publications
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS publications (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            resource_type TEXT NOT NULL,
            owner TEXT NOT NULL,
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            source_ref TEXT NOT NULL,
            source_url TEXT,
            resolvable_id TEXT,
            external_doi TEXT,
            mint_status TEXT NOT NULL,
            language TEXT,
            publication_date TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Contributors, replaced wholesale on update
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contributors (
            id TEXT PRIMARY KEY,
            publication_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            family_name TEXT NOT NULL,
            given_name TEXT,
            identifier TEXT,
            identifier_type TEXT,
            role TEXT NOT NULL,
            UNIQUE(publication_id, position),
            FOREIGN KEY (publication_id) REFERENCES publications(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One mapping per (source, external_id)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_mappings (
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            publication_id TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            last_synced_at INTEGER NOT NULL,
            sync_status TEXT NOT NULL DEFAULT 'synced',
            last_error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(source, external_id),
            FOREIGN KEY (publication_id) REFERENCES publications(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Outbox read by the identifier minting task
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mint_requests (
            publication_id TEXT PRIMARY KEY,
            requested_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            FOREIGN KEY (publication_id) REFERENCES publications(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_contributors_publication ON contributors(publication_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_mappings_publication ON source_mappings(publication_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_publications_source ON publications(source)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_publications_updated_at ON publications(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
