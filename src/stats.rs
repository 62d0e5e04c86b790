//! Database statistics and health overview.
//!
//! Summarises what has been harvested: publication and mapping counts per
//! source, mappings in error, outstanding mint requests, and when each
//! source last synced. Used by `pubh stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::mint;

/// Per-source breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub publication_count: i64,
    pub mapping_count: i64,
    pub error_count: i64,
    pub last_sync_ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub publications: i64,
    pub contributors: i64,
    pub mappings: i64,
    pub pending_mints: i64,
    pub by_source: Vec<SourceStats>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<Stats> {
    let publications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM publications")
        .fetch_one(pool)
        .await?;
    let contributors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contributors")
        .fetch_one(pool)
        .await?;
    let mappings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_mappings")
        .fetch_one(pool)
        .await?;
    let pending_mints = mint::pending_count(pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT
            m.source,
            COUNT(DISTINCT m.publication_id) AS publication_count,
            COUNT(*) AS mapping_count,
            SUM(CASE WHEN m.sync_status = 'error' THEN 1 ELSE 0 END) AS error_count,
            MAX(m.last_synced_at) AS last_sync_ts
        FROM source_mappings m
        GROUP BY m.source
        ORDER BY mapping_count DESC, m.source ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_source = rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            publication_count: row.get("publication_count"),
            mapping_count: row.get("mapping_count"),
            error_count: row.get("error_count"),
            last_sync_ts: row.get("last_sync_ts"),
        })
        .collect();

    Ok(Stats {
        publications,
        contributors,
        mappings,
        pending_mints,
        by_source,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = collect_stats(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("pubharvest: Database Stats");
    println!("==========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Publications:  {}", stats.publications);
    println!("  Contributors:  {}", stats.contributors);
    println!("  Mappings:      {}", stats.mappings);
    println!("  Pending mints: {}", stats.pending_mints);

    if !stats.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<16} {:>8} {:>8} {:>6}   {}",
            "SOURCE", "PUBS", "MAPPINGS", "ERRORS", "LAST SYNC"
        );
        println!("  {}", "-".repeat(60));

        for s in &stats.by_source {
            let sync_display = match s.last_sync_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<16} {:>8} {:>8} {:>6}   {}",
                s.source, s.publication_count, s.mapping_count, s.error_count, sync_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_short(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }
}
