//! Publication retrieval by ID.
//!
//! Fetches a canonical publication with its contributors and the source
//! mappings that point at it. Used by both `pubh get` and
//! `GET /publications/{id}`.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::{ContributorRole, MintStatus, SourceMapping};
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct PublicationResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub resource_type: String,
    pub owner: String,
    pub source: String,
    pub external_id: String,
    pub source_ref: String,
    pub source_url: Option<String>,
    pub resolvable_id: Option<String>,
    pub external_doi: Option<String>,
    pub mint_status: MintStatus,
    pub language: Option<String>,
    pub publication_date: Option<String>,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub contributors: Vec<ContributorResponse>,
    pub mappings: Vec<SourceMapping>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContributorResponse {
    pub position: i64,
    pub family_name: String,
    pub given_name: Option<String>,
    pub identifier: Option<String>,
    pub identifier_type: Option<String>,
    pub role: ContributorRole,
}

/// Load a publication, or `Ok(None)` if no row has this id.
pub async fn find_publication(pool: &SqlitePool, id: &str) -> Result<Option<PublicationResponse>> {
    let row = sqlx::query(
        "SELECT id, title, description, resource_type, owner, source, external_id, source_ref, \
         source_url, resolvable_id, external_doi, mint_status, language, publication_date, \
         created_at, updated_at FROM publications WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let contributor_rows = sqlx::query(
        "SELECT position, family_name, given_name, identifier, identifier_type, role \
         FROM contributors WHERE publication_id = ? ORDER BY position ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let contributors = contributor_rows
        .iter()
        .map(|r| ContributorResponse {
            position: r.get("position"),
            family_name: r.get("family_name"),
            given_name: r.get("given_name"),
            identifier: r.get("identifier"),
            identifier_type: r.get("identifier_type"),
            role: ContributorRole::parse(r.get::<&str, _>("role")),
        })
        .collect();

    let mut conn = pool.acquire().await?;
    let mappings = store::mappings_for_publication(&mut conn, id).await?;

    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");
    let mint_status: String = row.get("mint_status");

    Ok(Some(PublicationResponse {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        resource_type: row.get("resource_type"),
        owner: row.get("owner"),
        source: row.get("source"),
        external_id: row.get("external_id"),
        source_ref: row.get("source_ref"),
        source_url: row.get("source_url"),
        resolvable_id: row.get("resolvable_id"),
        external_doi: row.get("external_doi"),
        mint_status: MintStatus::parse(&mint_status),
        language: row.get("language"),
        publication_date: row.get("publication_date"),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
        contributors,
        mappings,
    }))
}

/// CLI entry point: prints the publication to stdout.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let publication = find_publication(&pool, id).await?;
    pool.close().await;

    let p = match publication {
        Some(p) => p,
        None => bail!("publication not found: {}", id),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&p)?);
        return Ok(());
    }

    println!("--- Publication ---");
    println!("id:               {}", p.id);
    println!("title:            {}", p.title);
    println!("type:             {}", p.resource_type);
    println!("owner:            {}", p.owner);
    println!("source:           {} / {}", p.source, p.external_id);
    if let Some(ref url) = p.source_url {
        println!("source_url:       {}", url);
    }
    println!(
        "resolvable_id:    {}",
        p.resolvable_id.as_deref().unwrap_or("(none)")
    );
    println!("mint_status:      {}", p.mint_status.as_str());
    if let Some(ref date) = p.publication_date {
        println!("publication_date: {}", date);
    }
    if let Some(ref lang) = p.language {
        println!("language:         {}", lang);
    }
    println!("created_at:       {}", p.created_at);
    println!("updated_at:       {}", p.updated_at);
    println!();

    if let Some(ref description) = p.description {
        println!("--- Description ---");
        println!("{}", description);
        println!();
    }

    println!("--- Contributors ({}) ---", p.contributors.len());
    for c in &p.contributors {
        let name = match &c.given_name {
            Some(given) => format!("{}, {}", c.family_name, given),
            None => c.family_name.clone(),
        };
        match &c.identifier {
            Some(identifier) => println!("{:>3}. {} ({}) {}", c.position + 1, name, c.role.as_str(), identifier),
            None => println!("{:>3}. {} ({})", c.position + 1, name, c.role.as_str()),
        }
    }
    println!();

    println!("--- Mappings ({}) ---", p.mappings.len());
    for m in &p.mappings {
        println!(
            "{}/{}  {}  synced {}",
            m.source,
            m.external_id,
            m.sync_status.as_str(),
            format_ts_iso(m.last_synced_at)
        );
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
