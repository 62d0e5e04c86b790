#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;

use pubharvest::adapter::{canonical_from_record, normalize_doi, SourceAdapter};
use pubharvest::db;
use pubharvest::error::AdapterError;
use pubharvest::migrate;
use pubharvest::mint::MintQueue;
use pubharvest::models::{
    ContributorRole, ExternalRecord, MappedRecord, PageEntry, PageParams, RecordCreator,
    RecordDate, RecordIdentifier, ResourceType,
};

pub const FAKE: &str = "fake";

/// In-memory source whose records can be edited between runs.
pub struct FakeAdapter {
    records: Mutex<Vec<ExternalRecord>>,
    failing: Mutex<HashSet<String>>,
    summaries: bool,
    page_fails: bool,
    numeric_ids: bool,
    cap: u32,
}

impl FakeAdapter {
    /// Listing returns full records.
    pub fn full(records: Vec<ExternalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failing: Mutex::new(HashSet::new()),
            summaries: false,
            page_fails: false,
            numeric_ids: false,
            cap: 100,
        }
    }

    /// Listing returns ids only; details come from `fetch_one`.
    pub fn summaries(records: Vec<ExternalRecord>) -> Self {
        Self {
            summaries: true,
            ..Self::full(records)
        }
    }

    pub fn unreachable() -> Self {
        Self {
            page_fails: true,
            ..Self::full(Vec::new())
        }
    }

    /// Ids are numbers: `fetch_one("007")` answers with record `7`.
    pub fn with_numeric_ids(mut self) -> Self {
        self.numeric_ids = true;
        self
    }

    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap = cap;
        self
    }

    /// Replace the record with the same id, keeping its listing position.
    pub fn set(&self, record: ExternalRecord) {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.external_id == record.external_id) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
    }

    pub fn fail_fetch(&self, external_id: &str) {
        self.failing.lock().unwrap().insert(external_id.to_string());
    }
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn source_name(&self) -> &str {
        FAKE
    }

    fn description(&self) -> &str {
        "In-memory test records"
    }

    fn max_page_size(&self) -> u32 {
        self.cap
    }

    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError> {
        if self.failing.lock().unwrap().contains(external_id) {
            return Err(AdapterError::fetch(FAKE, "HTTP 503 from fake"));
        }
        let key = if self.numeric_ids {
            external_id.trim_start_matches('0')
        } else {
            external_id
        };
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.external_id == key)
            .cloned()
            .ok_or_else(|| AdapterError::not_found(FAKE, external_id))
    }

    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
        if self.page_fails {
            return Err(AdapterError::fetch(FAKE, "request timed out"));
        }
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .skip(params.offset() as usize)
            .take(params.size as usize)
            .map(|r| {
                if self.summaries {
                    PageEntry::Summary {
                        external_id: r.external_id.clone(),
                    }
                } else {
                    PageEntry::Full(r.clone())
                }
            })
            .collect())
    }

    fn map_to_canonical(
        &self,
        record: &ExternalRecord,
        owner: &str,
    ) -> Result<MappedRecord, AdapterError> {
        let doi = record.identifiers_of("doi").find_map(normalize_doi);
        canonical_from_record(FAKE, record, owner, doi, ResourceType::JournalArticle)
    }
}

/// Mint queue that only remembers what it was asked.
#[derive(Default)]
pub struct RecordingMintQueue {
    pub requests: Mutex<Vec<String>>,
}

impl RecordingMintQueue {
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MintQueue for RecordingMintQueue {
    async fn request_mint(&self, publication_id: &str) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push(publication_id.to_string());
        Ok(())
    }
}

pub fn record(id: &str, title: &str, doi: Option<&str>) -> ExternalRecord {
    let mut r = ExternalRecord::new(id);
    r.title = Some(title.to_string());
    r.descriptions = vec![format!("Abstract of {}", title)];
    r.dates = vec![RecordDate::new("issued", "2022-05-01")];
    r.creators = vec![
        RecordCreator::named("Doe, Jane", ContributorRole::Author),
        RecordCreator::named("Roe, Richard", ContributorRole::Author),
    ];
    if let Some(doi) = doi {
        r.identifiers.push(RecordIdentifier::new("doi", doi));
    }
    r
}

pub async fn setup_db() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("pubharvest.sqlite"))
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// `(external_id, publication_id, last_synced_at, fingerprint)` per mapping.
pub async fn mappings(pool: &SqlitePool) -> HashMap<String, (String, i64, String)> {
    let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
        "SELECT external_id, publication_id, last_synced_at, fingerprint FROM source_mappings",
    )
    .fetch_all(pool)
    .await
    .unwrap();
    rows.into_iter()
        .map(|(id, pid, ts, fp)| (id, (pid, ts, fp)))
        .collect()
}

/// Title, contributor rows and mapping of the publication mapped from `external_id`.
pub async fn snapshot(
    pool: &SqlitePool,
    external_id: &str,
) -> (String, Vec<(String, i64, String, String)>, (String, i64, String)) {
    let mapping = mappings(pool).await.remove(external_id).unwrap();
    let title: String = sqlx::query_scalar("SELECT title FROM publications WHERE id = ?")
        .bind(&mapping.0)
        .fetch_one(pool)
        .await
        .unwrap();
    let contributors: Vec<(String, i64, String, String)> = sqlx::query_as(
        "SELECT id, position, family_name, role FROM contributors \
         WHERE publication_id = ? ORDER BY position",
    )
    .bind(&mapping.0)
    .fetch_all(pool)
    .await
    .unwrap();
    (title, contributors, mapping)
}
