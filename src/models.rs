//! Core data models used throughout pubharvest.
//!
//! These types represent the external records produced by source adapters,
//! the canonical publication fields written to the store, and the per-item
//! and per-batch results reported back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard ceiling on the number of records one batch may touch, regardless of
/// what a source or the caller asks for.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

// ═══════════════════════════════════════════════════════════════════════
// External side
// ═══════════════════════════════════════════════════════════════════════

/// An identifier attached to an external record (DOI, handle, URI, ISBN...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentifier {
    /// Lowercase scheme label, e.g. `"doi"`, `"handle"`, `"uri"`.
    pub scheme: String,
    pub value: String,
}

impl RecordIdentifier {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }
}

/// A dated event on an external record (`issued`, `accessioned`, `published`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDate {
    pub kind: String,
    pub value: String,
}

impl RecordDate {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// A person credited on an external record, before canonical mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCreator {
    /// Display name as the source stores it (often `"Family, Given"`).
    pub name: String,
    /// Already-split given name, when the source provides one.
    pub given_name: Option<String>,
    /// Already-split family name, when the source provides one.
    pub family_name: Option<String>,
    pub identifier: Option<String>,
    pub identifier_type: Option<String>,
    pub role: ContributorRole,
}

impl RecordCreator {
    /// A creator known only by a display name.
    pub fn named(name: impl Into<String>, role: ContributorRole) -> Self {
        Self {
            name: name.into(),
            given_name: None,
            family_name: None,
            identifier: None,
            identifier_type: None,
            role,
        }
    }
}

/// Typed view of one record held by an external system.
///
/// Each adapter decodes its own wire format into this shape; the engine never
/// sees source-specific JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    /// Stable id of the record inside its source system.
    pub external_id: String,
    pub title: Option<String>,
    pub descriptions: Vec<String>,
    pub identifiers: Vec<RecordIdentifier>,
    pub dates: Vec<RecordDate>,
    pub creators: Vec<RecordCreator>,
    /// Source-side type label (`"Article"`, `"Thesis"`, `"dataset"`).
    pub resource_type: Option<String>,
    pub language: Option<String>,
    /// Human-facing landing page. Not part of the fingerprint.
    pub landing_url: Option<String>,
    /// Source-side modification time. Not part of the fingerprint.
    pub last_modified: Option<DateTime<Utc>>,
}

impl ExternalRecord {
    /// An empty record carrying only its id; adapters fill in the rest.
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: None,
            descriptions: Vec::new(),
            identifiers: Vec::new(),
            dates: Vec::new(),
            creators: Vec::new(),
            resource_type: None,
            language: None,
            landing_url: None,
            last_modified: None,
        }
    }

    /// All identifier values recorded under `scheme`.
    pub fn identifiers_of<'a>(&'a self, scheme: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.identifiers
            .iter()
            .filter(move |i| i.scheme == scheme)
            .map(|i| i.value.as_str())
    }

    /// First date of the given kind, if any.
    pub fn date_of(&self, kind: &str) -> Option<&str> {
        self.dates
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.value.as_str())
    }
}

/// One entry of a fetched page.
///
/// Some listing endpoints return complete records, others only ids; the
/// batch manager fetches the detail for summaries before reconciling.
#[derive(Debug, Clone)]
pub enum PageEntry {
    Full(ExternalRecord),
    Summary { external_id: String },
}

impl PageEntry {
    pub fn external_id(&self) -> &str {
        match self {
            PageEntry::Full(record) => &record.external_id,
            PageEntry::Summary { external_id } => external_id,
        }
    }
}

/// Paging and filter parameters for [`SourceAdapter::fetch_page`](crate::adapter::SourceAdapter::fetch_page).
///
/// Which optional filters are honoured is source-specific; see each adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Zero-based page number.
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
    /// Free-text search phrase.
    #[serde(default)]
    pub query: Option<String>,
    /// Source status filter (journal workflow status codes).
    #[serde(default)]
    pub status: Option<String>,
    /// Collection or sub-repository restriction.
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            query: None,
            status: None,
            scope: None,
        }
    }
}

impl PageParams {
    /// Copy of these params with `size` forced into `1..=max`.
    pub fn clamped(&self, max: u32) -> PageParams {
        let max = max.clamp(1, MAX_PAGE_SIZE);
        PageParams {
            size: self.size.clamp(1, max),
            ..self.clone()
        }
    }

    /// Record offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    /// The search phrase, if one was given and is not blank.
    pub fn query_phrase(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical side
// ═══════════════════════════════════════════════════════════════════════

/// Controlled vocabulary for the publication resource-type reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    JournalArticle,
    Dataset,
    Thesis,
    Book,
    BookChapter,
    ConferencePaper,
    Report,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::JournalArticle => "journal_article",
            ResourceType::Dataset => "dataset",
            ResourceType::Thesis => "thesis",
            ResourceType::Book => "book",
            ResourceType::BookChapter => "book_chapter",
            ResourceType::ConferencePaper => "conference_paper",
            ResourceType::Report => "report",
            ResourceType::Other => "other",
        }
    }

    /// Best-effort classification of a free-form source type label.
    pub fn from_label(label: &str) -> ResourceType {
        let label = label.to_lowercase();
        if label.contains("chapter") {
            ResourceType::BookChapter
        } else if label.contains("article") || label.contains("journal") {
            ResourceType::JournalArticle
        } else if label.contains("dataset") || label.contains("data set") {
            ResourceType::Dataset
        } else if label.contains("thesis") || label.contains("dissertation") {
            ResourceType::Thesis
        } else if label.contains("conference") || label.contains("proceeding") {
            ResourceType::ConferencePaper
        } else if label.contains("report") || label.contains("working paper") {
            ResourceType::Report
        } else if label.contains("book") {
            ResourceType::Book
        } else {
            ResourceType::Other
        }
    }
}

/// Whether a publication still needs a minted identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintStatus {
    /// The source supplied a usable DOI.
    NotNeeded,
    /// No usable identifier; the minting task should issue one.
    Pending,
}

impl MintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MintStatus::NotNeeded => "not_needed",
            MintStatus::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> MintStatus {
        match value {
            "not_needed" => MintStatus::NotNeeded,
            _ => MintStatus::Pending,
        }
    }
}

/// Publication fields produced by an adapter's canonical mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFields {
    pub title: String,
    pub description: Option<String>,
    pub resource_type: ResourceType,
    /// Owner label of whoever requested the import.
    pub owner: String,
    /// Source name (provenance).
    pub source: String,
    /// Id inside the source (provenance).
    pub external_id: String,
    /// Placeholder reference `"{source}:{external_id}"`; never resolvable.
    pub source_ref: String,
    pub source_url: Option<String>,
    /// Canonical resolvable identifier. Set only from a usable DOI.
    pub resolvable_id: Option<String>,
    pub external_doi: Option<String>,
    pub mint_status: MintStatus,
    pub language: Option<String>,
    pub publication_date: Option<String>,
}

/// Role reference of a contributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorRole {
    Author,
    Editor,
    Advisor,
    Other,
}

impl ContributorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributorRole::Author => "author",
            ContributorRole::Editor => "editor",
            ContributorRole::Advisor => "advisor",
            ContributorRole::Other => "other",
        }
    }

    pub fn parse(value: &str) -> ContributorRole {
        match value {
            "author" => ContributorRole::Author,
            "editor" => ContributorRole::Editor,
            "advisor" => ContributorRole::Advisor,
            _ => ContributorRole::Other,
        }
    }
}

/// A contributor row as stored for a canonical publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributorEntry {
    pub family_name: String,
    pub given_name: Option<String>,
    /// e.g. `https://orcid.org/0000-0002-1825-0097`
    pub identifier: Option<String>,
    pub identifier_type: Option<String>,
    pub role: ContributorRole,
}

/// Output of [`SourceAdapter::map_to_canonical`](crate::adapter::SourceAdapter::map_to_canonical).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRecord {
    pub fields: CanonicalFields,
    pub contributors: Vec<ContributorEntry>,
}

/// Sync status stored on a source mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> SyncStatus {
        match value {
            "synced" => SyncStatus::Synced,
            _ => SyncStatus::Error,
        }
    }
}

/// Link between one external record and one canonical publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceMapping {
    pub source: String,
    pub external_id: String,
    pub publication_id: String,
    pub fingerprint: String,
    /// Unix seconds.
    pub last_synced_at: i64,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
    pub retry_count: i64,
}

// ═══════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════

/// Outcome classification reported per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Updated,
    Unchanged,
    Skipped,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Created => "created",
            ItemStatus::Updated => "updated",
            ItemStatus::Unchanged => "unchanged",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Error => "error",
        }
    }
}

/// Result for one record of a batch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemResult {
    pub external_id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of one batch run, items in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub items: Vec<BatchItemResult>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item result and bump the matching counter.
    pub fn record(&mut self, item: BatchItemResult) {
        match item.status {
            ItemStatus::Created => self.created += 1,
            ItemStatus::Updated => self.updated += 1,
            ItemStatus::Unchanged => self.unchanged += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Error => self.errors += 1,
        }
        self.total += 1;
        self.items.push(item);
    }

    /// Number of items that reached a non-error terminal state.
    pub fn successful(&self) -> usize {
        self.total - self.errors
    }
}
