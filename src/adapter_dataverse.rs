//! Research-data repository connector (Dataverse native + search APIs).
//!
//! Datasets are addressed by their persistent id (`doi:10.5072/FK2/ABCDEF`
//! or `hdl:...`), which doubles as the external id. The search API returns
//! summaries only, so every page entry is fetched again through the native
//! API before reconciliation.
//!
//! # Configuration
//!
//! ```toml
//! [sources.dataverse]
//! base_url = "https://data.example.edu"
//! api_token = "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"   # sent as `X-Dataverse-key`
//! ```
//!
//! # Page parameters
//!
//! - `query` → search `q` (defaults to `*`)
//! - `scope` → `subtree` (a dataverse alias)
//!
//! # DOI-equivalent fields
//!
//! The dataset persistent id when its protocol is `doi`. Handle-based
//! datasets have no DOI and are queued for minting.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::adapter::{
    canonical_from_record, normalize_doi, normalize_orcid, parse_timestamp, send_json,
    SourceAdapter,
};
use crate::config::SourceConfig;
use crate::error::AdapterError;
use crate::models::{
    ContributorRole, ExternalRecord, MappedRecord, PageEntry, PageParams, RecordCreator,
    RecordDate, RecordIdentifier, ResourceType,
};

const SOURCE: &str = "dataverse";
const PAGE_CAP: u32 = 100;

/// Adapter for a research-data repository installation.
pub struct DataverseAdapter {
    client: reqwest::Client,
    config: SourceConfig,
}

impl DataverseAdapter {
    pub fn new(client: reqwest::Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{}", self.config.base(), path))
            .header("Accept", "application/json");
        match &self.config.api_token {
            Some(token) => request.header("X-Dataverse-key", token),
            None => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for DataverseAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn description(&self) -> &str {
        "Datasets from a research-data repository"
    }

    fn max_page_size(&self) -> u32 {
        self.config.page_cap(PAGE_CAP)
    }

    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError> {
        let request = self
            .get("/api/datasets/:persistentId/")
            .query(&[("persistentId", external_id)]);
        let envelope: Envelope<Dataset> = send_json(SOURCE, request, Some(external_id)).await?;
        envelope.data.into_record()
    }

    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
        let params = params.clamped(self.max_page_size());
        let mut request = self.get("/api/search").query(&[
            ("q", params.query_phrase().unwrap_or("*").to_string()),
            ("type", "dataset".to_string()),
            ("start", params.offset().to_string()),
            ("per_page", params.size.to_string()),
            ("sort", "date".to_string()),
            ("order", "desc".to_string()),
        ]);
        if let Some(alias) = &params.scope {
            request = request.query(&[("subtree", alias.as_str())]);
        }

        let envelope: Envelope<SearchData> = send_json(SOURCE, request, None).await?;
        let entries: Vec<PageEntry> = envelope
            .data
            .items
            .into_iter()
            .filter_map(|hit| hit.global_id)
            .map(|external_id| PageEntry::Summary { external_id })
            .collect();

        debug!(source = SOURCE, page = params.page, count = entries.len(), "fetched page");
        Ok(entries)
    }

    fn map_to_canonical(
        &self,
        record: &ExternalRecord,
        owner: &str,
    ) -> Result<MappedRecord, AdapterError> {
        let doi = record.identifiers_of("doi").find_map(normalize_doi);
        canonical_from_record(SOURCE, record, owner, doi, ResourceType::Dataset)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    global_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Dataset {
    protocol: String,
    authority: String,
    identifier: String,
    #[serde(default)]
    persistent_url: Option<String>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    latest_version: Option<DatasetVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetVersion {
    #[serde(default)]
    last_update_time: Option<String>,
    #[serde(default)]
    metadata_blocks: MetadataBlocks,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataBlocks {
    #[serde(default)]
    citation: Option<CitationBlock>,
}

#[derive(Debug, Deserialize)]
struct CitationBlock {
    #[serde(default)]
    fields: Vec<CitationField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationField {
    type_name: String,
    value: Value,
}

impl Dataset {
    fn persistent_id(&self) -> String {
        format!("{}:{}/{}", self.protocol, self.authority, self.identifier)
    }

    fn into_record(self) -> Result<ExternalRecord, AdapterError> {
        let external_id = self.persistent_id();
        let mut record = ExternalRecord::new(&external_id);
        record.resource_type = Some("dataset".to_string());
        record.landing_url = self.persistent_url.clone();

        let handle = format!("{}/{}", self.authority, self.identifier);
        match self.protocol.as_str() {
            "doi" => record.identifiers.push(RecordIdentifier::new("doi", handle)),
            "hdl" => record.identifiers.push(RecordIdentifier::new("handle", handle)),
            other => record
                .identifiers
                .push(RecordIdentifier::new(other.to_string(), handle)),
        }
        if let Some(date) = &self.publication_date {
            record.dates.push(RecordDate::new("published", date.as_str()));
        }

        let version = self.latest_version.ok_or_else(|| {
            AdapterError::decode(SOURCE, format!("dataset {} has no latestVersion", external_id))
        })?;
        record.last_modified = version.last_update_time.as_deref().and_then(parse_timestamp);

        let fields = version
            .metadata_blocks
            .citation
            .map(|c| c.fields)
            .unwrap_or_default();
        for field in &fields {
            apply_citation_field(&mut record, field);
        }

        Ok(record)
    }
}

fn apply_citation_field(record: &mut ExternalRecord, field: &CitationField) {
    match field.type_name.as_str() {
        "title" => record.title = field.value.as_str().map(str::to_string),
        "dsDescription" => {
            for entry in compound_entries(&field.value) {
                if let Some(text) = sub_value(entry, "dsDescriptionValue") {
                    record.descriptions.push(text.to_string());
                }
            }
        }
        "author" => {
            for entry in compound_entries(&field.value) {
                if let Some(name) = sub_value(entry, "authorName") {
                    let mut creator = RecordCreator::named(name, ContributorRole::Author);
                    apply_author_identifier(
                        &mut creator,
                        sub_value(entry, "authorIdentifierScheme"),
                        sub_value(entry, "authorIdentifier"),
                    );
                    record.creators.push(creator);
                }
            }
        }
        "contributor" => {
            for entry in compound_entries(&field.value) {
                if let Some(name) = sub_value(entry, "contributorName") {
                    let role = match sub_value(entry, "contributorType") {
                        Some(t) if t.eq_ignore_ascii_case("editor") => ContributorRole::Editor,
                        Some(t) if t.eq_ignore_ascii_case("supervisor") => {
                            ContributorRole::Advisor
                        }
                        _ => ContributorRole::Other,
                    };
                    record.creators.push(RecordCreator::named(name, role));
                }
            }
        }
        "productionDate" => {
            if let Some(date) = field.value.as_str() {
                record.dates.push(RecordDate::new("created", date));
            }
        }
        "distributionDate" => {
            if let Some(date) = field.value.as_str() {
                record.dates.push(RecordDate::new("issued", date));
            }
        }
        "language" => {
            record.language = match &field.value {
                Value::Array(values) => values.iter().find_map(Value::as_str).map(str::to_string),
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
        }
        "otherId" => {
            for entry in compound_entries(&field.value) {
                if let Some(value) = sub_value(entry, "otherIdValue") {
                    let scheme = sub_value(entry, "otherIdAgency")
                        .unwrap_or("other")
                        .to_lowercase();
                    record
                        .identifiers
                        .push(RecordIdentifier::new(scheme, value));
                }
            }
        }
        _ => {}
    }
}

fn apply_author_identifier(
    creator: &mut RecordCreator,
    scheme: Option<&str>,
    identifier: Option<&str>,
) {
    let (Some(scheme), Some(identifier)) = (scheme, identifier) else {
        return;
    };
    if scheme.eq_ignore_ascii_case("orcid") {
        if let Some(url) = normalize_orcid(identifier) {
            creator.identifier = Some(url);
            creator.identifier_type = Some("orcid".to_string());
        }
    } else {
        creator.identifier = Some(identifier.trim().to_string());
        creator.identifier_type = Some(scheme.to_lowercase());
    }
}

/// Entries of a compound field; a non-multiple compound is a single object.
fn compound_entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

/// Primitive value of a named child inside a compound entry.
fn sub_value<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry
        .get(key)?
        .get("value")?
        .as_str()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
