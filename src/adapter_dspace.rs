//! Current-generation institutional repository connector (DSpace 7+ REST).
//!
//! Reads items from the HAL+JSON REST API. Listing endpoints embed complete
//! items, so pages are returned as full records.
//!
//! # Configuration
//!
//! ```toml
//! [sources.dspace]
//! base_url = "https://repository.example.edu/server"
//! # api_token = "eyJhbGciOi..."    # sent as `Authorization: Bearer`
//! # max_page_size = 50
//! ```
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `fetch_one` | `GET {base}/api/core/items/{uuid}` |
//! | `fetch_page` | `GET {base}/api/core/items?page=&size=` |
//! | `fetch_page` with `query` or `scope` | `GET {base}/api/discover/search/objects?dsoType=ITEM&query=&scope=&page=&size=` |
//!
//! # DOI-equivalent fields
//!
//! `dc.identifier.doi`, then any `dc.identifier.uri`, `dc.identifier` or
//! `dc.identifier.other` value that is a `doi:` string or `doi.org` URL.
//! The item handle is never treated as a DOI.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::adapter::{
    canonical_from_record, first_doi, parse_timestamp, send_json, SourceAdapter,
};
use crate::config::SourceConfig;
use crate::error::AdapterError;
use crate::models::{
    ContributorRole, ExternalRecord, MappedRecord, PageEntry, PageParams, RecordCreator,
    RecordDate, RecordIdentifier, ResourceType,
};

const SOURCE: &str = "dspace";
const PAGE_CAP: u32 = 100;

/// Adapter for the current repository REST API.
pub struct DspaceAdapter {
    client: reqwest::Client,
    config: SourceConfig,
}

impl DspaceAdapter {
    pub fn new(client: reqwest::Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{}", self.config.base(), path))
            .header("Accept", "application/json");
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for DspaceAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn description(&self) -> &str {
        "Institutional repository items via the current REST API"
    }

    fn max_page_size(&self) -> u32 {
        self.config.page_cap(PAGE_CAP)
    }

    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError> {
        let item: DspaceItem = send_json(
            SOURCE,
            self.get(&format!("/api/core/items/{}", external_id)),
            Some(external_id),
        )
        .await?;
        Ok(item.into_record())
    }

    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
        let params = params.clamped(self.max_page_size());
        let paging = [
            ("page", params.page.to_string()),
            ("size", params.size.to_string()),
        ];

        let items = if params.query_phrase().is_some() || params.scope.is_some() {
            let mut request = self
                .get("/api/discover/search/objects")
                .query(&[("dsoType", "ITEM")])
                .query(&paging);
            if let Some(q) = params.query_phrase() {
                request = request.query(&[("query", q)]);
            }
            if let Some(scope) = &params.scope {
                request = request.query(&[("scope", scope.as_str())]);
            }
            let response: SearchResponse = send_json(SOURCE, request, None).await?;
            response.into_items()
        } else {
            let request = self.get("/api/core/items").query(&paging);
            let response: ItemPage = send_json(SOURCE, request, None).await?;
            response.embedded.map(|e| e.items).unwrap_or_default()
        };

        debug!(source = SOURCE, page = params.page, count = items.len(), "fetched page");
        Ok(items
            .into_iter()
            .map(|item| PageEntry::Full(item.into_record()))
            .collect())
    }

    fn map_to_canonical(
        &self,
        record: &ExternalRecord,
        owner: &str,
    ) -> Result<MappedRecord, AdapterError> {
        let resource_type = record
            .resource_type
            .as_deref()
            .map(ResourceType::from_label)
            .unwrap_or(ResourceType::Other);
        canonical_from_record(SOURCE, record, owner, dc_doi(record), resource_type)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct DspaceItem {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Vec<MetadataValue>>,
    #[serde(rename = "lastModified", default)]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataValue {
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    place: i64,
}

#[derive(Debug, Deserialize)]
struct ItemPage {
    #[serde(rename = "_embedded", default)]
    embedded: Option<ItemsEmbedded>,
}

#[derive(Debug, Deserialize)]
struct ItemsEmbedded {
    #[serde(default)]
    items: Vec<DspaceItem>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<SearchEmbedded>,
}

#[derive(Debug, Deserialize)]
struct SearchEmbedded {
    #[serde(rename = "searchResult")]
    search_result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(rename = "_embedded", default)]
    embedded: Option<SearchObjects>,
}

#[derive(Debug, Deserialize)]
struct SearchObjects {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    #[serde(rename = "_embedded")]
    embedded: IndexableEmbedded,
}

#[derive(Debug, Deserialize)]
struct IndexableEmbedded {
    #[serde(rename = "indexableObject")]
    indexable_object: DspaceItem,
}

impl SearchResponse {
    fn into_items(self) -> Vec<DspaceItem> {
        self.embedded
            .and_then(|e| e.search_result.embedded)
            .map(|o| {
                o.objects
                    .into_iter()
                    .map(|obj| obj.embedded.indexable_object)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DspaceItem {
    fn into_record(self) -> ExternalRecord {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (key, mut values) in self.metadata {
            values.sort_by_key(|v| v.place);
            for v in values {
                if let Some(value) = v.value {
                    fields.push((key.clone(), value));
                }
            }
        }

        let mut record = record_from_dublin_core(&self.uuid, &fields, self.handle.as_deref());
        if record.title.is_none() {
            record.title = self.name.filter(|n| !n.trim().is_empty());
        }
        record.last_modified = self.last_modified.as_deref().and_then(parse_timestamp);
        record
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Dublin Core mapping (shared with the legacy adapter)
// ═══════════════════════════════════════════════════════════════════════

/// Build a record from `(dc key, value)` pairs in source order.
///
/// Repository-internal dates (`dc.date.accessioned`, `dc.date.available`)
/// and provenance notes are left out; they change without the work changing.
pub(crate) fn record_from_dublin_core(
    external_id: &str,
    fields: &[(String, String)],
    handle: Option<&str>,
) -> ExternalRecord {
    let mut record = ExternalRecord::new(external_id);
    let mut abstracts = Vec::new();
    let mut descriptions = Vec::new();

    for (key, value) in fields {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "dc.title" if record.title.is_none() => record.title = Some(value.to_string()),
            "dc.description.abstract" => abstracts.push(value.to_string()),
            "dc.description" => descriptions.push(value.to_string()),
            "dc.identifier.doi" => record.identifiers.push(RecordIdentifier::new("doi", value)),
            "dc.identifier.uri" => record.identifiers.push(RecordIdentifier::new("uri", value)),
            "dc.identifier.isbn" => record.identifiers.push(RecordIdentifier::new("isbn", value)),
            "dc.identifier.issn" => record.identifiers.push(RecordIdentifier::new("issn", value)),
            "dc.identifier" | "dc.identifier.other" => {
                record.identifiers.push(RecordIdentifier::new("other", value))
            }
            "dc.date.issued" => record.dates.push(RecordDate::new("issued", value)),
            "dc.date.created" => record.dates.push(RecordDate::new("created", value)),
            "dc.contributor.author" | "dc.creator" => record
                .creators
                .push(RecordCreator::named(value, ContributorRole::Author)),
            "dc.contributor.editor" => record
                .creators
                .push(RecordCreator::named(value, ContributorRole::Editor)),
            "dc.contributor.advisor" => record
                .creators
                .push(RecordCreator::named(value, ContributorRole::Advisor)),
            "dc.type" if record.resource_type.is_none() => {
                record.resource_type = Some(value.to_string())
            }
            "dc.language.iso" | "dc.language" if record.language.is_none() => {
                record.language = Some(value.to_string())
            }
            other if other.starts_with("dc.contributor.") => record
                .creators
                .push(RecordCreator::named(value, ContributorRole::Other)),
            _ => {}
        }
    }

    record.descriptions = abstracts;
    record.descriptions.extend(descriptions);
    record.creators.sort_by_key(|c| role_rank(c.role));

    if let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) {
        record
            .identifiers
            .push(RecordIdentifier::new("handle", handle));
        record.landing_url = Some(format!("https://hdl.handle.net/{}", handle));
    }

    record
}

fn role_rank(role: ContributorRole) -> u8 {
    match role {
        ContributorRole::Author => 0,
        ContributorRole::Editor => 1,
        ContributorRole::Advisor => 2,
        ContributorRole::Other => 3,
    }
}

/// DOI from the Dublin Core identifier fields, explicit DOI field first.
pub(crate) fn dc_doi(record: &ExternalRecord) -> Option<String> {
    first_doi(
        record
            .identifiers_of("doi")
            .chain(record.identifiers_of("uri"))
            .chain(record.identifiers_of("other")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MintStatus;
    use serde_json::json;

    fn item_json() -> serde_json::Value {
        json!({
            "id": "1911e8a4-6939-490c-b58b-a5d70f8d91fb",
            "uuid": "1911e8a4-6939-490c-b58b-a5d70f8d91fb",
            "name": "Alpine soil carbon",
            "handle": "123456789/42",
            "inArchive": true,
            "withdrawn": false,
            "lastModified": "2023-03-01T09:30:00.000+00:00",
            "type": "item",
            "metadata": {
                "dc.title": [{ "value": "Alpine soil carbon", "language": "en", "place": 0 }],
                "dc.contributor.author": [
                    { "value": "Roe, Richard", "place": 1 },
                    { "value": "Doe, Jane", "place": 0 }
                ],
                "dc.contributor.advisor": [{ "value": "Poe, Edgar", "place": 0 }],
                "dc.description.abstract": [{ "value": "We measured carbon.", "place": 0 }],
                "dc.description.provenance": [{ "value": "Submitted by admin", "place": 0 }],
                "dc.date.issued": [{ "value": "2021-04", "place": 0 }],
                "dc.date.accessioned": [{ "value": "2023-03-01T09:30:00Z", "place": 0 }],
                "dc.identifier.uri": [
                    { "value": "http://hdl.handle.net/123456789/42", "place": 0 },
                    { "value": "https://doi.org/10.1234/ALPINE.42", "place": 1 }
                ],
                "dc.type": [{ "value": "Thesis", "place": 0 }],
                "dc.language.iso": [{ "value": "en", "place": 0 }]
            }
        })
    }

    fn adapter() -> DspaceAdapter {
        DspaceAdapter::new(
            reqwest::Client::new(),
            SourceConfig {
                base_url: "https://repo.example.edu/server".to_string(),
                api_token: None,
                timeout_secs: 5,
                max_page_size: None,
            },
        )
    }

    #[test]
    fn test_item_decodes_to_record() {
        let item: DspaceItem = serde_json::from_value(item_json()).unwrap();
        let record = item.into_record();

        assert_eq!(record.external_id, "1911e8a4-6939-490c-b58b-a5d70f8d91fb");
        assert_eq!(record.title.as_deref(), Some("Alpine soil carbon"));
        assert_eq!(record.descriptions, vec!["We measured carbon."]);
        assert_eq!(record.date_of("issued"), Some("2021-04"));
        assert!(record.date_of("accessioned").is_none());
        assert_eq!(record.resource_type.as_deref(), Some("Thesis"));
        assert_eq!(record.language.as_deref(), Some("en"));
        assert_eq!(
            record.landing_url.as_deref(),
            Some("https://hdl.handle.net/123456789/42")
        );
        assert!(record.last_modified.is_some());

        // authors ordered by place
        assert_eq!(record.creators[0].name, "Doe, Jane");
        assert_eq!(record.creators[1].name, "Roe, Richard");
    }

    #[test]
    fn test_doi_taken_from_uri_field() {
        let item: DspaceItem = serde_json::from_value(item_json()).unwrap();
        let record = item.into_record();
        let mapped = adapter().map_to_canonical(&record, "library").unwrap();

        assert_eq!(mapped.fields.resolvable_id.as_deref(), Some("10.1234/ALPINE.42"));
        assert_eq!(mapped.fields.mint_status, MintStatus::NotNeeded);
        assert_eq!(mapped.fields.resource_type, ResourceType::Thesis);
        assert_eq!(mapped.contributors.len(), 3);
        assert_eq!(mapped.contributors[2].role, ContributorRole::Advisor);
    }

    #[test]
    fn test_handle_is_not_a_doi() {
        let fields = vec![
            ("dc.title".to_string(), "No DOI here".to_string()),
            (
                "dc.identifier.uri".to_string(),
                "http://hdl.handle.net/123456789/7".to_string(),
            ),
        ];
        let record = record_from_dublin_core("abc", &fields, Some("123456789/7"));
        let mapped = adapter().map_to_canonical(&record, "library").unwrap();
        assert_eq!(mapped.fields.resolvable_id, None);
        assert_eq!(mapped.fields.mint_status, MintStatus::Pending);
    }

    #[test]
    fn test_search_response_unwraps_indexable_objects() {
        let response: SearchResponse = serde_json::from_value(json!({
            "_embedded": {
                "searchResult": {
                    "_embedded": {
                        "objects": [
                            { "_embedded": { "indexableObject": item_json() } }
                        ]
                    }
                }
            }
        }))
        .unwrap();
        let items = response.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].handle.as_deref(), Some("123456789/42"));
    }

    #[test]
    fn test_empty_listing_is_empty_page() {
        let page: ItemPage = serde_json::from_value(json!({ "page": { "number": 0 } })).unwrap();
        assert!(page.embedded.is_none());
    }

    #[test]
    fn test_page_cap_respects_config() {
        let mut a = adapter();
        assert_eq!(a.max_page_size(), PAGE_CAP);
        a.config.max_page_size = Some(25);
        assert_eq!(a.max_page_size(), 25);
    }
}
