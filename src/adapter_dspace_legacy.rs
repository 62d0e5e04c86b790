//! Legacy institutional repository connector (DSpace 5/6 REST).
//!
//! The legacy API returns metadata as a flat `[{key, value, language}]`
//! list and only expands it on request, which makes listing slow; the page
//! cap is kept lower than for the current API.
//!
//! # Configuration
//!
//! ```toml
//! [sources.dspace_legacy]
//! base_url = "https://legacy-repository.example.edu"
//! # api_token = "..."      # sent as `rest-dspace-token`
//! ```
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `fetch_one` | `GET {base}/rest/items/{uuid}?expand=metadata` |
//! | `fetch_page` | `GET {base}/rest/items?expand=metadata&limit=&offset=` |
//! | `fetch_page` with `scope` | `GET {base}/rest/collections/{scope}/items?expand=metadata&limit=&offset=` |
//!
//! The legacy API has no free-text search; `query` and `status` are ignored.
//! DOI-equivalent fields are the same Dublin Core fields as the current API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapter::{canonical_from_record, parse_timestamp, send_json, SourceAdapter};
use crate::adapter_dspace::{dc_doi, record_from_dublin_core};
use crate::config::SourceConfig;
use crate::error::AdapterError;
use crate::models::{ExternalRecord, MappedRecord, PageEntry, PageParams, ResourceType};

const SOURCE: &str = "dspace_legacy";
const PAGE_CAP: u32 = 50;

/// Adapter for the legacy repository REST API.
pub struct LegacyDspaceAdapter {
    client: reqwest::Client,
    config: SourceConfig,
}

impl LegacyDspaceAdapter {
    pub fn new(client: reqwest::Client, config: SourceConfig) -> Self {
        Self { client, config }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{}", self.config.base(), path))
            .header("Accept", "application/json")
            .query(&[("expand", "metadata")]);
        match &self.config.api_token {
            Some(token) => request.header("rest-dspace-token", token),
            None => request,
        }
    }
}

#[async_trait]
impl SourceAdapter for LegacyDspaceAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn description(&self) -> &str {
        "Institutional repository items via the legacy REST API"
    }

    fn max_page_size(&self) -> u32 {
        self.config.page_cap(PAGE_CAP)
    }

    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError> {
        let item: LegacyItem = send_json(
            SOURCE,
            self.get(&format!("/rest/items/{}", external_id)),
            Some(external_id),
        )
        .await?;
        Ok(item.into_record())
    }

    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
        let params = params.clamped(self.max_page_size());
        if params.query_phrase().is_some() {
            warn!(source = SOURCE, "legacy API has no search; ignoring query");
        }

        let path = match &params.scope {
            Some(collection) => format!("/rest/collections/{}/items", collection),
            None => "/rest/items".to_string(),
        };
        let request = self.get(&path).query(&[
            ("limit", params.size.to_string()),
            ("offset", params.offset().to_string()),
        ]);
        let items: Vec<LegacyItem> = send_json(SOURCE, request, None).await?;

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

#[derive(Debug, Deserialize)]
struct LegacyItem {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    handle: Option<String>,
    #[serde(rename = "lastModified", default)]
    last_modified: Option<String>,
    #[serde(default)]
    metadata: Vec<LegacyMetadata>,
}

#[derive(Debug, Deserialize)]
struct LegacyMetadata {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

impl LegacyItem {
    fn into_record(self) -> ExternalRecord {
        let fields: Vec<(String, String)> = self
            .metadata
            .into_iter()
            .filter_map(|m| m.value.map(|v| (m.key, v)))
            .collect();

        let mut record = record_from_dublin_core(&self.uuid, &fields, self.handle.as_deref());
        if record.title.is_none() {
            record.title = self.name.filter(|n| !n.trim().is_empty());
        }
        record.last_modified = self.last_modified.as_deref().and_then(parse_timestamp);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::content_fingerprint;
    use crate::models::MintStatus;
    use serde_json::json;

    fn item_json(last_modified: &str) -> serde_json::Value {
        json!({
            "uuid": "0b4c3f2a-1d2e-4f5a-9b8c-7d6e5f4a3b2c",
            "name": "Coastal erosion report",
            "handle": "10673/88",
            "type": "item",
            "lastModified": last_modified,
            "metadata": [
                { "key": "dc.title", "value": "Coastal erosion report", "language": "en_US" },
                { "key": "dc.contributor.author", "value": "Doe, Jane", "language": null },
                { "key": "dc.identifier.doi", "value": "doi:10.5555/coast.2019", "language": null },
                { "key": "dc.date.issued", "value": "2019", "language": null },
                { "key": "dc.date.available", "value": last_modified, "language": null },
                { "key": "dc.type", "value": "Technical Report", "language": "en_US" }
            ]
        })
    }

    fn adapter() -> LegacyDspaceAdapter {
        LegacyDspaceAdapter::new(
            reqwest::Client::new(),
            SourceConfig {
                base_url: "https://legacy.example.edu/".to_string(),
                api_token: Some("token".to_string()),
                timeout_secs: 5,
                max_page_size: Some(500),
            },
        )
    }

    #[test]
    fn test_flat_metadata_decodes() {
        let item: LegacyItem =
            serde_json::from_value(item_json("2019-06-11 09:12:35.123")).unwrap();
        let record = item.into_record();

        assert_eq!(record.title.as_deref(), Some("Coastal erosion report"));
        assert_eq!(record.creators.len(), 1);
        assert_eq!(record.date_of("issued"), Some("2019"));
        assert!(record.last_modified.is_some());
    }

    #[test]
    fn test_doi_field_maps_to_resolvable_id() {
        let item: LegacyItem =
            serde_json::from_value(item_json("2019-06-11 09:12:35.123")).unwrap();
        let mapped = adapter()
            .map_to_canonical(&item.into_record(), "library")
            .unwrap();

        assert_eq!(mapped.fields.resolvable_id.as_deref(), Some("10.5555/coast.2019"));
        assert_eq!(mapped.fields.mint_status, MintStatus::NotNeeded);
        assert_eq!(mapped.fields.resource_type, ResourceType::Report);
        assert_eq!(mapped.fields.source, "dspace_legacy");
    }

    #[test]
    fn test_repository_dates_do_not_change_fingerprint() {
        let a: LegacyItem =
            serde_json::from_value(item_json("2019-06-11 09:12:35.123")).unwrap();
        let b: LegacyItem =
            serde_json::from_value(item_json("2024-01-02 10:00:00.000")).unwrap();
        assert_eq!(
            content_fingerprint(&a.into_record()),
            content_fingerprint(&b.into_record())
        );
    }

    #[test]
    fn test_configured_cap_never_exceeds_adapter_cap() {
        assert_eq!(adapter().max_page_size(), PAGE_CAP);
    }
}
