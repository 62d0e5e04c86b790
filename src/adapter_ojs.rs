//! Journal platform connector (OJS 3.x REST API).
//!
//! Submissions carry one or more publication versions; the one named by
//! `currentPublicationId` is imported. Text fields are localized maps
//! (`{"en_US": "...", "fr_CA": "..."}`), resolved by preferring the
//! submission locale, then English, then any non-empty value.
//!
//! # Configuration
//!
//! ```toml
//! [sources.ojs]
//! base_url = "https://journals.example.edu/index.php/myjournal"
//! api_token = "eyJ0eXAiOiJKV1Qi..."   # sent as `Authorization: Bearer`
//! ```
//!
//! # Page parameters
//!
//! - `status` → `status` (workflow status code; defaults to `3`, published)
//! - `query` → `searchPhrase`
//!
//! # DOI-equivalent fields
//!
//! `pub-id::doi` on the publication (3.2/3.3) or `doiObject.doi` (3.4+).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::adapter::{
    canonical_from_record, first_doi, normalize_orcid, parse_timestamp, send_json, strip_tags,
    SourceAdapter,
};
use crate::config::SourceConfig;
use crate::error::AdapterError;
use crate::models::{
    ContributorRole, ExternalRecord, MappedRecord, PageEntry, PageParams, RecordCreator,
    RecordDate, RecordIdentifier, ResourceType,
};

const SOURCE: &str = "ojs";
const PAGE_CAP: u32 = 100;

/// Workflow status code of published submissions.
const STATUS_PUBLISHED: &str = "3";

/// Adapter for a journal platform installation.
pub struct OjsAdapter {
    client: reqwest::Client,
    config: SourceConfig,
}

impl OjsAdapter {
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
impl SourceAdapter for OjsAdapter {
    fn source_name(&self) -> &str {
        SOURCE
    }

    fn description(&self) -> &str {
        "Published articles from a journal platform"
    }

    fn max_page_size(&self) -> u32 {
        self.config.page_cap(PAGE_CAP)
    }

    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError> {
        if external_id.parse::<u64>().is_err() {
            return Err(AdapterError::invalid(
                external_id,
                "submission ids are numeric",
            ));
        }
        let submission: Submission = send_json(
            SOURCE,
            self.get(&format!("/api/v1/submissions/{}", external_id)),
            Some(external_id),
        )
        .await?;
        submission.into_record()
    }

    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
        let params = params.clamped(self.max_page_size());
        let status = params
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(STATUS_PUBLISHED);

        let mut request = self.get("/api/v1/submissions").query(&[
            ("status", status.to_string()),
            ("count", params.size.to_string()),
            ("offset", params.offset().to_string()),
            ("orderBy", "dateSubmitted".to_string()),
            ("orderDirection", "DESC".to_string()),
        ]);
        if let Some(phrase) = params.query_phrase() {
            request = request.query(&[("searchPhrase", phrase)]);
        }

        let listing: SubmissionList = send_json(SOURCE, request, None).await?;
        let entries: Vec<PageEntry> = listing
            .items
            .into_iter()
            .map(|s| PageEntry::Summary {
                external_id: s.id.to_string(),
            })
            .collect();

        debug!(source = SOURCE, page = params.page, count = entries.len(), "fetched page");
        Ok(entries)
    }

    fn map_to_canonical(
        &self,
        record: &ExternalRecord,
        owner: &str,
    ) -> Result<MappedRecord, AdapterError> {
        let doi = first_doi(record.identifiers_of("doi"));
        canonical_from_record(SOURCE, record, owner, doi, ResourceType::JournalArticle)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Wire format
// ═══════════════════════════════════════════════════════════════════════

/// A localized text field. Older releases send plain strings for some keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Localized {
    Map(BTreeMap<String, Option<String>>),
    Plain(String),
}

impl Localized {
    /// Best value for `locale`: exact match, then English, then any.
    fn pick(&self, locale: Option<&str>) -> Option<String> {
        let usable = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match self {
            Localized::Plain(s) => usable(&Some(s.clone())),
            Localized::Map(map) => locale
                .and_then(|l| map.get(l).and_then(usable))
                .or_else(|| {
                    map.iter()
                        .filter(|(k, _)| k.starts_with("en"))
                        .find_map(|(_, v)| usable(v))
                })
                .or_else(|| map.values().find_map(usable)),
        }
    }
}

fn pick(field: &Option<Localized>, locale: Option<&str>) -> Option<String> {
    field.as_ref().and_then(|f| f.pick(locale))
}

#[derive(Debug, Deserialize)]
struct SubmissionList {
    #[serde(default)]
    items: Vec<SubmissionSummary>,
}

#[derive(Debug, Deserialize)]
struct SubmissionSummary {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submission {
    id: u64,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    current_publication_id: Option<u64>,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    url_published: Option<String>,
    #[serde(default)]
    publications: Vec<Publication>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Publication {
    id: u64,
    #[serde(default)]
    full_title: Option<Localized>,
    #[serde(default)]
    title: Option<Localized>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<Localized>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default, rename = "pub-id::doi")]
    pub_id_doi: Option<String>,
    #[serde(default)]
    doi_object: Option<Value>,
    #[serde(default)]
    url_published: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    #[serde(default)]
    given_name: Option<Localized>,
    #[serde(default)]
    family_name: Option<Localized>,
    #[serde(default)]
    orcid: Option<String>,
    #[serde(default)]
    seq: i64,
}

impl Submission {
    fn into_record(self) -> Result<ExternalRecord, AdapterError> {
        let external_id = self.id.to_string();
        let current = self.current_publication_id;
        let publication = self
            .publications
            .iter()
            .find(|p| Some(p.id) == current)
            .or_else(|| self.publications.last())
            .ok_or_else(|| {
                AdapterError::decode(
                    SOURCE,
                    format!("submission {} has no publication", external_id),
                )
            })?;

        let locale = publication.locale.as_deref().or(self.locale.as_deref());
        let mut record = ExternalRecord::new(&external_id);
        record.title = pick(&publication.full_title, locale).or_else(|| pick(&publication.title, locale));
        if let Some(text) = pick(&publication.abstract_text, locale) {
            let text = strip_tags(&text);
            if !text.is_empty() {
                record.descriptions.push(text);
            }
        }

        let doi_object = publication
            .doi_object
            .as_ref()
            .and_then(|d| d.get("doi"))
            .and_then(Value::as_str);
        for doi in publication.pub_id_doi.as_deref().into_iter().chain(doi_object) {
            if !doi.trim().is_empty() {
                record.identifiers.push(RecordIdentifier::new("doi", doi.trim()));
            }
        }

        if let Some(date) = &publication.date_published {
            record.dates.push(RecordDate::new("published", date.as_str()));
        }

        let mut authors: Vec<&Author> = publication.authors.iter().collect();
        authors.sort_by_key(|a| a.seq);
        record.creators = authors
            .into_iter()
            .filter_map(|a| creator_from_author(a, locale))
            .collect();

        record.resource_type = Some("article".to_string());
        record.language = locale.map(str::to_string);
        record.landing_url = publication
            .url_published
            .clone()
            .or_else(|| self.url_published.clone());
        record.last_modified = self.last_modified.as_deref().and_then(parse_timestamp);
        Ok(record)
    }
}

fn creator_from_author(author: &Author, locale: Option<&str>) -> Option<RecordCreator> {
    let given = pick(&author.given_name, locale);
    let family = pick(&author.family_name, locale);
    let name = match (&family, &given) {
        (Some(f), Some(g)) => format!("{}, {}", f, g),
        (Some(f), None) => f.clone(),
        // Single-name authors are stored as given name only.
        (None, Some(g)) => g.clone(),
        (None, None) => return None,
    };

    let mut creator = RecordCreator::named(name, ContributorRole::Author);
    creator.family_name = family.or_else(|| given.clone());
    creator.given_name = if creator.family_name == given { None } else { given };
    if let Some(orcid) = author.orcid.as_deref().and_then(normalize_orcid) {
        creator.identifier = Some(orcid);
        creator.identifier_type = Some("orcid".to_string());
    }
    Some(creator)
}
