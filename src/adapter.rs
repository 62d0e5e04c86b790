//! Source adapter trait, registry, and the helpers adapters share.
//!
//! Every external system is reached through a [`SourceAdapter`]. Adapters
//! own their HTTP client and wire format; the reconciliation engine only
//! sees typed [`ExternalRecord`]s and [`MappedRecord`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               AdapterRegistry                │
//! │  ┌────────┐ ┌──────────┐ ┌─────────┐ ┌─────┐ │
//! │  │ dspace │ │ dspace_  │ │dataverse│ │ ojs │ │
//! │  │        │ │ legacy   │ │         │ │     │ │
//! │  └────────┘ └──────────┘ └─────────┘ └─────┘ │
//! └──────────────────┬───────────────────────────┘
//!                    ▼
//!          batch::run_batch() → reconcile
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::{Config, SourceConfig};
use crate::error::AdapterError;
use crate::models::{
    CanonicalFields, ContributorEntry, ExternalRecord, MappedRecord, MintStatus, PageEntry,
    PageParams, RecordCreator, ResourceType,
};

/// Page cap used by adapters that do not declare their own.
pub const DEFAULT_ADAPTER_PAGE_CAP: u32 = 100;

// ═══════════════════════════════════════════════════════════════════════
// SourceAdapter trait
// ═══════════════════════════════════════════════════════════════════════

/// One external system that publication records can be imported from.
///
/// Network I/O is confined to [`fetch_one`](SourceAdapter::fetch_one) and
/// [`fetch_page`](SourceAdapter::fetch_page). [`fingerprint`](SourceAdapter::fingerprint)
/// and [`map_to_canonical`](SourceAdapter::map_to_canonical) are pure.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pubharvest::adapter::{canonical_from_record, SourceAdapter};
/// use pubharvest::error::AdapterError;
/// use pubharvest::models::{ExternalRecord, MappedRecord, PageEntry, PageParams, ResourceType};
///
/// struct StaticAdapter;
///
/// #[async_trait]
/// impl SourceAdapter for StaticAdapter {
///     fn source_name(&self) -> &str { "static" }
///     fn description(&self) -> &str { "Fixed test records" }
///
///     async fn fetch_one(&self, id: &str) -> Result<ExternalRecord, AdapterError> {
///         Err(AdapterError::not_found("static", id))
///     }
///
///     async fn fetch_page(&self, _p: &PageParams) -> Result<Vec<PageEntry>, AdapterError> {
///         Ok(vec![])
///     }
///
///     fn map_to_canonical(&self, r: &ExternalRecord, owner: &str) -> Result<MappedRecord, AdapterError> {
///         canonical_from_record("static", r, owner, None, ResourceType::Other)
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name stored on mappings and publications (e.g. `"dspace"`).
    fn source_name(&self) -> &str;

    /// One-line description used in `pubh sources`.
    fn description(&self) -> &str;

    /// Largest page this adapter will request; caller sizes are clamped to it.
    fn max_page_size(&self) -> u32 {
        DEFAULT_ADAPTER_PAGE_CAP
    }

    /// Fetch the full record for one external id.
    async fn fetch_one(&self, external_id: &str) -> Result<ExternalRecord, AdapterError>;

    /// Fetch one page of records or record summaries.
    ///
    /// `params.size` has already been clamped by the caller, but adapters
    /// clamp again before building the request.
    async fn fetch_page(&self, params: &PageParams) -> Result<Vec<PageEntry>, AdapterError>;

    /// Content fingerprint used for change detection.
    fn fingerprint(&self, record: &ExternalRecord) -> String {
        content_fingerprint(record)
    }

    /// Map an external record to canonical publication fields and contributors.
    fn map_to_canonical(
        &self,
        record: &ExternalRecord,
        owner: &str,
    ) -> Result<MappedRecord, AdapterError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Fingerprinting
// ═══════════════════════════════════════════════════════════════════════

/// Order-independent content hash over named field values.
///
/// Values are whitespace-normalised, blank values dropped, and the
/// `(name, value)` pairs sorted before hashing, so neither field order nor
/// the order of multi-valued entries affects the result.
#[derive(Debug, Default)]
pub struct Fingerprint {
    entries: Vec<(String, String)>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single optional value.
    pub fn field(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(v) = value {
            self.push(name, v);
        }
        self
    }

    /// Add every value of a multi-valued field.
    pub fn values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for v in values {
            self.push(name, v.as_ref());
        }
        self
    }

    fn push(&mut self, name: &str, value: &str) {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if !normalized.is_empty() {
            self.entries.push((name.to_string(), normalized));
        }
    }

    /// Lowercase hex SHA-256 of the sorted entries.
    pub fn finish(mut self) -> String {
        self.entries.sort();
        self.entries.dedup();
        let mut hasher = Sha256::new();
        for (name, value) in &self.entries {
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Fingerprint over the fields that define a record's content.
///
/// Excludes `landing_url` and `last_modified`, which change without the
/// metadata changing.
pub fn content_fingerprint(record: &ExternalRecord) -> String {
    Fingerprint::new()
        .field("title", record.title.as_deref())
        .values("description", &record.descriptions)
        .values(
            "identifier",
            record
                .identifiers
                .iter()
                .map(|i| format!("{}:{}", i.scheme, i.value)),
        )
        .values(
            "date",
            record.dates.iter().map(|d| format!("{}:{}", d.kind, d.value)),
        )
        .values("creator", record.creators.iter().map(creator_key))
        .field("type", record.resource_type.as_deref())
        .field("language", record.language.as_deref())
        .finish()
}

fn creator_key(creator: &RecordCreator) -> String {
    format!(
        "{}|{}|{}",
        creator.role.as_str(),
        creator.name,
        creator.identifier.as_deref().unwrap_or("")
    )
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical mapping helpers
// ═══════════════════════════════════════════════════════════════════════

/// Shared canonical mapping once an adapter has decided the DOI and type.
///
/// A `Some` DOI becomes both the resolvable identifier and the external DOI
/// and marks minting as not needed; `None` leaves the resolvable identifier
/// unset and marks minting pending.
pub fn canonical_from_record(
    source_name: &str,
    record: &ExternalRecord,
    owner: &str,
    doi: Option<String>,
    resource_type: ResourceType,
) -> Result<MappedRecord, AdapterError> {
    let title = record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AdapterError::invalid(&record.external_id, "record has no title"))?;

    let description = record
        .descriptions
        .iter()
        .map(|d| d.trim())
        .find(|d| !d.is_empty())
        .map(str::to_string);

    let mint_status = if doi.is_some() {
        MintStatus::NotNeeded
    } else {
        MintStatus::Pending
    };

    let publication_date = ["issued", "published", "created"]
        .iter()
        .find_map(|kind| record.date_of(kind))
        .map(str::to_string);

    let fields = CanonicalFields {
        title: title.to_string(),
        description,
        resource_type,
        owner: owner.to_string(),
        source: source_name.to_string(),
        external_id: record.external_id.clone(),
        source_ref: format!("{}:{}", source_name, record.external_id),
        source_url: record.landing_url.clone(),
        resolvable_id: doi.clone(),
        external_doi: doi,
        mint_status,
        language: record.language.clone(),
        publication_date,
    };

    let contributors = record
        .creators
        .iter()
        .filter_map(contributor_from_creator)
        .collect();

    Ok(MappedRecord {
        fields,
        contributors,
    })
}

fn contributor_from_creator(creator: &RecordCreator) -> Option<ContributorEntry> {
    let (family, given) = match &creator.family_name {
        Some(family) if !family.trim().is_empty() => (
            family.trim().to_string(),
            creator
                .given_name
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string),
        ),
        _ => split_name(&creator.name)?,
    };

    Some(ContributorEntry {
        family_name: family,
        given_name: given,
        identifier: creator.identifier.clone(),
        identifier_type: creator.identifier_type.clone(),
        role: creator.role,
    })
}

/// Split a display name into `(family, given)`.
///
/// `"Family, Given"` splits on the first comma; `"Given Family"` takes the
/// last word as the family name. Returns `None` for a blank name.
pub fn split_name(name: &str) -> Option<(String, Option<String>)> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if let Some((family, given)) = name.split_once(',') {
        let given = given.trim();
        return Some((
            family.trim().to_string(),
            (!given.is_empty()).then(|| given.to_string()),
        ));
    }
    match name.rsplit_once(char::is_whitespace) {
        Some((given, family)) => Some((family.trim().to_string(), Some(given.trim().to_string()))),
        None => Some((name.to_string(), None)),
    }
}

const DOI_PREFIXES: [&str; 6] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Normalise a DOI-like string, or `None` if it is not a usable DOI.
///
/// Accepts bare DOIs, `doi:` prefixes and `doi.org` URLs. Only the prefix is
/// removed; the DOI keeps the case the source gave it.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in DOI_PREFIXES {
        let matches = doi
            .get(..prefix.len())
            .map(|head| head.eq_ignore_ascii_case(prefix))
            .unwrap_or(false);
        if matches {
            doi = doi[prefix.len()..].trim();
            break;
        }
    }

    let (registrant, suffix) = doi.split_once('/')?;
    let usable = registrant.starts_with("10.")
        && registrant.len() > 3
        && !suffix.is_empty()
        && !doi.chars().any(char::is_whitespace);
    usable.then(|| doi.to_string())
}

/// First usable DOI among candidate strings.
pub fn first_doi<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().find_map(normalize_doi)
}

/// Normalise an ORCID iD (bare or URL form) to `https://orcid.org/<id>`.
pub fn normalize_orcid(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let id = raw
        .rsplit_once("orcid.org/")
        .map(|(_, id)| id)
        .unwrap_or(raw)
        .trim_end_matches('/');

    let groups: Vec<&str> = id.split('-').collect();
    let well_formed = groups.len() == 4
        && groups.iter().all(|g| g.len() == 4)
        && groups[..3]
            .iter()
            .all(|g| g.chars().all(|c| c.is_ascii_digit()))
        && groups[3]
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || (i == 3 && (c == 'X' || c == 'x')));

    well_formed.then(|| format!("https://orcid.org/{}", id.to_uppercase()))
}

/// Strip markup from an HTML fragment and collapse whitespace.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", ' '),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("hellip", '\u{2026}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201C}'),
    ("rdquo", '\u{201D}'),
    ("copy", '\u{A9}'),
    ("deg", '\u{B0}'),
    ("plusmn", '\u{B1}'),
    ("micro", '\u{B5}'),
    ("times", '\u{D7}'),
    ("szlig", '\u{DF}'),
    ("agrave", '\u{E0}'),
    ("aacute", '\u{E1}'),
    ("acirc", '\u{E2}'),
    ("atilde", '\u{E3}'),
    ("auml", '\u{E4}'),
    ("aring", '\u{E5}'),
    ("ccedil", '\u{E7}'),
    ("egrave", '\u{E8}'),
    ("eacute", '\u{E9}'),
    ("ecirc", '\u{EA}'),
    ("euml", '\u{EB}'),
    ("iacute", '\u{ED}'),
    ("iuml", '\u{EF}'),
    ("ntilde", '\u{F1}'),
    ("oacute", '\u{F3}'),
    ("ocirc", '\u{F4}'),
    ("ouml", '\u{F6}'),
    ("oslash", '\u{F8}'),
    ("uacute", '\u{FA}'),
    ("uuml", '\u{FC}'),
    ("Aacute", '\u{C1}'),
    ("Auml", '\u{C4}'),
    ("Eacute", '\u{C9}'),
    ("Ouml", '\u{D6}'),
    ("Uuml", '\u{DC}'),
];

/// Decode numeric character references (`&#233;`, `&#xE9;`) and the named
/// entities in [`NAMED_ENTITIES`]. Anything else is left as written.
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end > 1 && end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    NAMED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
}

/// Parse the timestamp formats the supported sources emit.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// ═══════════════════════════════════════════════════════════════════════
// HTTP helpers
// ═══════════════════════════════════════════════════════════════════════

/// Build the HTTP client an adapter owns for its lifetime.
pub fn build_client(source: &SourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(source.timeout_secs))
        .user_agent(concat!("pubharvest/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Send a request and decode a JSON body.
///
/// When `record_id` is given, a 404 becomes [`AdapterError::NotFound`];
/// every other non-success status is a fetch error.
pub(crate) async fn send_json<T: DeserializeOwned>(
    source_name: &str,
    request: reqwest::RequestBuilder,
    record_id: Option<&str>,
) -> Result<T, AdapterError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            AdapterError::fetch(source_name, "request timed out")
        } else {
            AdapterError::fetch(source_name, e.to_string())
        }
    })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = record_id {
            return Err(AdapterError::not_found(source_name, id));
        }
    }
    if !status.is_success() {
        return Err(AdapterError::fetch(
            source_name,
            format!("HTTP {} from {}", status.as_u16(), response.url()),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AdapterError::decode(source_name, e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of configured source adapters.
///
/// Use [`AdapterRegistry::from_config`] for the built-in adapters, or
/// [`register`](AdapterRegistry::register) to add custom ones.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry holding every source configured under `[sources]`.
    ///
    /// Each adapter gets its own HTTP client built from its section.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::adapter_dataverse::DataverseAdapter;
        use crate::adapter_dspace::DspaceAdapter;
        use crate::adapter_dspace_legacy::LegacyDspaceAdapter;
        use crate::adapter_ojs::OjsAdapter;

        let mut registry = Self::new();
        let sources = &config.sources;

        if let Some(cfg) = &sources.dspace {
            registry.register(Box::new(DspaceAdapter::new(build_client(cfg)?, cfg.clone())));
        }
        if let Some(cfg) = &sources.dspace_legacy {
            registry.register(Box::new(LegacyDspaceAdapter::new(
                build_client(cfg)?,
                cfg.clone(),
            )));
        }
        if let Some(cfg) = &sources.dataverse {
            registry.register(Box::new(DataverseAdapter::new(
                build_client(cfg)?,
                cfg.clone(),
            )));
        }
        if let Some(cfg) = &sources.ojs {
            registry.register(Box::new(OjsAdapter::new(build_client(cfg)?, cfg.clone())));
        }

        Ok(registry)
    }

    /// Register an adapter. A later registration with the same name wins.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters
            .retain(|a| a.source_name() != adapter.source_name());
        self.adapters.push(adapter);
    }

    /// Find an adapter by source name.
    pub fn find(&self, source_name: &str) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source_name() == source_name)
            .map(|a| a.as_ref())
    }

    pub fn adapters(&self) -> &[Box<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Registered source names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.source_name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
