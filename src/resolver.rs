//! Identity resolution: which canonical publication, if any, an external
//! record is already linked to.

use sqlx::SqliteConnection;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::models::SourceMapping;
use crate::store;

/// Look up the mapping for one `(source, external_id)` pair.
pub async fn find_mapping(
    conn: &mut SqliteConnection,
    source: &str,
    external_id: &str,
) -> Result<Option<SourceMapping>, StoreError> {
    store::find_mapping(conn, source, external_id).await
}

/// Mappings of one source, loaded in bulk before a batch runs.
///
/// The index is a snapshot: creates performed later in the same batch are
/// not added, so a repeated external id resolves to "new" both times and
/// the second insert hits the uniqueness constraint.
#[derive(Debug, Default)]
pub struct MappingIndex {
    source: String,
    by_external_id: HashMap<String, SourceMapping>,
}

impl MappingIndex {
    /// Load the mappings of `source` for the given ids with one query.
    pub async fn load(
        conn: &mut SqliteConnection,
        source: &str,
        external_ids: &[String],
    ) -> Result<Self, StoreError> {
        let mut ids: Vec<String> = external_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mappings = if ids.is_empty() {
            Vec::new()
        } else {
            store::find_mappings_by_source_and_ids(conn, source, &ids).await?
        };
        Ok(Self::from_mappings(source, mappings))
    }

    pub fn from_mappings(source: &str, mappings: Vec<SourceMapping>) -> Self {
        Self {
            source: source.to_string(),
            by_external_id: mappings
                .into_iter()
                .map(|m| (m.external_id.clone(), m))
                .collect(),
        }
    }

    pub fn get(&self, external_id: &str) -> Option<&SourceMapping> {
        self.by_external_id.get(external_id)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.by_external_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;

    fn mapping(id: &str) -> SourceMapping {
        SourceMapping {
            source: "dspace".to_string(),
            external_id: id.to_string(),
            publication_id: format!("pub-{}", id),
            fingerprint: "abc".to_string(),
            last_synced_at: 0,
            sync_status: SyncStatus::Synced,
            last_error: None,
            retry_count: 0,
        }
    }

    #[test]
    fn test_index_lookup() {
        let index = MappingIndex::from_mappings("dspace", vec![mapping("a"), mapping("b")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.source(), "dspace");
        assert_eq!(index.get("a").map(|m| m.publication_id.as_str()), Some("pub-a"));
        assert!(index.get("c").is_none());
    }
}
