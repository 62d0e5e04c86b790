//! Error types for the reconciliation core.
//!
//! Adapter, store and batch failures are kept apart so callers can tell a
//! per-item problem from one that voids the whole batch.

use thiserror::Error;

/// Failure talking to, or interpreting data from, an external source.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The source answered but has no record with this id.
    #[error("{source_name}: record '{external_id}' not found")]
    NotFound {
        source_name: String,
        external_id: String,
    },

    /// Network failure, timeout, or non-success HTTP status.
    #[error("{source_name}: fetch failed: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("{source_name}: could not decode response: {message}")]
    Decode {
        source_name: String,
        message: String,
    },

    /// The record was fetched but cannot be mapped to a publication.
    #[error("record '{external_id}' is not importable: {reason}")]
    InvalidRecord { external_id: String, reason: String },
}

impl AdapterError {
    pub fn fetch(source_name: &str, message: impl Into<String>) -> Self {
        AdapterError::Fetch {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(source_name: &str, message: impl Into<String>) -> Self {
        AdapterError::Decode {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(source_name: &str, external_id: &str) -> Self {
        AdapterError::NotFound {
            source_name: source_name.to_string(),
            external_id: external_id.to_string(),
        }
    }

    pub fn invalid(external_id: &str, reason: impl Into<String>) -> Self {
        AdapterError::InvalidRecord {
            external_id: external_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AdapterError::NotFound { .. })
    }
}

/// Failure writing to or reading from the canonical store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A source mapping for this (source, external id) already exists.
    #[error("mapping conflict: {source_name}/{external_id} is already mapped")]
    Conflict {
        source_name: String,
        external_id: String,
    },

    /// An update targeted a mapping row that no longer exists.
    #[error("mapping missing: {source_name}/{external_id}")]
    MissingMapping {
        source_name: String,
        external_id: String,
    },

    /// An update targeted a publication that no longer exists.
    #[error("publication not found: {0}")]
    MissingPublication(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify an insert failure on the mapping table.
    pub fn from_mapping_insert(err: sqlx::Error, source_name: &str, external_id: &str) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            StoreError::Conflict {
                source_name: source_name.to_string(),
                external_id: external_id.to_string(),
            }
        } else {
            StoreError::Database(err)
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Failure that aborts a whole batch request.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The request was rejected before any I/O.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The initial page fetch failed; nothing was processed.
    #[error("source unavailable: {0}")]
    Fetch(#[source] AdapterError),

    /// A single-item import referenced a record the source does not have.
    #[error(transparent)]
    NotFound(AdapterError),

    /// The store could not open the batch transaction or a nested scope,
    /// or could not load the mapping index.
    #[error("store unavailable: {0}")]
    Store(#[source] StoreError),

    /// The final commit failed; no item of this batch was persisted.
    #[error("batch commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}

impl BatchError {
    pub(crate) fn store(err: impl Into<StoreError>) -> Self {
        BatchError::Store(err.into())
    }
}
