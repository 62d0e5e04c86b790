//! Change detection against stored fingerprints.

use crate::models::SourceMapping;

/// How a freshly fetched record relates to what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// No mapping exists yet.
    New,
    Unchanged,
    Modified,
}

/// `true` when the stored fingerprint differs from `fingerprint`.
pub fn has_changed(mapping: &SourceMapping, fingerprint: &str) -> bool {
    mapping.fingerprint != fingerprint
}

pub fn classify(mapping: Option<&SourceMapping>, fingerprint: &str) -> Change {
    match mapping {
        None => Change::New,
        Some(m) if has_changed(m, fingerprint) => Change::Modified,
        Some(_) => Change::Unchanged,
    }
}
