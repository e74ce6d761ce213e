//! Change detection between a source listing and the indexed state.

use std::collections::{HashMap, HashSet};

use crate::source::DocumentSummary;

/// What an ingestion run has to do.
#[derive(Debug, Default, Clone)]
pub struct IngestPlan {
    /// Documents that are new or whose version token changed.
    pub upsert: Vec<DocumentSummary>,
    /// Documents present in state but absent from the listing.
    pub delete: Vec<String>,
    pub unchanged: usize,
}

/// Compare a listing against the committed version map.
///
/// Duplicate ids in the listing are ignored after the first occurrence.
/// Deletions come out in sorted order so runs are deterministic.
#[must_use]
pub fn diff_listing(
    listing: &[DocumentSummary],
    state: &HashMap<String, String>,
) -> IngestPlan {
    let mut plan = IngestPlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for summary in listing {
        if !seen.insert(summary.id.as_str()) {
            tracing::warn!(id = %summary.id, "duplicate id in listing, keeping first");
            continue;
        }
        match state.get(&summary.id) {
            Some(token) if *token == summary.version_token => plan.unchanged += 1,
            _ => plan.upsert.push(summary.clone()),
        }
    }

    plan.delete = state
        .keys()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();
    plan.delete.sort();

    plan
}
