//! Content source abstraction: list document versions, fetch details.

use std::future::Future;
use std::pin::Pin;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source API error (status {status})")]
    Api { status: u16 },

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Cheap listing entry: enough to decide whether a document changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    /// Opaque version marker. Equal tokens mean unchanged content.
    pub version_token: String,
}

/// Full document as fetched from the source, body still in storage format.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub version_token: String,
    pub url: String,
    pub labels: Vec<String>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A system of record that documents are ingested from.
pub trait ContentSource: Send + Sync {
    /// Enumerate all documents in scope with their current version tokens.
    fn list(&self) -> BoxFuture<'_, Result<Vec<DocumentSummary>, SourceError>>;

    /// Fetch one document in full.
    fn fetch(&self, id: &str) -> BoxFuture<'_, Result<SourceDocument, SourceError>>;

    fn name(&self) -> &str;
}

/// Fixture source backed by an in-memory document set.
///
/// Documents can be replaced or removed between ingestion passes to exercise
/// update and deletion propagation.
#[cfg(any(test, feature = "mock"))]
pub struct StaticSource {
    docs: std::sync::RwLock<std::collections::HashMap<String, SourceDocument>>,
}

#[cfg(any(test, feature = "mock"))]
impl StaticSource {
    #[must_use]
    pub fn new(docs: Vec<SourceDocument>) -> Self {
        Self {
            docs: std::sync::RwLock::new(docs.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    /// Replace or insert a document.
    pub fn put(&self, doc: SourceDocument) {
        self.docs.write().unwrap().insert(doc.id.clone(), doc);
    }

    /// Remove a document so the next listing no longer contains it.
    pub fn remove(&self, id: &str) {
        self.docs.write().unwrap().remove(id);
    }
}

#[cfg(any(test, feature = "mock"))]
impl ContentSource for StaticSource {
    fn list(&self) -> BoxFuture<'_, Result<Vec<DocumentSummary>, SourceError>> {
        Box::pin(async move {
            let docs = self.docs.read().unwrap();
            let mut listing: Vec<DocumentSummary> = docs
                .values()
                .map(|d| DocumentSummary {
                    id: d.id.clone(),
                    version_token: d.version_token.clone(),
                })
                .collect();
            listing.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(listing)
        })
    }

    fn fetch(&self, id: &str) -> BoxFuture<'_, Result<SourceDocument, SourceError>> {
        let id = id.to_owned();
        Box::pin(async move {
            self.docs
                .read()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(SourceError::NotFound(id))
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}
