//! Vector index abstraction over chunk points.

use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error("vector index connection failed: {0}")]
    Connection(String),

    #[error("collection setup failed: {0}")]
    Collection(String),

    #[error("upsert failed: {0}")]
    Upsert(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("payload decode failed: {0}")]
    Payload(String),
}

/// One embedded chunk as stored in the index.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Deterministic point id derived from `(parent_id, ordinal)`.
    pub chunk_id: String,
    pub vector: Vec<f32>,
    /// Source document this chunk belongs to.
    pub parent_id: String,
    pub ordinal: u32,
    pub title: String,
    pub url: String,
    pub text: String,
    pub version_token: String,
    pub space: String,
    /// Marked when the source document carries a staleness label.
    pub stale: bool,
}

/// A search hit with its payload decoded.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub parent_id: String,
    pub title: String,
    pub url: String,
    pub text: String,
    pub score: f32,
    pub stale: bool,
}

/// Stable point id for a chunk. Re-ingesting the same document overwrites
/// its points in place instead of accumulating duplicates.
#[must_use]
pub fn chunk_point_id(parent_id: &str, ordinal: u32) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{parent_id}:{ordinal}").as_bytes(),
    )
    .to_string()
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Storage backend for embedded chunks.
pub trait VectorIndex: Send + Sync {
    /// Create the collection if missing. Idempotent.
    fn ensure_collection(&self, vector_size: u64)
    -> BoxFuture<'_, Result<(), VectorIndexError>>;

    /// Insert or overwrite points by id.
    fn upsert(&self, points: Vec<ChunkPoint>) -> BoxFuture<'_, Result<(), VectorIndexError>>;

    /// Remove every point belonging to the given source document.
    fn delete_by_parent(&self, parent_id: &str) -> BoxFuture<'_, Result<(), VectorIndexError>>;

    /// Nearest-neighbour search, best first.
    fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ChunkHit>, VectorIndexError>>;
}
