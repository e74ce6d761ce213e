//! In-memory vector index used in tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::vector_index::{ChunkHit, ChunkPoint, VectorIndex, VectorIndexError};

type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Vector index backed by a `HashMap`, with call counters so tests can
/// assert that unchanged documents cause no index writes.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    points: RwLock<HashMap<String, ChunkPoint>>,
    upsert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.read().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `upsert` calls received so far.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of `delete_by_parent` calls received so far.
    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// All stored points for one parent, sorted by ordinal.
    #[must_use]
    pub fn points_for(&self, parent_id: &str) -> Vec<ChunkPoint> {
        let mut points: Vec<ChunkPoint> = self
            .points
            .read()
            .unwrap()
            .values()
            .filter(|p| p.parent_id == parent_id)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.ordinal);
        points
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex for InMemoryIndex {
    fn ensure_collection(
        &self,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async { Ok(()) })
    }

    fn upsert(&self, points: Vec<ChunkPoint>) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            let mut map = self.points.write().unwrap();
            for point in points {
                map.insert(point.chunk_id.clone(), point);
            }
            Ok(())
        })
    }

    fn delete_by_parent(&self, parent_id: &str) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        let parent_id = parent_id.to_owned();
        Box::pin(async move {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.points
                .write()
                .unwrap()
                .retain(|_, p| p.parent_id != parent_id);
            Ok(())
        })
    }

    fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ChunkHit>, VectorIndexError>> {
        Box::pin(async move {
            let map = self.points.read().unwrap();
            let mut hits: Vec<ChunkHit> = map
                .values()
                .map(|p| ChunkHit {
                    chunk_id: p.chunk_id.clone(),
                    parent_id: p.parent_id.clone(),
                    title: p.title.clone(),
                    url: p.url.clone(),
                    text: p.text.clone(),
                    score: cosine_similarity(&vector, &p.vector),
                    stale: p.stale,
                })
                .collect();
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(hits)
        })
    }
}
