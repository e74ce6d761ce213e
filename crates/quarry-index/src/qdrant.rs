//! Qdrant-backed vector index.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointStruct, ScoredPoint, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};

use crate::vector_index::{ChunkHit, ChunkPoint, VectorIndex, VectorIndexError};

type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantIndex {
    /// Connect to a Qdrant instance.
    ///
    /// # Errors
    ///
    /// Returns `VectorIndexError::Connection` if the client cannot be built.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, VectorIndexError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    fn point_struct(point: ChunkPoint) -> Result<PointStruct, VectorIndexError> {
        let payload: serde_json::Value = serde_json::json!({
            "parent_id": point.parent_id,
            "ordinal": point.ordinal,
            "title": point.title,
            "url": point.url,
            "text": point.text,
            "version_token": point.version_token,
            "space": point.space,
            "stale": point.stale,
        });
        let payload: HashMap<String, qdrant_client::qdrant::Value> =
            serde_json::from_value(payload)
                .map_err(|e| VectorIndexError::Payload(e.to_string()))?;
        Ok(PointStruct::new(point.chunk_id, point.vector, payload))
    }

    fn from_scored_point(point: ScoredPoint) -> Option<ChunkHit> {
        let get_str = |key: &str| {
            point
                .payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
        };
        let chunk_id = match point.id.as_ref()?.point_id_options.as_ref()? {
            qdrant_client::qdrant::point_id::PointIdOptions::Uuid(id) => id.clone(),
            qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => n.to_string(),
        };

        Some(ChunkHit {
            chunk_id,
            parent_id: get_str("parent_id")?,
            title: get_str("title").unwrap_or_default(),
            url: get_str("url").unwrap_or_default(),
            text: get_str("text")?,
            score: point.score,
            stale: point
                .payload
                .get("stale")
                .and_then(qdrant_client::qdrant::Value::as_bool)
                .unwrap_or(false),
        })
    }
}

impl VectorIndex for QdrantIndex {
    fn ensure_collection(
        &self,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&self.collection)
                .await
                .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
            if exists {
                return Ok(());
            }

            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorIndexError::Collection(e.to_string()))?;

            // Keyword index so delete-by-parent filters stay fast.
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    "parent_id",
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| VectorIndexError::Collection(e.to_string()))?;

            tracing::info!(collection = %self.collection, vector_size, "created collection");
            Ok(())
        })
    }

    fn upsert(&self, points: Vec<ChunkPoint>) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            let points: Result<Vec<PointStruct>, VectorIndexError> =
                points.into_iter().map(Self::point_struct).collect();
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points?))
                .await
                .map_err(|e| VectorIndexError::Upsert(e.to_string()))?;
            Ok(())
        })
    }

    fn delete_by_parent(&self, parent_id: &str) -> BoxFuture<'_, Result<(), VectorIndexError>> {
        let parent_id = parent_id.to_owned();
        Box::pin(async move {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.collection)
                        .points(Filter::must([Condition::matches(
                            "parent_id",
                            parent_id,
                        )]))
                        .wait(true),
                )
                .await
                .map_err(|e| VectorIndexError::Delete(e.to_string()))?;
            Ok(())
        })
    }

    fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ChunkHit>, VectorIndexError>> {
        Box::pin(async move {
            let results = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&self.collection, vector, limit)
                        .with_payload(true),
                )
                .await
                .map_err(|e| VectorIndexError::Search(e.to_string()))?;

            Ok(results
                .result
                .into_iter()
                .filter_map(Self::from_scored_point)
                .collect())
        })
    }
}
