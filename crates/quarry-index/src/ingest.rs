//! Ingestion orchestrator: list, diff, fetch, chunk, embed, index, commit.

use std::sync::Arc;

use futures::StreamExt;
use quarry_llm::ModelProvider;

use crate::chunker::{ChunkConfig, chunk_text};
use crate::diff::diff_listing;
use crate::error::{IndexError, Result};
use crate::normalize::html_to_text;
use crate::source::{ContentSource, DocumentSummary};
use crate::state::StateStore;
use crate::vector_index::{ChunkPoint, VectorIndex, chunk_point_id};

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub chunker: ChunkConfig,
    /// How many chunk texts go into one embedding request.
    pub embed_batch_size: usize,
    /// Documents processed concurrently.
    pub concurrency: usize,
    /// Labels that mark a document as stale content.
    pub stale_labels: Vec<String>,
    /// Space key stamped on every indexed point.
    pub space: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkConfig::default(),
            embed_batch_size: 16,
            concurrency: 4,
            stale_labels: vec!["outdated".into(), "deprecated".into()],
            space: String::new(),
        }
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// One entry per failed document: `"{id}: {error}"`.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

enum DocOutcome {
    Created,
    Updated,
    Failed(String),
}

/// Drives incremental ingestion from a content source into the vector index.
pub struct Ingestor<P: ModelProvider> {
    source: Arc<dyn ContentSource>,
    index: Arc<dyn VectorIndex>,
    state: StateStore,
    provider: Arc<P>,
    config: IngestConfig,
    run_lock: tokio::sync::Mutex<()>,
}

impl<P: ModelProvider> Ingestor<P> {
    /// # Errors
    ///
    /// Returns `IndexError::Config` for an invalid chunker configuration.
    pub fn new(
        source: Arc<dyn ContentSource>,
        index: Arc<dyn VectorIndex>,
        state: StateStore,
        provider: Arc<P>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.chunker.validate()?;
        if config.embed_batch_size == 0 {
            return Err(IndexError::Config("embed_batch_size must be positive".into()));
        }
        if config.concurrency == 0 {
            return Err(IndexError::Config("concurrency must be positive".into()));
        }
        Ok(Self {
            source,
            index,
            state,
            provider,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Run one ingestion pass.
    ///
    /// A document failure is counted and reported, never fatal to the run.
    /// Listing or state failures abort the whole pass since nothing can be
    /// diffed safely without them.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::RunInProgress` if another pass holds the run
    /// lock, `IndexError::StateCorruption` if state cannot be read, or the
    /// source error if the listing fails.
    pub async fn run(&self) -> Result<IngestReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Err(IndexError::RunInProgress);
        };

        let started = std::time::Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();

        let state_map = self.state.load().await?;
        let listing = self.source.list().await.map_err(IndexError::Source)?;
        let plan = diff_listing(&listing, &state_map);

        tracing::info!(
            source = self.source.name(),
            upsert = plan.upsert.len(),
            delete = plan.delete.len(),
            unchanged = plan.unchanged,
            "ingestion plan ready"
        );

        let mut report = IngestReport {
            unchanged: plan.unchanged,
            ..Default::default()
        };

        if !plan.upsert.is_empty() {
            self.ensure_collection().await?;
        }

        let outcomes: Vec<DocOutcome> = futures::stream::iter(plan.upsert)
            .map(|summary| {
                let is_update = state_map.contains_key(&summary.id);
                async move {
                    let id = summary.id.clone();
                    match self.process_document(summary, is_update).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::warn!(id = %id, error = %e, "document ingest failed");
                            DocOutcome::Failed(format!("{id}: {e}"))
                        }
                    }
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                DocOutcome::Created => report.created += 1,
                DocOutcome::Updated => report.updated += 1,
                DocOutcome::Failed(message) => {
                    report.failed += 1;
                    report.errors.push(message);
                }
            }
        }

        for id in plan.delete {
            match self.delete_document(&id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "document deletion failed");
                    report.failed += 1;
                    report.errors.push(format!("{id}: {e}"));
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.state.record_run(&started_at, &report).await?;

        tracing::info!(
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "ingestion run complete"
        );
        Ok(report)
    }

    /// Probe the embedding dimension and make sure the collection exists.
    async fn ensure_collection(&self) -> Result<()> {
        let probe = self
            .provider
            .embed(&["dimension probe".to_owned()])
            .await?;
        let size = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| IndexError::Other("provider returned no probe embedding".into()))?;
        self.index
            .ensure_collection(u64::try_from(size)?)
            .await?;
        Ok(())
    }

    async fn process_document(
        &self,
        summary: DocumentSummary,
        is_update: bool,
    ) -> Result<DocOutcome> {
        let doc = self
            .source
            .fetch(&summary.id)
            .await
            .map_err(IndexError::Source)?;

        let text = html_to_text(&doc.body);
        let chunks = chunk_text(&text, &self.config.chunker)?;
        let stale = self.is_stale(&doc.labels);

        // Old points go first so a shrinking document leaves no orphans.
        self.index.delete_by_parent(&doc.id).await?;

        if chunks.is_empty() {
            tracing::debug!(id = %doc.id, "document has no indexable text");
        } else {
            let mut points = Vec::with_capacity(chunks.len());
            for batch in chunks.chunks(self.config.embed_batch_size) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = self.provider.embed(&texts).await?;
                if vectors.len() != batch.len() {
                    return Err(IndexError::Other(format!(
                        "embedding count mismatch: {} texts, {} vectors",
                        batch.len(),
                        vectors.len()
                    )));
                }
                for (chunk, vector) in batch.iter().zip(vectors) {
                    points.push(ChunkPoint {
                        chunk_id: chunk_point_id(&doc.id, chunk.ordinal),
                        vector,
                        parent_id: doc.id.clone(),
                        ordinal: chunk.ordinal,
                        title: doc.title.clone(),
                        url: doc.url.clone(),
                        text: chunk.text.clone(),
                        version_token: doc.version_token.clone(),
                        space: self.config.space.clone(),
                        stale,
                    });
                }
            }
            self.index.upsert(points).await?;
        }

        // Commit strictly after the index write. A crash before this line
        // re-processes the document next run.
        self.state.commit(&doc.id, &doc.version_token).await?;

        Ok(if is_update {
            DocOutcome::Updated
        } else {
            DocOutcome::Created
        })
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.index.delete_by_parent(id).await?;
        self.state.remove(id).await?;
        Ok(())
    }

    fn is_stale(&self, labels: &[String]) -> bool {
        labels.iter().any(|label| {
            self.config
                .stale_labels
                .iter()
                .any(|marker| marker.eq_ignore_ascii_case(label))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryIndex;
    use crate::source::{SourceDocument, StaticSource};
    use quarry_llm::mock::MockProvider;

    fn doc(id: &str, version: &str, body: &str) -> SourceDocument {
        SourceDocument {
            id: id.into(),
            title: format!("Doc {id}"),
            body: body.into(),
            version_token: version.into(),
            url: format!("https://wiki.example.com/pages/{id}"),
            labels: vec![],
        }
    }

    fn config() -> IngestConfig {
        IngestConfig {
            chunker: ChunkConfig {
                max_chars: 200,
                overlap_chars: 40,
                min_chars: 5,
            },
            space: "ENG".into(),
            ..Default::default()
        }
    }

    fn pipeline(
        source: Arc<StaticSource>,
        index: Arc<InMemoryIndex>,
        state: StateStore,
    ) -> Ingestor<MockProvider> {
        Ingestor::new(source, index, state, Arc::new(MockProvider::new()), config()).unwrap()
    }

    #[tokio::test]
    async fn first_run_creates_everything() {
        let source = Arc::new(StaticSource::new(vec![
            doc("a", "1", "<p>alpha page about deployments</p>"),
            doc("b", "1", "<p>beta page about rollbacks</p>"),
        ]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(source, Arc::clone(&index), state.clone());

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);
        assert!(!index.is_empty());
        assert_eq!(state.load().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unchanged_documents_cause_no_index_writes() {
        let source = Arc::new(StaticSource::new(vec![doc(
            "a",
            "1",
            "<p>alpha page about deployments</p>",
        )]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(source, Arc::clone(&index), state);

        ingestor.run().await.unwrap();
        let writes_after_first = index.upsert_calls();

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(index.upsert_calls(), writes_after_first);
    }

    #[tokio::test]
    async fn version_bump_is_an_update() {
        let source = Arc::new(StaticSource::new(vec![doc(
            "a",
            "1",
            "<p>alpha page about deployments</p>",
        )]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(Arc::clone(&source), Arc::clone(&index), state);

        ingestor.run().await.unwrap();
        source.put(doc("a", "2", "<p>alpha page revised considerably</p>"));

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);
        assert_eq!(index.points_for("a")[0].version_token, "2");
    }

    #[tokio::test]
    async fn removed_documents_are_deleted_from_index_and_state() {
        let source = Arc::new(StaticSource::new(vec![
            doc("a", "1", "<p>alpha page about deployments</p>"),
            doc("b", "1", "<p>beta page about rollbacks</p>"),
        ]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(Arc::clone(&source), Arc::clone(&index), state.clone());

        ingestor.run().await.unwrap();
        source.remove("b");

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(index.points_for("b").is_empty());
        assert!(!state.load().await.unwrap().contains_key("b"));
    }

    #[tokio::test]
    async fn embed_failure_aborts_then_recovery_run_succeeds() {
        let source = Arc::new(StaticSource::new(vec![
            doc("a", "1", "<p>alpha page about deployments</p>"),
            doc("b", "1", "<p>beta page about rollbacks</p>"),
        ]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();

        let failing = Ingestor::new(
            Arc::clone(&source) as Arc<dyn ContentSource>,
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            state.clone(),
            Arc::new(MockProvider::failing_embedding()),
            config(),
        )
        .unwrap();
        assert!(failing.run().await.is_err());
        assert!(state.load().await.unwrap().is_empty());

        let healthy = pipeline(source, Arc::clone(&index), state.clone());
        let report = healthy.run().await.unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn stale_label_marks_points() {
        let mut stale_doc = doc("a", "1", "<p>alpha page about deployments</p>");
        stale_doc.labels = vec!["OUTDATED".into()];
        let source = Arc::new(StaticSource::new(vec![stale_doc]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(source, Arc::clone(&index), state);

        ingestor.run().await.unwrap();
        assert!(index.points_for("a").iter().all(|p| p.stale));
    }

    #[tokio::test]
    async fn empty_body_commits_state_without_points() {
        let source = Arc::new(StaticSource::new(vec![doc("a", "1", "<div></div>")]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = pipeline(source, Arc::clone(&index), state.clone());

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.created, 1);
        assert!(index.points_for("a").is_empty());
        assert!(state.load().await.unwrap().contains_key("a"));

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.unchanged, 1);
    }

    type SourceFuture<'a, T> = std::pin::Pin<
        Box<
            dyn std::future::Future<Output = std::result::Result<T, crate::source::SourceError>>
                + Send
                + 'a,
        >,
    >;

    /// Source whose listing blocks until released, to hold a run open.
    struct GatedSource {
        inner: StaticSource,
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    impl ContentSource for GatedSource {
        fn list(&self) -> SourceFuture<'_, Vec<DocumentSummary>> {
            Box::pin(async move {
                self.entered.notify_one();
                self.release.notified().await;
                self.inner.list().await
            })
        }

        fn fetch(&self, id: &str) -> SourceFuture<'_, SourceDocument> {
            self.inner.fetch(id)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    /// Source whose fetch fails for one id until healed.
    struct FlakySource {
        inner: StaticSource,
        failing: std::sync::Mutex<Option<String>>,
    }

    impl FlakySource {
        fn heal(&self) {
            *self.failing.lock().unwrap() = None;
        }
    }

    impl ContentSource for FlakySource {
        fn list(&self) -> SourceFuture<'_, Vec<DocumentSummary>> {
            self.inner.list()
        }

        fn fetch(&self, id: &str) -> SourceFuture<'_, SourceDocument> {
            if self.failing.lock().unwrap().as_deref() == Some(id) {
                let id = id.to_owned();
                Box::pin(async move {
                    Err(crate::source::SourceError::Other(format!(
                        "fetch failed for {id}"
                    )))
                })
            } else {
                self.inner.fetch(id)
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn one_failing_document_does_not_abort_the_batch() {
        let source = Arc::new(FlakySource {
            inner: StaticSource::new(vec![
                doc("a", "1", "<p>alpha page about deployments</p>"),
                doc("b", "1", "<p>beta page about rollbacks</p>"),
            ]),
            failing: std::sync::Mutex::new(Some("a".into())),
        });
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor =
            pipeline_with_source(Arc::clone(&source) as _, Arc::clone(&index), state.clone());

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("a:"), "got: {:?}", report.errors);
        assert!(index.points_for("a").is_empty());
        let map = state.load().await.unwrap();
        assert!(map.contains_key("b"));
        assert!(!map.contains_key("a"));

        // The failed document never reached state, so the next run retries it.
        source.heal();
        let report = ingestor.run().await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 0);
        assert!(!index.points_for("a").is_empty());
    }

    #[tokio::test]
    async fn overlapping_runs_are_rejected() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let source = Arc::new(GatedSource {
            inner: StaticSource::new(vec![doc("a", "1", "<p>alpha page body</p>")]),
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        });
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let ingestor = Arc::new(pipeline_with_source(source, index, state));

        let first = tokio::spawn({
            let ingestor = Arc::clone(&ingestor);
            async move { ingestor.run().await }
        });

        entered.notified().await;
        assert!(matches!(ingestor.run().await, Err(IndexError::RunInProgress)));

        release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.created, 1);
    }

    fn pipeline_with_source(
        source: Arc<dyn ContentSource>,
        index: Arc<InMemoryIndex>,
        state: StateStore,
    ) -> Ingestor<MockProvider> {
        Ingestor::new(source, index, state, Arc::new(MockProvider::new()), config()).unwrap()
    }

    #[tokio::test]
    async fn zero_concurrency_is_config_error() {
        let source = Arc::new(StaticSource::new(vec![]));
        let index = Arc::new(InMemoryIndex::new());
        let state = StateStore::in_memory().await.unwrap();
        let result = Ingestor::new(
            source as Arc<dyn ContentSource>,
            index as Arc<dyn VectorIndex>,
            state,
            Arc::new(MockProvider::new()),
            IngestConfig {
                concurrency: 0,
                ..config()
            },
        );
        assert!(matches!(result, Err(IndexError::Config(_))));
    }
}
