//! Durable ingest state: which document versions the index already holds.
//!
//! The version map is the commit log of the pipeline. A token is written only
//! after the corresponding chunks are safely in the vector index, so a crash
//! mid-document re-processes that document on the next run instead of losing
//! it.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::{IndexError, Result};
use crate::ingest::IngestReport;

#[derive(Debug, Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Open (or create) the state database at `path` and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::StateCorruption` if the database cannot be opened
    /// or migrated. Callers should refuse to ingest in that case.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}?mode=rwc"))
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?;

        Ok(Self { pool })
    }

    /// In-memory state store for tests.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::StateCorruption` if setup fails.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?;
        // One long-lived connection: a second one would see a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| IndexError::StateCorruption(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Load the full version map.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::StateCorruption` if the table cannot be read.
    pub async fn load(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT source_id, version_token FROM ingest_state")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| IndexError::StateCorruption(e.to_string()))?;

        Ok(rows.into_iter().collect())
    }

    /// Record that `source_id` is indexed at `version_token`.
    ///
    /// Must be called only after the document's chunks are in the index.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Sqlite` on write failure.
    pub async fn commit(&self, source_id: &str, version_token: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO ingest_state (source_id, version_token, indexed_at) \
             VALUES (?, ?, ?)",
        )
        .bind(source_id)
        .bind(version_token)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Forget a document after its points are removed from the index.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Sqlite` on write failure.
    pub async fn remove(&self, source_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM ingest_state WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a run summary to the history table.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Sqlite` on write failure, or `IntConversion` if a
    /// counter exceeds the SQLite integer range.
    pub async fn record_run(&self, started_at: &str, report: &IngestReport) -> Result<()> {
        sqlx::query(
            "INSERT INTO ingest_runs \
             (started_at, duration_ms, created, updated, deleted, unchanged, failed) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(started_at)
        .bind(i64::try_from(report.duration_ms)?)
        .bind(i64::try_from(report.created)?)
        .bind(i64::try_from(report.updated)?)
        .bind(i64::try_from(report.deleted)?)
        .bind(i64::try_from(report.unchanged)?)
        .bind(i64::try_from(report.failed)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent run summaries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Sqlite` on read failure.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let rows: Vec<(String, i64, i64, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT started_at, duration_ms, created, updated, deleted, unchanged, failed \
             FROM ingest_runs ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(started_at, duration_ms, created, updated, deleted, unchanged, failed)| {
                    RunRecord {
                        started_at,
                        duration_ms,
                        created,
                        updated,
                        deleted,
                        unchanged,
                        failed,
                    }
                },
            )
            .collect())
    }
}

/// One row of ingestion history.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub started_at: String,
    pub duration_ms: i64,
    pub created: i64,
    pub updated: i64,
    pub deleted: i64,
    pub unchanged: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_then_load_roundtrips() {
        let state = StateStore::in_memory().await.unwrap();
        state.commit("page-1", "3").await.unwrap();
        state.commit("page-2", "1").await.unwrap();

        let map = state.load().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("page-1").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn commit_replaces_existing_token() {
        let state = StateStore::in_memory().await.unwrap();
        state.commit("page-1", "3").await.unwrap();
        state.commit("page-1", "4").await.unwrap();

        let map = state.load().await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("page-1").map(String::as_str), Some("4"));
    }

    #[tokio::test]
    async fn remove_forgets_document() {
        let state = StateStore::in_memory().await.unwrap();
        state.commit("page-1", "3").await.unwrap();
        state.remove("page-1").await.unwrap();
        assert!(state.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_str().unwrap();

        {
            let state = StateStore::open(path).await.unwrap();
            state.commit("page-1", "7").await.unwrap();
        }

        let reopened = StateStore::open(path).await.unwrap();
        let map = reopened.load().await.unwrap();
        assert_eq!(map.get("page-1").map(String::as_str), Some("7"));
    }

    #[tokio::test]
    async fn unopenable_path_is_state_corruption() {
        let result = StateStore::open("/nonexistent-dir/sub/state.db").await;
        assert!(matches!(result, Err(IndexError::StateCorruption(_))));
    }

    #[tokio::test]
    async fn run_history_is_recorded_newest_first() {
        let state = StateStore::in_memory().await.unwrap();
        let first = IngestReport {
            created: 2,
            duration_ms: 10,
            ..Default::default()
        };
        state.record_run("2026-01-01T00:00:00Z", &first).await.unwrap();

        let second = IngestReport {
            unchanged: 2,
            duration_ms: 10,
            ..Default::default()
        };
        state.record_run("2026-01-02T00:00:00Z", &second).await.unwrap();

        let runs = state.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].started_at, "2026-01-02T00:00:00Z");
        assert_eq!(runs[0].unchanged, 2);
        assert_eq!(runs[1].created, 2);
    }
}
