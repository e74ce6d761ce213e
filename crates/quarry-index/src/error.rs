//! Error types for quarry-index.

/// Errors that can occur during ingestion operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The durable ingest state could not be opened or read. Ingestion
    /// refuses to run rather than re-index or delete on bad data.
    #[error("ingest state corrupted: {0}")]
    StateCorruption(String),

    /// `SQLite` state store error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Vector index adapter error.
    #[error("vector index error: {0}")]
    Vector(#[from] crate::vector_index::VectorIndexError),

    /// Content source adapter error.
    #[error("source error: {0}")]
    Source(#[from] crate::source::SourceError),

    /// Model provider error (embedding).
    #[error("model provider error: {0}")]
    Llm(#[from] quarry_llm::LlmError),

    /// Another ingestion pass is already running on this pipeline.
    #[error("ingestion run already in progress")]
    RunInProgress,

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
