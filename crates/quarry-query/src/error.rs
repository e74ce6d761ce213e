//! Error types for quarry-query.

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Model provider error (query embedding).
    #[error("model provider error: {0}")]
    Llm(#[from] quarry_llm::LlmError),

    /// Vector index search error.
    #[error("vector index error: {0}")]
    Index(#[from] quarry_index::vector_index::VectorIndexError),
}

pub type Result<T> = std::result::Result<T, QueryError>;
