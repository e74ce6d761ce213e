//! Grounded question answering over the ingested index.

pub mod answer;
pub mod engine;
pub mod error;
mod rerank;
pub mod retriever;

pub use answer::{AnswerOutcome, AnswerResult, RankedSource};
pub use engine::QueryEngine;
pub use error::{QueryError, Result};
