//! Incremental content ingestion: sources, chunking, change detection, and
//! vector indexing.

pub mod chunker;
pub mod confluence;
pub mod diff;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod in_memory;
pub mod ingest;
pub mod normalize;
pub mod qdrant;
pub mod source;
pub mod state;
pub mod vector_index;

pub use error::{IndexError, Result};
