//! Embedding and completion provider adapters.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
mod retry;

pub use error::{LlmError, Result};
pub use provider::ModelProvider;
