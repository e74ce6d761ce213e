use std::future::Future;

use crate::error::LlmError;

/// A model backend that can embed text batches and answer grounded prompts.
pub trait ModelProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order.
    ///
    /// Implementations handle their own request batching; callers may pass
    /// any number of texts.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is malformed.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Run one completion under the given system instruction.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails or produces an empty response.
    fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &'static str;
}
