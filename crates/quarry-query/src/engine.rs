//! Query facade: embed, retrieve, answer.

use std::sync::Arc;

use quarry_index::vector_index::VectorIndex;
use quarry_llm::ModelProvider;

use crate::answer::{AnswerResult, Assembler};
use crate::error::Result;
use crate::retriever::{RetrievalConfig, Retriever};

pub struct QueryEngine<P: ModelProvider> {
    provider: Arc<P>,
    retriever: Retriever,
    assembler: Assembler,
}

impl<P: ModelProvider> QueryEngine<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        index: Arc<dyn VectorIndex>,
        config: RetrievalConfig,
        assembler: Assembler,
    ) -> Self {
        Self {
            provider,
            retriever: Retriever::new(index, config),
            assembler,
        }
    }

    /// Answer a question from the indexed content.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Llm` if the question cannot be embedded or
    /// `QueryError::Index` if the search fails. A failed answer completion
    /// is not an error; it degrades inside the result.
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> Result<AnswerResult> {
        let vectors = self.provider.embed(&[question.to_owned()]).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or(quarry_llm::LlmError::EmptyResponse {
                provider: self.provider.name(),
            })?;

        let ranked = self.retriever.retrieve(query_vector, question, top_k).await?;
        Ok(self.assembler.answer(self.provider.as_ref(), question, &ranked).await)
    }
}
