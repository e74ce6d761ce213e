//! Grounded answer assembly.
//!
//! The completion model only ever sees retrieved content. No hits means a
//! fixed not-found answer with no model call at all.

use quarry_llm::ModelProvider;

use crate::retriever::RankedHit;

const SYSTEM_PROMPT: &str = "You are an internal knowledge assistant. \
Answer the question using ONLY the provided content. \
If the answer is not contained in the content, say that you could not find it. \
Do not invent information. Be concise.";

const NOT_FOUND_ANSWER: &str =
    "I could not find relevant information in the indexed content.";

const SERVICE_UNAVAILABLE_ANSWER: &str =
    "The answering service is temporarily unavailable. Please try again in a moment.";

/// How the answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Generated from retrieved content.
    Grounded,
    /// Nothing relevant was retrieved; no completion was requested.
    NotFound,
    /// Retrieval worked but the completion call failed.
    ServiceUnavailable,
}

/// A source document backing an answer.
#[derive(Debug, Clone)]
pub struct RankedSource {
    pub parent_id: String,
    pub title: String,
    pub url: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<RankedSource>,
    pub outcome: AnswerOutcome,
}

#[derive(Debug, Clone)]
pub struct Assembler {
    /// Total characters of retrieved content offered to the model.
    pub context_budget_chars: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self {
            context_budget_chars: 6000,
        }
    }
}

impl Assembler {
    /// Produce an answer from ranked hits.
    ///
    /// Infallible: a failed completion becomes a deterministic
    /// service-unavailable answer rather than an error, so callers always
    /// have something to show.
    pub async fn answer<P: ModelProvider>(
        &self,
        provider: &P,
        question: &str,
        hits: &[RankedHit],
    ) -> AnswerResult {
        if hits.is_empty() {
            return AnswerResult {
                answer: NOT_FOUND_ANSWER.to_owned(),
                sources: Vec::new(),
                outcome: AnswerOutcome::NotFound,
            };
        }

        let (contexts, sources) = self.pack_contexts(hits);
        let user_prompt = format!(
            "Content:\n{}\n\nQuestion: {question}",
            contexts.join("\n\n---\n\n")
        );

        match provider.complete(SYSTEM_PROMPT, &user_prompt).await {
            Ok(answer) => AnswerResult {
                answer,
                sources,
                outcome: AnswerOutcome::Grounded,
            },
            Err(e) => {
                tracing::error!(error = %e, "completion failed, degrading to static answer");
                AnswerResult {
                    answer: SERVICE_UNAVAILABLE_ANSWER.to_owned(),
                    sources,
                    outcome: AnswerOutcome::ServiceUnavailable,
                }
            }
        }
    }

    /// Pack hits best-first until the character budget runs out.
    ///
    /// If even the best hit exceeds the budget on its own, its text is
    /// truncated so the model always gets at least one context.
    fn pack_contexts(&self, hits: &[RankedHit]) -> (Vec<String>, Vec<RankedSource>) {
        let mut contexts = Vec::new();
        let mut sources = Vec::new();
        let mut used = 0usize;

        for ranked in hits {
            let hit = &ranked.hit;
            let mut context = format!("Title: {}\nContent: {}", hit.title, hit.text);
            let len = context.chars().count();

            if used + len > self.context_budget_chars {
                if contexts.is_empty() {
                    context = context.chars().take(self.context_budget_chars).collect();
                } else {
                    break;
                }
            }

            used += context.chars().count();
            contexts.push(context);
            sources.push(RankedSource {
                parent_id: hit.parent_id.clone(),
                title: hit.title.clone(),
                url: hit.url.clone(),
                score: ranked.score,
            });
        }

        (contexts, sources)
    }
}
