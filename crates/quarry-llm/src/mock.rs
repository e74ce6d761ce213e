//! Test-only mock model provider.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::ModelProvider;

const EMBED_DIM: usize = 32;

/// Scripted provider with deterministic bag-of-words embeddings.
///
/// Two texts sharing tokens get similar vectors, so retrieval ordering in
/// tests reflects actual content overlap rather than fixture order.
#[derive(Debug, Clone)]
pub struct MockProvider {
    completions: Arc<Mutex<Vec<String>>>,
    pub default_completion: String,
    pub fail_embed: bool,
    pub fail_complete: bool,
    embed_calls: Arc<AtomicUsize>,
    complete_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            completions: Arc::new(Mutex::new(Vec::new())),
            default_completion: "mock answer".into(),
            fail_embed: false,
            fail_complete: false,
            embed_calls: Arc::new(AtomicUsize::new(0)),
            complete_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_completions(completions: Vec<String>) -> Self {
        Self {
            completions: Arc::new(Mutex::new(completions)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_completion() -> Self {
        Self {
            fail_complete: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embedding() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }
}

/// Hash each token into a fixed-dimension bucket and L2-normalize.
#[must_use]
pub fn bag_of_words_vector(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; EMBED_DIM];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        let bucket = usize::try_from(hasher.finish() % EMBED_DIM as u64).unwrap_or(0);
        vec[bucket] += 1.0;
    }
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vec {
            *x /= norm;
        }
    } else {
        // All-whitespace input still needs a valid direction.
        vec[0] = 1.0;
    }
    vec
}

impl ModelProvider for MockProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embed error".into()));
        }
        Ok(texts.iter().map(|t| bag_of_words_vector(t)).collect())
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete {
            return Err(LlmError::Other("mock completion error".into()));
        }
        let mut completions = self.completions.lock().unwrap();
        if completions.is_empty() {
            Ok(self.default_completion.clone())
        } else {
            Ok(completions.remove(0))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic() {
        let p = MockProvider::default();
        let a = p.embed(&["deploy pipeline".to_owned()]).await.unwrap();
        let b = p.embed(&["deploy pipeline".to_owned()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(p.embed_calls(), 2);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let p = MockProvider::default();
        let vecs = p
            .embed(&["release checklist".to_owned(), "vacation policy".to_owned()])
            .await
            .unwrap();
        assert_ne!(vecs[0], vecs[1]);
    }

    #[test]
    fn vectors_are_normalized() {
        let v = bag_of_words_vector("some shared tokens here");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_has_valid_direction() {
        let v = bag_of_words_vector("   ");
        assert!((v[0] - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn scripted_completions_in_order() {
        let p = MockProvider::with_completions(vec!["first".into(), "second".into()]);
        assert_eq!(p.complete("s", "u").await.unwrap(), "first");
        assert_eq!(p.complete("s", "u").await.unwrap(), "second");
        assert_eq!(p.complete("s", "u").await.unwrap(), "mock answer");
        assert_eq!(p.complete_calls(), 3);
    }

    #[tokio::test]
    async fn failing_completion_errors() {
        let p = MockProvider::failing_completion();
        assert!(p.complete("s", "u").await.is_err());
        assert_eq!(p.complete_calls(), 1);
    }
}
