//! Lexical overlap scoring used to rerank vector hits.

use std::collections::HashSet;

/// Lowercased alphanumeric tokens of a text.
pub(crate) fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query tokens that also occur in `text`, in `0.0..=1.0`.
///
/// An empty query scores zero so lexical weights never dominate on
/// degenerate input.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn containment(query_tokens: &HashSet<String>, text: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokenize(text);
    let matched = query_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    matched as f32 / query_tokens.len() as f32
}
