// Embeddings module
// Embedding service client and token accounting for batch budgeting

pub mod ollama;

pub use ollama::OllamaClient;

use anyhow::Result;
use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

/// Embedding service boundary. Implementations may fail transiently; the
/// index builder owns the retry policy around whole batches.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

static TOKENIZER: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::cl100k_base().expect("cl100k tokenizer data is embedded"));

/// Count tokens with the same tokenizer every time so batch sizing is stable
/// across runs.
#[inline]
pub fn count_tokens(text: &str) -> usize {
    TOKENIZER.encode_ordinary(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_counts_are_stable() {
        let text = "The relay trips at 20% voltage unbalance.";
        let first = count_tokens(text);
        assert!(first > 0);
        for _ in 0..5 {
            assert_eq!(count_tokens(text), first);
        }
    }

    #[test]
    fn empty_text_has_zero_tokens() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let short = count_tokens("voltage");
        let long = count_tokens("voltage unbalance protection with configurable trip thresholds");
        assert!(long > short);
    }
}
