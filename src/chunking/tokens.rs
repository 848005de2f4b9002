//! Token counting.
//!
//! Counts tokens with the `cl100k_base` BPE encoding. When the encoder
//! cannot be constructed the counter falls back to a character estimate
//! (`ceil(chars / 4)`).

use std::sync::{Arc, OnceLock};

use tiktoken_rs::CoreBPE;

/// Process-wide BPE instance; building the encoder is expensive.
static BPE: OnceLock<Option<Arc<CoreBPE>>> = OnceLock::new();

fn shared_bpe() -> Option<Arc<CoreBPE>> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(Arc::new(bpe)),
        Err(err) => {
            tracing::warn!(%err, "BPE encoder unavailable, using character estimate");
            None
        }
    })
    .clone()
}

/// Counts tokens in text, BPE-exact when available.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Option<Arc<CoreBPE>>,
}

impl TokenCounter {
    /// Creates a counter backed by the shared `cl100k_base` encoder,
    /// falling back to the character estimate when unavailable.
    #[must_use]
    pub fn new() -> Self {
        Self { bpe: shared_bpe() }
    }

    /// Creates a counter that always uses the `ceil(chars / 4)` estimate.
    ///
    /// Useful in tests, where token budgets need to be predictable.
    #[must_use]
    pub const fn approximate() -> Self {
        Self { bpe: None }
    }

    /// Counts tokens in `text`.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => text.chars().count().div_ceil(4),
        }
    }

    /// Whether counts are BPE-exact (vs the character estimate).
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.bpe.is_some()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("exact", &self.is_exact())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approximate_count() {
        let counter = TokenCounter::approximate();
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
        assert_eq!(counter.count(&"x".repeat(2400)), 600);
        assert!(!counter.is_exact());
    }

    #[test]
    fn test_approximate_counts_chars_not_bytes() {
        let counter = TokenCounter::approximate();
        // Four two-byte characters are still four characters.
        assert_eq!(counter.count("éééé"), 1);
    }

    #[test]
    fn test_bpe_counter_monotone_in_length() {
        let counter = TokenCounter::new();
        let short = counter.count("hello world");
        let long = counter.count(&"hello world ".repeat(50));
        assert!(long > short);
    }
}
