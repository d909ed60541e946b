//! Deterministic offline embedder for unit tests.

use std::cell::Cell;

use crate::embedder::Embedder;
use crate::error::{FaqError, Result};

/// Hashes lowercase words into buckets and counts them.
///
/// Texts sharing most of their words land close together under cosine
/// similarity, which is enough to exercise ranking and thresholds.
pub struct BagOfWordsEmbedder {
    dimension: usize,
    /// Number of `embed_batch` calls, for asserting on re-embedding.
    pub batches: Cell<usize>,
    /// Fail every call after this many successful batches.
    pub fail_after_batches: Option<usize>,
}

impl Default for BagOfWordsEmbedder {
    fn default() -> Self {
        Self {
            dimension: 512,
            batches: Cell::new(0),
            fail_after_batches: None,
        }
    }
}

impl BagOfWordsEmbedder {
    pub fn failing_after(batches: usize) -> Self {
        Self {
            fail_after_batches: Some(batches),
            ..Self::default()
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

impl Embedder for BagOfWordsEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "bag-of-words"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[(fnv1a(word) % self.dimension as u64) as usize] += 1.0;
        }
        Ok(v)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let Some(limit) = self.fail_after_batches {
            if self.batches.get() >= limit {
                return Err(FaqError::Embedding("injected failure".into()));
            }
        }
        self.batches.set(self.batches.get() + 1);
        texts.iter().map(|t| self.embed(t)).collect()
    }
}
