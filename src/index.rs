//! # VectorIndex
//!
//! Exact cosine-similarity search over one embedding per Q&A pair.
//!
//! Rows are stored L2-normalised in a single flat buffer, so similarity is a
//! plain dot product. Row `i` carries the id of the pair at position `i` in the
//! knowledge store. Scoring runs in parallel with `rayon`; ranking is by
//! descending score with ties going to the lower row, which makes the
//! earliest-added pair canonical among duplicates.
//!
//! The index is rebuilt wholesale, never patched: [`VectorIndex::build`]
//! replaces every row.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{FaqError, Result};

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Position in the index (and in the knowledge store).
    pub row: usize,
    /// Id of the pair the row was built from.
    pub id: u64,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Rows {
    dimension: usize,
    data: Vec<f32>,
    ids: Vec<u64>,
}

/// Flat cosine index. Unbuilt until the first [`VectorIndex::build`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    rows: Option<Rows>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all rows with `vectors`, tagging row `i` with `ids[i]`.
    ///
    /// An empty input builds a valid, empty index.
    ///
    /// # Errors
    /// - [`FaqError::DimensionMismatch`] if vectors differ in length.
    /// - [`FaqError::InvalidInput`] for zero-length vectors or when `ids` and
    ///   `vectors` differ in count.
    ///
    /// On error the previous rows are kept.
    pub fn build(&mut self, vectors: Vec<Vec<f32>>, ids: &[u64]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(FaqError::InvalidInput(format!(
                "{} vectors for {} ids",
                vectors.len(),
                ids.len()
            )));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if !vectors.is_empty() && dimension == 0 {
            return Err(FaqError::InvalidInput("cannot index empty vectors".into()));
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for v in vectors {
            if v.len() != dimension {
                return Err(FaqError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            data.extend(normalized(v));
        }

        self.rows = Some(Rows {
            dimension,
            data,
            ids: ids.to_vec(),
        });
        Ok(())
    }

    /// Top-`k` rows by cosine similarity to `query`, best first.
    ///
    /// Returns fewer than `k` hits when the index is smaller, and none when it
    /// is empty.
    ///
    /// # Errors
    /// - [`FaqError::IndexNotReady`] before the first build.
    /// - [`FaqError::DimensionMismatch`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        let rows = self.rows.as_ref().ok_or(FaqError::IndexNotReady)?;
        if rows.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != rows.dimension {
            return Err(FaqError::DimensionMismatch {
                expected: rows.dimension,
                actual: query.len(),
            });
        }

        let query = normalized(query.to_vec());
        let mut scored: Vec<(usize, f32)> = rows
            .data
            .par_chunks(rows.dimension)
            .enumerate()
            .map(|(row, v)| (row, unit_score(dot(v, &query))))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| Hit {
                row,
                id: rows.ids[row],
                score,
            })
            .collect())
    }

    pub fn is_built(&self) -> bool {
        self.rows.is_some()
    }

    /// Number of rows; zero when unbuilt.
    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, |r| r.ids.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.rows.as_ref().map(|r| r.dimension)
    }

    /// Pair ids in row order.
    pub fn ids(&self) -> &[u64] {
        self.rows.as_ref().map_or(&[][..], |r| r.ids.as_slice())
    }
}

/// Scores this close to 1 are rounding noise from normalising in `f32`.
const UNIT_SCORE_TOLERANCE: f32 = 1e-6;

/// Clamp to `[-1, 1]` and snap near-identical matches to exactly 1, so a
/// vector always scores 1.0 against itself.
fn unit_score(score: f32) -> f32 {
    if score >= 1.0 - UNIT_SCORE_TOLERANCE {
        1.0
    } else {
        score.max(-1.0)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale to unit length; an all-zero vector stays zero and scores 0 against everything.
fn normalized(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}
