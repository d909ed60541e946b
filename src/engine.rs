//! # Retrieval engine
//!
//! Ties the knowledge store, embedder and vector index together and decides,
//! per query, whether the best match is good enough to answer with.
//!
//! ## Freshness
//! The engine is either [`IndexState::Ready`] (index rows line up with the
//! store) or [`IndexState::Stale`]. It starts stale; every store mutation makes
//! it stale again. [`RetrievalEngine::sync`] re-embeds the whole store and
//! swaps in a freshly built index. The swap only happens once the new index is
//! complete, so a failed sync leaves the previous index in place and the
//! engine stale.
//!
//! [`RetrievalEngine::answer`] syncs on demand, so callers never need to.
//!
//! ## Concurrency
//! Every operation takes `&mut self`. Share an engine across threads by putting
//! it behind a lock (see [`crate::responder::Responder`]).
//!
//! ## Quick Example
//! ```no_run
//! use awful_faq::config::RetrievalSettings;
//! use awful_faq::embedder::SentenceEmbeddingsModel;
//! use awful_faq::engine::RetrievalEngine;
//! use awful_faq::knowledge::KnowledgeStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KnowledgeStore::open("training_data.txt")?;
//! let model = SentenceEmbeddingsModel::load("all-MiniLM-L6-v2", "main")?;
//! let mut engine = RetrievalEngine::new(RetrievalSettings::default(), store, model);
//!
//! let result = engine.answer("how can I reset my password")?;
//! if let Some(pair) = result.matched_pair {
//!     println!("{} ({:.2})", pair.answer, result.similarity_score);
//! }
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FaqConfig, RetrievalSettings};
use crate::embedder::Embedder;
use crate::error::{FaqError, Result};
use crate::index::{Hit, VectorIndex};
use crate::knowledge::{KnowledgeStore, QAPair};
use crate::normalize::QueryNormalizer;
use crate::snapshot::{self, IndexSnapshot};
use crate::stats::{StatsSnapshot, StatsTracker};

/// Whether the index reflects the current knowledge store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Stale,
    Ready,
}

/// A ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub pair: QAPair,
    pub score: f32,
}

/// Outcome of a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The chosen pair; `None` when the engine abstained.
    pub matched_pair: Option<QAPair>,
    /// Best cosine similarity found, 0 when the store is empty.
    pub similarity_score: f32,
    pub answered: bool,
    /// Up to `top_k` matches, best first, regardless of the threshold.
    pub candidates: Vec<Candidate>,
}

pub struct RetrievalEngine<E: Embedder> {
    settings: RetrievalSettings,
    store: KnowledgeStore,
    embedder: E,
    index: VectorIndex,
    normalizer: QueryNormalizer,
    stats: StatsTracker,
    state: IndexState,
    snapshot_path: Option<PathBuf>,
}

impl<E: Embedder> RetrievalEngine<E> {
    /// A stale engine over `store`. Nothing is embedded until the first sync.
    pub fn new(settings: RetrievalSettings, store: KnowledgeStore, embedder: E) -> Self {
        Self {
            settings,
            store,
            embedder,
            index: VectorIndex::new(),
            normalizer: QueryNormalizer::default(),
            stats: StatsTracker::new(),
            state: IndexState::Stale,
            snapshot_path: None,
        }
    }

    /// Build an engine from configuration: opens `data_file` (empty when
    /// missing) and wires in the normaliser and snapshot path.
    pub fn from_config(config: &FaqConfig, embedder: E) -> Result<Self> {
        let store = KnowledgeStore::open(&config.data_file)?;
        let mut engine = Self::new(config.retrieval()?, store, embedder)
            .with_normalizer(QueryNormalizer::from_config(config)?);
        if let Some(path) = &config.index_snapshot {
            engine = engine.with_snapshot(path.clone());
        }
        Ok(engine)
    }

    pub fn with_normalizer(mut self, normalizer: QueryNormalizer) -> Self {
        self.normalizer = normalizer;
        self.state = IndexState::Stale;
        self
    }

    /// Cache question embeddings at `path` between runs.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Bring the index in line with the store. No-op when already ready.
    ///
    /// # Errors
    /// Embedding or index build failures. The engine stays stale and keeps
    /// its previous index.
    pub fn sync(&mut self) -> Result<()> {
        if self.state == IndexState::Ready {
            return Ok(());
        }

        self.index = self.build_index(&self.store)?;
        self.state = IndexState::Ready;
        Ok(())
    }

    /// Embed every question in `store` into a new index. `self` is untouched.
    fn build_index(&self, store: &KnowledgeStore) -> Result<VectorIndex> {
        let started = Instant::now();
        let questions: Vec<String> = store
            .all()
            .iter()
            .map(|p| self.normalizer.apply(&p.question))
            .collect();
        let ids: Vec<u64> = store.all().iter().map(|p| p.id).collect();

        let vectors = self.question_vectors(&questions)?;
        let mut index = VectorIndex::new();
        index.build(vectors, &ids)?;

        info!(
            "Index built with {} questions in {:?}",
            ids.len(),
            started.elapsed()
        );
        Ok(index)
    }

    /// Force a full re-embed and rebuild.
    pub fn rebuild(&mut self) -> Result<()> {
        self.state = IndexState::Stale;
        self.sync()
    }

    fn question_vectors(&self, questions: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_id = self.embedder.model_id();
        let fingerprint = snapshot::fingerprint(model_id, questions);

        if let Some(path) = &self.snapshot_path {
            if let Some(vectors) = IndexSnapshot::load_matching(
                path,
                model_id,
                &fingerprint,
                self.embedder.dimension(),
            ) {
                if vectors.len() == questions.len() {
                    return Ok(vectors);
                }
            }
        }

        let texts: Vec<&str> = questions.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != texts.len() {
            return Err(FaqError::Embedding(format!(
                "embedder returned {} vectors for {} questions",
                vectors.len(),
                texts.len()
            )));
        }

        if let Some(path) = &self.snapshot_path {
            let snap = IndexSnapshot {
                model_id: model_id.to_string(),
                fingerprint,
                dimension: self.embedder.dimension(),
                vectors,
            };
            if let Err(e) = snap.save(path) {
                warn!("Failed to save index snapshot {}: {}", path.display(), e);
            }
            return Ok(snap.vectors);
        }

        Ok(vectors)
    }

    /// Add a pair to the store (and its file). The engine becomes stale.
    pub fn append(&mut self, question: &str, answer: &str) -> Result<QAPair> {
        let pair = self.store.append(question, answer)?;
        self.state = IndexState::Stale;
        info!("Added Q&A pair {}: {:?}", pair.id, pair.question);
        Ok(pair)
    }

    /// Reload the store from its file and rebuild the index.
    ///
    /// All-or-nothing: the reloaded pairs and their index replace the current
    /// ones only once both are complete.
    ///
    /// # Errors
    /// [`FaqError::MalformedTrainingData`] or an embedding failure. Either way
    /// the previous pairs, index and state keep serving.
    pub fn retrain(&mut self) -> Result<usize> {
        let store = self.store.reloaded()?;
        let index = self.build_index(&store)?;

        let count = store.size();
        self.store = store;
        self.index = index;
        self.state = IndexState::Ready;
        Ok(count)
    }

    /// Find the best-matching pair for `query` and apply the confidence gate.
    ///
    /// Answers when the best score is at least the threshold (inclusive).
    /// Records exactly one stats entry per successful call.
    ///
    /// # Errors
    /// - [`FaqError::InvalidInput`] for blank queries; nothing else is touched.
    /// - Sync or embedding failures.
    pub fn answer(&mut self, query: &str) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FaqError::InvalidInput("query must not be empty".into()));
        }

        self.sync()?;

        let vector = self.embedder.embed(&self.normalizer.apply(query))?;
        let hits = self.index.search(&vector, self.settings.top_k())?;
        let candidates = hits
            .iter()
            .map(|hit| -> Result<Candidate> {
                Ok(Candidate {
                    pair: self.pair_for(hit)?.clone(),
                    score: hit.score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let similarity_score = candidates.first().map_or(0.0, |c| c.score);
        let answered = !candidates.is_empty() && similarity_score >= self.settings.threshold();
        let matched_pair = if answered {
            candidates.first().map(|c| c.pair.clone())
        } else {
            None
        };

        self.stats.record(answered, similarity_score);
        debug!(
            "Query {:?}: score {:.4}, answered {}, match {:?}",
            query,
            similarity_score,
            answered,
            matched_pair.as_ref().map(|p| p.id)
        );

        Ok(RetrievalResult {
            matched_pair,
            similarity_score,
            answered,
            candidates,
        })
    }

    fn pair_for(&self, hit: &Hit) -> Result<&QAPair> {
        self.store
            .get(hit.row)
            .filter(|p| p.id == hit.id)
            .ok_or(FaqError::IndexNotReady)
    }
}
