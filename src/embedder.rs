//! # Embedder
//!
//! Turns question text into fixed-length vectors.
//!
//! [`Embedder`] is the seam the engine depends on. The production
//! implementation, [`SentenceEmbeddingsModel`], runs a BERT sentence-transformer
//! (all-MiniLM-L6-v2 by default, 384-d) with Candle: tokenize, forward pass,
//! mean pooling over the attention mask, then L2 normalisation.
//!
//! Model files come from the Hugging Face Hub cache, or from a local directory
//! holding `config.json`, `tokenizer.json` and `model.safetensors`.
//!
//! ## Quick Example
//! ```no_run
//! use awful_faq::embedder::{Embedder, SentenceEmbeddingsModel};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SentenceEmbeddingsModel::load("all-MiniLM-L6-v2", "main")?;
//! let vectors = model.embed_batch(&["How do I reset my password?", "Where are the rules?"])?;
//! assert_eq!(vectors[0].len(), model.dimension());
//! # Ok(()) }
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{FaqError, Result};

/// Texts per forward pass.
const BATCH_SIZE: usize = 32;
const MAX_SEQUENCE_TOKENS: usize = 512;

/// Maps text to a vector. Must be deterministic for a given model.
pub trait Embedder {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Identity of the underlying model, used to key cached embeddings.
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order. Empty input gives empty output.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Where the model files live.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// A directory on disk.
    Local(PathBuf),
    /// A Hugging Face Hub repo at a revision.
    Hub { repo: String, revision: String },
}

impl ModelSource {
    /// Resolve a configured model id.
    ///
    /// An existing directory wins; a bare name like `all-MiniLM-L6-v2` is
    /// looked up under `sentence-transformers/`.
    pub fn resolve(model_id: &str, revision: &str) -> Self {
        let path = Path::new(model_id);
        if path.is_dir() {
            return ModelSource::Local(path.to_path_buf());
        }
        let repo = if model_id.contains('/') {
            model_id.to_string()
        } else {
            format!("sentence-transformers/{model_id}")
        };
        ModelSource::Hub {
            repo,
            revision: revision.to_string(),
        }
    }

    /// Identity used as the model id, and so in snapshot fingerprints.
    /// Hub models carry their revision, so a revision change re-embeds.
    pub fn identity(&self) -> String {
        match self {
            ModelSource::Local(dir) => dir.display().to_string(),
            ModelSource::Hub { repo, revision } => format!("{repo}@{revision}"),
        }
    }

    fn files(&self) -> Result<(PathBuf, PathBuf, PathBuf)> {
        match self {
            ModelSource::Local(dir) => {
                let files = (
                    dir.join("config.json"),
                    dir.join("tokenizer.json"),
                    dir.join("model.safetensors"),
                );
                for f in [&files.0, &files.1, &files.2] {
                    if !f.is_file() {
                        return Err(FaqError::ModelUnavailable(format!(
                            "missing {}",
                            f.display()
                        )));
                    }
                }
                Ok(files)
            }
            ModelSource::Hub { repo, revision } => {
                let unavailable = |e: hf_hub::api::sync::ApiError| {
                    FaqError::ModelUnavailable(format!("{repo}@{revision}: {e}"))
                };
                let api = Api::new().map_err(unavailable)?;
                let api_repo = api.repo(Repo::with_revision(
                    repo.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));
                Ok((
                    api_repo.get("config.json").map_err(unavailable)?,
                    api_repo.get("tokenizer.json").map_err(unavailable)?,
                    api_repo.get("model.safetensors").map_err(unavailable)?,
                ))
            }
        }
    }
}

/// Sentence embeddings model using Candle (pure Rust)
pub struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
    show_progress: bool,
}

impl SentenceEmbeddingsModel {
    /// Load a model by id (see [`ModelSource::resolve`]).
    ///
    /// # Errors
    /// [`FaqError::ModelUnavailable`] if the files cannot be fetched or the
    /// weights, config or tokenizer fail to load.
    pub fn load(model_id: &str, revision: &str) -> Result<Self> {
        let source = ModelSource::resolve(model_id, revision);
        info!("Loading embedding model {:?}", source);
        Self::from_source(&source)
    }

    pub fn from_source(source: &ModelSource) -> Result<Self> {
        let device = Device::Cpu;
        let (config_filename, tokenizer_filename, weights_filename) = source.files()?;

        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            FaqError::ModelUnavailable(format!("{what}: {e}"))
        };

        let config = std::fs::read_to_string(&config_filename)
            .map_err(|e| unavailable("reading config.json", &e))?;
        let config: Config =
            serde_json::from_str(&config).map_err(|e| unavailable("parsing config.json", &e))?;
        let dimension = config.hidden_size;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_filename)
            .map_err(|e| unavailable("loading tokenizer", &e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| unavailable("configuring truncation", &e))?;

        // SAFETY: the safetensors file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device) }
            .map_err(|e| unavailable("mapping weights", &e))?;
        let model = BertModel::load(vb, &config).map_err(|e| unavailable("building model", &e))?;

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: source.identity(),
            dimension,
            show_progress: false,
        })
    }

    /// Draw a progress bar on stderr while embedding large batches.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// One padded forward pass over `texts`.
    fn encode_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| FaqError::Embedding(format!("tokenization error: {e}")))?;

        let token_ids = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let attention_mask = encodings
            .iter()
            .map(|enc| Tensor::new(enc.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let token_ids = Tensor::stack(&token_ids, 0)?;
        let attention_mask = Tensor::stack(&attention_mask, 0)?;
        let token_type_ids = token_ids.zeros_like()?;

        let output = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = self.mean_pooling(&output, &attention_mask)?;
        let normalized = normalize_rows(&pooled)?;
        Ok(normalized.to_vec2::<f32>()?)
    }

    /// Mean pooling over token embeddings, considering attention mask
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        // embeddings: [batch, seq_len, hidden]; mask becomes [batch, seq_len, 1]
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        Ok(sum.broadcast_div(&count)?)
    }
}

/// L2 normalize each row of a `[batch, hidden]` tensor
fn normalize_rows(tensor: &Tensor) -> Result<Tensor> {
    let norm = tensor
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(f32::EPSILON, f32::INFINITY)?;
    Ok(tensor.broadcast_div(&norm)?)
}

fn progress_bar(len: usize, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} questions") {
        pb.set_style(style);
    }
    pb
}

impl Embedder for SentenceEmbeddingsModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode_chunk(&[text])?
            .pop()
            .ok_or_else(|| FaqError::Embedding("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let progress = progress_bar(texts.len(), self.show_progress);

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.encode_chunk(chunk)?);
            progress.inc(chunk.len() as u64);
        }
        progress.finish_and_clear();

        debug!("Embedded {} texts with {}", vectors.len(), self.model_id);
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::BagOfWordsEmbedder;

    #[test]
    fn test_resolve_bare_name_uses_sentence_transformers() {
        assert_eq!(
            ModelSource::resolve("all-MiniLM-L6-v2", "main"),
            ModelSource::Hub {
                repo: "sentence-transformers/all-MiniLM-L6-v2".into(),
                revision: "main".into()
            }
        );
        assert_eq!(
            ModelSource::resolve("BAAI/bge-small-en-v1.5", "v1"),
            ModelSource::Hub {
                repo: "BAAI/bge-small-en-v1.5".into(),
                revision: "v1".into()
            }
        );
    }

    #[test]
    fn test_progress_bar_tracks_batch_length() {
        assert!(progress_bar(64, false).is_hidden());
        assert_eq!(progress_bar(64, true).length(), Some(64));
    }

    #[test]
    fn test_identity_includes_hub_revision() {
        let main = ModelSource::resolve("all-MiniLM-L6-v2", "main");
        let pinned = ModelSource::resolve("all-MiniLM-L6-v2", "c9745ed1");
        assert_eq!(main.identity(), "sentence-transformers/all-MiniLM-L6-v2@main");
        assert_ne!(main.identity(), pinned.identity());
        assert_ne!(
            crate::snapshot::fingerprint(&main.identity(), &["q".to_string()]),
            crate::snapshot::fingerprint(&pinned.identity(), &["q".to_string()])
        );

        let local = ModelSource::Local(PathBuf::from("/models/minilm"));
        assert_eq!(local.identity(), "/models/minilm");
    }

    #[test]
    fn test_resolve_existing_directory_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let id = dir.path().to_str().unwrap();
        assert_eq!(
            ModelSource::resolve(id, "main"),
            ModelSource::Local(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_local_directory_without_files_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SentenceEmbeddingsModel::from_source(&ModelSource::Local(dir.path().into()))
            .err()
            .unwrap();
        assert!(matches!(err, FaqError::ModelUnavailable(_)));
    }

    #[test]
    fn test_default_batch_handles_empty_input() {
        let embedder = BagOfWordsEmbedder::default();
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
        let two = embedder.embed_batch(&["a b", "c"]).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[0], embedder.embed("a b").unwrap());
    }

    #[test]
    #[ignore = "downloads sentence-transformers/all-MiniLM-L6-v2"]
    fn test_sentence_embeddings_model() -> Result<()> {
        let model = SentenceEmbeddingsModel::load("all-MiniLM-L6-v2", "main")?;
        assert_eq!(model.dimension(), 384);

        let vectors = model.embed_batch(&["Rust is cool.", "I love programming.", "Hi"])?;
        assert_eq!(vectors.len(), 3);
        for v in &vectors {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-3);
        }

        // Padding must not change a text's embedding.
        let single = model.embed("Hi")?;
        let diff: f32 = single.iter().zip(&vectors[2]).map(|(a, b)| (a - b).abs()).sum();
        assert!(diff < 1e-3);
        Ok(())
    }
}
