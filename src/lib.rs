//! # Awful FAQ (library root)
//!
//! Semantic question answering over a curated Q&A knowledge base, built to
//! sit behind a chat support bot:
//! - Knowledge file parsing and persistence (`knowledge`).
//! - Sentence embeddings with a local BERT model (`embedder`).
//! - Exact cosine top-k search (`index`) with an optional on-disk cache (`snapshot`).
//! - Query normalization (`normalize`), retrieval with a confidence gate
//!   (`engine`) and running statistics (`stats`).
//! - The message-facing facade (`responder`) and its interaction log (`interactions`).
//! - CLI parsing (`commands`) and configuration (`config`).
//!
//! A question is answered only when the best stored question is at least
//! `similarity_threshold` similar to it; otherwise the responder abstains and
//! the chat layer shows a fallback message.
//!
//! ## Configuration discovery
//! The CLI reads `config.yaml` from the per-platform configuration directory
//! unless `--config` (or `AFQ_CONFIG`) points elsewhere:
//!
//! - macOS: `~/Library/Application Support/com.awful-sec.afq/config.yaml`
//! - Linux (XDG): `~/.config/afq/config.yaml`
//! - Windows: `C:\Users\<you>\AppData\Roaming\awful-sec\afq\config\config.yaml`
//!
//! ## Modules
//! - [`commands`], [`config`], [`embedder`], [`engine`], [`error`], [`index`],
//!   [`interactions`], [`knowledge`], [`normalize`], [`responder`], [`snapshot`], [`stats`]

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod commands;
pub mod config;
pub mod embedder;
pub mod engine;
pub mod error;
pub mod index;
pub mod interactions;
pub mod knowledge;
pub mod normalize;
pub mod responder;
pub mod snapshot;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use engine::{RetrievalEngine, RetrievalResult};
pub use error::{FaqError, Result};
pub use knowledge::{KnowledgeStore, QAPair};
pub use responder::{MessageMeta, Responder};

/// Return the per-platform configuration directory used by `afq`.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "awful-sec", "afq")`. The directory is **not** created here;
/// `afq init` creates it.
///
/// # Errors
/// Returns [`FaqError::Config`] if the platform configuration directory cannot
/// be determined (rare, but possible in heavily sandboxed environments).
///
/// # Examples
/// ```rust
/// let cfg = awful_faq::config_dir().expect("has a config dir");
/// println!("config at {}", cfg.display());
/// ```
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "awful-sec", "afq")
        .ok_or_else(|| FaqError::Config("Unable to determine config directory".into()))?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// `config.yaml` inside [`config_dir`].
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.yaml"))
}
