//! This module provides functionality for loading and validating the responder's configuration.
//!
//! It defines the `FaqConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//! Values are checked once, when the file is loaded, so the rest of the crate
//! can trust them.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use awful_faq::config::{FaqConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: FaqConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use tracing::*;

use crate::error::{FaqError, Result};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_MAX_RESPONSE_LENGTH: usize = 500;
pub const DEFAULT_DATA_FILE: &str = "training_data.txt";

/// A single phrase substitution applied to questions before embedding.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct QueryRewrite {
    /// Phrase to look for (matched case-insensitively on word boundaries).
    pub phrase: String,
    /// Text that replaces it.
    pub replacement: String,
}

/// Represents the responder's configuration.
///
/// Every field has a default, so an empty YAML document is a valid
/// configuration that points at `training_data.txt` in the working directory.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct FaqConfig {
    /// Hugging Face repo id, bare sentence-transformers name, or a local model directory.
    pub model_id: String,

    /// Revision of the model repo to fetch.
    pub model_revision: String,

    /// Minimum cosine similarity for the responder to commit to an answer.
    pub similarity_threshold: f32,

    /// How many ranked candidates to retrieve per query.
    pub top_k: usize,

    // Presentation layer truncates answers to this many characters.
    pub max_response_length: usize,

    // Q&A knowledge file
    pub data_file: PathBuf,

    // Embedding cache, skipped when unset
    pub index_snapshot: Option<PathBuf>,

    // JSON-lines interaction log, skipped when unset
    pub interaction_log: Option<PathBuf>,

    /// Phrase substitutions, applied in order.
    pub query_rewrites: Vec<QueryRewrite>,

    /// Phrases stripped from questions before embedding.
    pub filler_phrases: Vec<String>,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_revision: "main".to_string(),
            similarity_threshold: DEFAULT_THRESHOLD,
            top_k: 1,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            index_snapshot: None,
            interaction_log: None,
            query_rewrites: Vec::new(),
            filler_phrases: Vec::new(),
        }
    }
}

impl FaqConfig {
    /// Reject values the engine cannot work with.
    ///
    /// # Errors
    /// Returns [`FaqError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model_id.trim().is_empty() {
            return Err(FaqError::Config("model_id must not be empty".into()));
        }
        RetrievalSettings::new(self.similarity_threshold, self.top_k)?;
        if self.max_response_length == 0 {
            return Err(FaqError::Config(
                "max_response_length must be greater than 0".into(),
            ));
        }
        if let Some(rw) = self.query_rewrites.iter().find(|rw| rw.phrase.trim().is_empty()) {
            return Err(FaqError::Config(format!(
                "query rewrite to {:?} has an empty phrase",
                rw.replacement
            )));
        }
        if self.filler_phrases.iter().any(|f| f.trim().is_empty()) {
            return Err(FaqError::Config("filler_phrases must not contain empty entries".into()));
        }
        Ok(())
    }

    /// The validated subset consumed by [`crate::engine::RetrievalEngine`].
    pub fn retrieval(&self) -> Result<RetrievalSettings> {
        RetrievalSettings::new(self.similarity_threshold, self.top_k)
    }
}

/// Confidence gate and fan-out for a retrieval engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    threshold: f32,
    top_k: usize,
}

impl RetrievalSettings {
    /// Build settings, rejecting a threshold outside `[0, 1]` or a zero `top_k`.
    pub fn new(threshold: f32, top_k: usize) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(FaqError::Config(format!(
                "similarity_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if top_k == 0 {
            return Err(FaqError::Config("top_k must be at least 1".into()));
        }
        Ok(Self { threshold, top_k })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            top_k: 1,
        }
    }
}

/// Loads the responder's configuration from a YAML file.
///
/// This function reads the file at the given path, parses it as YAML,
/// fills in defaults for missing fields and validates the result.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(FaqConfig)`: The loaded configuration.
/// - `Err(FaqError)`: The file could not be read ([`FaqError::Io`]) or its
///   contents are not a valid configuration ([`FaqError::Config`]).
pub fn load_config(file: &str) -> Result<FaqConfig> {
    debug!("Loading config: {:?}", file);
    let content = fs::read_to_string(file)?;
    let config: FaqConfig =
        serde_yaml::from_str(&content).map_err(|e| FaqError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "{body}").unwrap();
        temp_file
    }

    #[test]
    fn test_load_config_valid_file() {
        let temp_file = write_config(
            r#"
model_id: "all-MiniLM-L6-v2"
similarity_threshold: 0.65
top_k: 3
max_response_length: 200
data_file: "qa.txt"
index_snapshot: "vectors.bin"
query_rewrites:
  - phrase: "time zone"
    replacement: "timezone"
filler_phrases: ["please", "thanks"]
"#,
        );

        let config = load_config(temp_file.path().to_str().unwrap());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.model_id, "all-MiniLM-L6-v2");
        assert_eq!(config.model_revision, "main");
        assert_eq!(config.similarity_threshold, 0.65);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_response_length, 200);
        assert_eq!(config.data_file, PathBuf::from("qa.txt"));
        assert_eq!(config.index_snapshot, Some(PathBuf::from("vectors.bin")));
        assert_eq!(config.interaction_log, None);
        assert_eq!(config.query_rewrites.len(), 1);
        assert_eq!(config.filler_phrases, vec!["please", "thanks"]);
    }

    #[test]
    fn test_load_config_defaults_for_empty_document() {
        let temp_file = write_config("{}");
        let config = load_config(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config, FaqConfig::default());
        assert_eq!(config.similarity_threshold, 0.7);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config("non/existent/path");
        assert!(matches!(config, Err(FaqError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_format() {
        let temp_file = write_config(r#"invalid: config: format"#);
        let config = load_config(temp_file.path().to_str().unwrap());
        assert!(matches!(config, Err(FaqError::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected_at_load() {
        let temp_file = write_config("similarity_threshold: 1.5");
        let config = load_config(temp_file.path().to_str().unwrap());
        assert!(matches!(config, Err(FaqError::Config(_))));

        let temp_file = write_config("similarity_threshold: -0.1");
        assert!(load_config(temp_file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_zero_top_k_and_length_are_rejected() {
        let temp_file = write_config("top_k: 0");
        assert!(load_config(temp_file.path().to_str().unwrap()).is_err());

        let temp_file = write_config("max_response_length: 0");
        assert!(load_config(temp_file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_retrieval_settings_bounds_are_inclusive() {
        assert!(RetrievalSettings::new(0.0, 1).is_ok());
        assert!(RetrievalSettings::new(1.0, 1).is_ok());
        assert!(RetrievalSettings::new(f32::NAN, 1).is_err());
        let settings = RetrievalSettings::new(0.42, 5).unwrap();
        assert_eq!(settings.threshold(), 0.42);
        assert_eq!(settings.top_k(), 5);
    }
}
