//! # Index snapshot
//!
//! Optional on-disk cache of question embeddings so a restart does not have to
//! re-run the model over the whole knowledge base.
//!
//! The file is a `bincode` encoding of [`IndexSnapshot`]. It is only trusted
//! when its fingerprint (a `blake3` hash over the model id and the ordered
//! question texts) matches the current store exactly. Anything else (missing
//! file, corrupt bytes, different model, edited questions) means "embed again".

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{FaqError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub model_id: String,
    pub fingerprint: String,
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// Stable hash of what the vectors were computed from.
pub fn fingerprint(model_id: &str, questions: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model_id.as_bytes());
    hasher.update(&(questions.len() as u64).to_le_bytes());
    for q in questions {
        hasher.update(&(q.len() as u64).to_le_bytes());
        hasher.update(q.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

impl IndexSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| FaqError::Snapshot(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (snapshot, _) =
            bincode::serde::decode_from_slice::<Self, _>(bytes, bincode::config::standard())
                .map_err(|e| FaqError::Snapshot(e.to_string()))?;
        Ok(snapshot)
    }

    /// Write via a sibling temp file and rename, so readers never see a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        info!(
            "Index snapshot saved to {} ({} vectors)",
            path.display(),
            self.vectors.len()
        );
        Ok(())
    }

    /// Load the cached vectors if they were computed from exactly these inputs.
    pub fn load_matching(
        path: &Path,
        model_id: &str,
        fingerprint: &str,
        dimension: usize,
    ) -> Option<Vec<Vec<f32>>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No index snapshot at {}: {}", path.display(), e);
                return None;
            }
        };
        let snapshot = match Self::decode(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("Ignoring unreadable index snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        if snapshot.model_id != model_id
            || snapshot.fingerprint != fingerprint
            || snapshot.dimension != dimension
            || snapshot.vectors.iter().any(|v| v.len() != dimension)
        {
            info!("Index snapshot {} is stale, re-embedding", path.display());
            return None;
        }

        info!("Index loaded from {}", path.display());
        Some(snapshot.vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> IndexSnapshot {
        let questions = vec!["how do i reset my password?".to_string()];
        IndexSnapshot {
            model_id: "m".into(),
            fingerprint: fingerprint("m", &questions),
            dimension: 3,
            vectors: vec![vec![0.5, 0.25, -1.0]],
        }
    }

    #[test]
    fn test_fingerprint_depends_on_model_and_order() {
        let a = vec!["one".to_string(), "two".to_string()];
        let b = vec!["two".to_string(), "one".to_string()];
        assert_eq!(fingerprint("m", &a), fingerprint("m", &a));
        assert_ne!(fingerprint("m", &a), fingerprint("m", &b));
        assert_ne!(fingerprint("m", &a), fingerprint("other", &a));
        // boundaries between texts are part of the hash
        let joined = vec!["onetwo".to_string()];
        let split = vec!["one".to_string(), "two".to_string()];
        assert_ne!(fingerprint("m", &joined), fingerprint("m", &split));
    }

    #[test]
    fn test_save_and_load_matching() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let snap = sample();
        snap.save(&path).unwrap();

        let vectors = IndexSnapshot::load_matching(&path, "m", &snap.fingerprint, 3);
        assert_eq!(vectors, Some(snap.vectors.clone()));
    }

    #[test]
    fn test_stale_or_corrupt_snapshot_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let snap = sample();
        snap.save(&path).unwrap();

        assert!(IndexSnapshot::load_matching(&path, "other", &snap.fingerprint, 3).is_none());
        assert!(IndexSnapshot::load_matching(&path, "m", "deadbeef", 3).is_none());
        assert!(IndexSnapshot::load_matching(&path, "m", &snap.fingerprint, 384).is_none());

        fs::write(&path, b"not a snapshot").unwrap();
        assert!(IndexSnapshot::load_matching(&path, "m", &snap.fingerprint, 3).is_none());
        assert!(IndexSnapshot::load_matching(&dir.path().join("missing"), "m", "x", 3).is_none());
    }
}
