//! # Interaction log
//!
//! One record per answered-or-abstained query, handed to whatever sinks the
//! responder was configured with. Sinks are best-effort: a failing sink is
//! logged and never turns a good answer into an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use crate::engine::RetrievalResult;
use crate::error::Result;

/// Characters of question/answer kept by [`TracingSink`].
const LOG_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    /// Opaque id of whoever asked.
    pub requester: String,
    pub channel: Option<String>,
    pub question: String,
    pub matched_answer: Option<String>,
    pub similarity_score: f32,
}

impl InteractionRecord {
    pub fn new(
        requester: &str,
        channel: Option<&str>,
        question: &str,
        result: &RetrievalResult,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            requester: requester.to_string(),
            channel: channel.map(str::to_string),
            question: question.to_string(),
            matched_answer: result.matched_pair.as_ref().map(|p| p.answer.clone()),
            similarity_score: result.similarity_score,
        }
    }
}

pub trait InteractionSink: Send + Sync {
    fn record(&self, record: &InteractionRecord) -> Result<()>;
}

/// Appends records as JSON lines.
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl InteractionSink for JsonlSink {
    fn record(&self, record: &InteractionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(std::io::Error::from)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Emits records as `tracing` events.
pub struct TracingSink;

impl InteractionSink for TracingSink {
    fn record(&self, record: &InteractionRecord) -> Result<()> {
        info!(
            requester = %record.requester,
            channel = record.channel.as_deref().unwrap_or("-"),
            confidence = %format!("{:.2}%", record.similarity_score * 100.0),
            "Q: {} | A: {}",
            preview(&record.question),
            record.matched_answer.as_deref().map_or("<none>".to_string(), preview),
        );
        Ok(())
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > LOG_PREVIEW_CHARS {
        let cut: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
