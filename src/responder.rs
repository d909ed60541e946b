//! # Responder
//!
//! The surface the chat connector and the admin commands talk to.
//!
//! A [`Responder`] owns one [`RetrievalEngine`] behind a single mutex, so
//! syncs, appends and retrains are serialized with queries. Every method is a
//! plain blocking call; how it gets scheduled (a thread pool, `spawn_blocking`,
//! a single-threaded loop) is up to the caller.
//!
//! ```no_run
//! use awful_faq::config::FaqConfig;
//! use awful_faq::embedder::SentenceEmbeddingsModel;
//! use awful_faq::responder::{MessageMeta, Responder, render_reply};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FaqConfig::default();
//! let model = SentenceEmbeddingsModel::load(&config.model_id, &config.model_revision)?;
//! let responder = Responder::from_config(&config, model)?;
//!
//! let meta = MessageMeta::new("user#1234");
//! let result = responder.handle_message("how can I reset my password", &meta)?;
//! println!("{}", render_reply(&result, config.max_response_length));
//! # Ok(()) }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::config::FaqConfig;
use crate::embedder::{Embedder, ModelSource};
use crate::engine::{IndexState, RetrievalEngine, RetrievalResult};
use crate::error::Result;
use crate::interactions::{InteractionRecord, InteractionSink, JsonlSink, TracingSink};
use crate::knowledge::{KnowledgeStore, QAPair};
use crate::stats::StatsSnapshot;

pub const NO_ANSWER_REPLY: &str =
    "I don't have a good answer for that question. Please contact a server admin for help.";
pub const ERROR_REPLY: &str = "Sorry, I encountered an error while processing your request.";

/// Who sent a message and where. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    pub requester: String,
    pub channel: Option<String>,
}

impl MessageMeta {
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            channel: None,
        }
    }

    pub fn in_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Everything the `stats` admin command shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderStatus {
    pub stats: StatsSnapshot,
    pub pairs: usize,
    pub model_id: String,
    pub threshold: f32,
    pub top_k: usize,
    pub state: IndexState,
}

impl ResponderStatus {
    /// Status of a knowledge base before any model is loaded: no queries,
    /// nothing indexed yet.
    pub fn idle(config: &FaqConfig, store: &KnowledgeStore) -> Result<Self> {
        let settings = config.retrieval()?;
        Ok(Self {
            stats: StatsSnapshot::default(),
            pairs: store.size(),
            model_id: ModelSource::resolve(&config.model_id, &config.model_revision).identity(),
            threshold: settings.threshold(),
            top_k: settings.top_k(),
            state: IndexState::Stale,
        })
    }
}

pub struct Responder<E: Embedder> {
    engine: Mutex<RetrievalEngine<E>>,
    sinks: Vec<Box<dyn InteractionSink>>,
}

impl<E: Embedder> Responder<E> {
    pub fn new(engine: RetrievalEngine<E>) -> Self {
        Self {
            engine: Mutex::new(engine),
            sinks: Vec::new(),
        }
    }

    /// Engine from config, with a tracing sink plus a JSON-lines sink when
    /// `interaction_log` is set.
    pub fn from_config(config: &FaqConfig, embedder: E) -> Result<Self> {
        let mut responder =
            Self::new(RetrievalEngine::from_config(config, embedder)?).with_sink(TracingSink);
        if let Some(path) = &config.interaction_log {
            responder = responder.with_sink(JsonlSink::new(path.clone()));
        }
        Ok(responder)
    }

    pub fn with_sink(mut self, sink: impl InteractionSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    // Engine operations are all-or-nothing, so a guard poisoned by a
    // panicking caller still holds a consistent engine.
    fn engine(&self) -> MutexGuard<'_, RetrievalEngine<E>> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build the index up front instead of on the first message.
    pub fn warm_up(&self) -> Result<()> {
        self.engine().sync()
    }

    /// Answer an incoming chat message and log the interaction.
    pub fn handle_message(&self, text: &str, meta: &MessageMeta) -> Result<RetrievalResult> {
        let result = self.engine().answer(text)?;

        let record =
            InteractionRecord::new(&meta.requester, meta.channel.as_deref(), text, &result);
        for sink in &self.sinks {
            if let Err(e) = sink.record(&record) {
                error!("Error logging interaction: {}", e);
            }
        }
        Ok(result)
    }

    pub fn add_pair(&self, question: &str, answer: &str) -> Result<QAPair> {
        self.engine().append(question, answer)
    }

    /// Reload the knowledge file and rebuild the index.
    pub fn retrain(&self) -> Result<usize> {
        let count = self.engine().retrain()?;
        info!("Retrained with {} Q&A pairs", count);
        Ok(count)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.engine().stats()
    }

    pub fn status(&self) -> ResponderStatus {
        let engine = self.engine();
        let settings = engine.settings();
        ResponderStatus {
            stats: engine.stats(),
            pairs: engine.store().size(),
            model_id: engine.embedder().model_id().to_string(),
            threshold: settings.threshold(),
            top_k: settings.top_k(),
            state: engine.state(),
        }
    }
}

/// Text to send back for `result`, with the answer cut to `max_len` characters.
pub fn render_reply(result: &RetrievalResult, max_len: usize) -> String {
    match &result.matched_pair {
        Some(pair) if result.answered => {
            if pair.answer.chars().count() > max_len {
                let cut: String = pair.answer.chars().take(max_len).collect();
                format!("{cut}...")
            } else {
                pair.answer.clone()
            }
        }
        _ => NO_ANSWER_REPLY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalSettings;
    use crate::error::FaqError;
    use crate::test_support::BagOfWordsEmbedder;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FAQ: &str = "\
Q: How do I reset my password?
A: Go to settings and click 'Reset Password'.

Q: What timezone is the server in?
A: The server runs on UTC.
";

    struct CountingSink(Arc<AtomicUsize>);

    impl InteractionSink for CountingSink {
        fn record(&self, _record: &InteractionRecord) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenSink;

    impl InteractionSink for BrokenSink {
        fn record(&self, _record: &InteractionRecord) -> Result<()> {
            Err(FaqError::Io(std::io::Error::other("log channel gone")))
        }
    }

    fn responder(dir: &tempfile::TempDir) -> Responder<BagOfWordsEmbedder> {
        let path = dir.path().join("training_data.txt");
        fs::write(&path, FAQ).unwrap();
        let store = KnowledgeStore::open(&path).unwrap();
        Responder::new(RetrievalEngine::new(
            RetrievalSettings::default(),
            store,
            BagOfWordsEmbedder::default(),
        ))
    }

    #[test]
    fn test_handle_message_logs_once_per_query() {
        let dir = tempfile::tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let responder = responder(&dir)
            .with_sink(CountingSink(count.clone()))
            .with_sink(BrokenSink);
        let meta = MessageMeta::new("user#1").in_channel("ticket-7");

        let result = responder
            .handle_message("how can I reset my password", &meta)
            .unwrap();
        assert!(result.answered);
        responder
            .handle_message("what is the weather today", &meta)
            .unwrap();
        assert!(responder.handle_message("   ", &meta).is_err());

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(responder.stats().total_queries, 2);
    }

    #[test]
    fn test_jsonl_log_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("training_data.txt");
        fs::write(&data, FAQ).unwrap();
        let log = dir.path().join("interactions.jsonl");
        let config = FaqConfig {
            data_file: data,
            interaction_log: Some(log.clone()),
            ..FaqConfig::default()
        };

        let responder = Responder::from_config(&config, BagOfWordsEmbedder::default()).unwrap();
        responder
            .handle_message("What timezone is the server in?", &MessageMeta::new("u"))
            .unwrap();

        let line = fs::read_to_string(&log).unwrap();
        let record: InteractionRecord = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record.requester, "u");
        assert_eq!(record.matched_answer.as_deref(), Some("The server runs on UTC."));
    }

    #[test]
    fn test_admin_operations() {
        let dir = tempfile::tempdir().unwrap();
        let responder = responder(&dir);
        responder.warm_up().unwrap();

        let pair = responder
            .add_pair("Is there a music bot?", "Yes, use /play.")
            .unwrap();
        let status = responder.status();
        assert_eq!(status.pairs, 3);
        assert_eq!(status.state, IndexState::Stale);
        assert_eq!(status.model_id, "bag-of-words");
        assert_eq!(status.threshold, 0.7);

        let result = responder
            .handle_message("is there a music bot", &MessageMeta::default())
            .unwrap();
        assert_eq!(result.matched_pair.unwrap().id, pair.id);

        assert_eq!(responder.retrain().unwrap(), 3);
        assert_eq!(responder.status().state, IndexState::Ready);
        assert!(matches!(
            responder.add_pair("", "nothing"),
            Err(FaqError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_concurrent_queries_share_one_engine() {
        let dir = tempfile::tempdir().unwrap();
        let responder = Arc::new(responder(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let responder = Arc::clone(&responder);
                std::thread::spawn(move || {
                    let meta = MessageMeta::new(format!("user#{i}"));
                    if i % 2 == 0 {
                        responder.handle_message("How do I reset my password?", &meta)
                    } else {
                        responder.handle_message("what is the weather today", &meta)
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        let stats = responder.stats();
        assert_eq!(stats.total_queries, 8);
        assert_eq!(stats.answered, 4);
    }

    #[tokio::test]
    async fn test_handle_message_from_blocking_task() {
        let dir = tempfile::tempdir().unwrap();
        let responder = Arc::new(responder(&dir));

        let r = Arc::clone(&responder);
        let result = tokio::task::spawn_blocking(move || {
            r.handle_message("what timezone is the server in", &MessageMeta::new("u"))
        })
        .await
        .unwrap()
        .unwrap();

        assert!(result.answered);
        assert_eq!(render_reply(&result, 500), "The server runs on UTC.");
        assert_eq!(responder.status().state, IndexState::Ready);
    }

    #[test]
    fn test_idle_status_needs_no_model() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("training_data.txt");
        fs::write(&data, FAQ).unwrap();
        let config = FaqConfig {
            data_file: data.clone(),
            top_k: 3,
            ..FaqConfig::default()
        };

        let status = ResponderStatus::idle(&config, &KnowledgeStore::open(&data).unwrap()).unwrap();
        assert_eq!(status.pairs, 2);
        assert_eq!(status.top_k, 3);
        assert_eq!(status.state, IndexState::Stale);
        assert_eq!(status.stats.total_queries, 0);
        assert_eq!(status.model_id, "sentence-transformers/all-MiniLM-L6-v2@main");
    }

    #[test]
    fn test_render_reply() {
        let pair = QAPair {
            id: 0,
            question: "q".into(),
            answer: "abcdefghij".into(),
        };
        let mut result = RetrievalResult {
            matched_pair: Some(pair),
            similarity_score: 0.9,
            answered: true,
            candidates: vec![],
        };
        assert_eq!(render_reply(&result, 100), "abcdefghij");
        assert_eq!(render_reply(&result, 4), "abcd...");

        result.answered = false;
        result.matched_pair = None;
        assert_eq!(render_reply(&result, 100), NO_ANSWER_REPLY);
    }
}
