//! # Knowledge store
//!
//! The ordered collection of question/answer pairs the responder can draw from,
//! and its plain-text file format:
//!
//! ```text
//! # comments are allowed between blocks
//! Q: How do I reset my password?
//! A: Go to settings and click 'Reset Password'.
//!
//! Q: Where are the rules?
//! A: Pinned in #rules.
//!    Read them before posting.
//! ```
//!
//! Blocks are usually separated by blank lines, though a `Q:` line right after
//! an answer also starts a new block. A block is a single `Q:` line followed by
//! an `A:` line; the answer may continue over the following non-blank lines.
//! Text outside a block is skipped. Leading and trailing whitespace on every
//! line is ignored.
//!
//! Position in the store is the join key with the vector index: pair `i` is
//! row `i`. Ids are not written to the file. Each load hands out fresh ids from
//! a counter that only moves forward, so an id is never reused within a process.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FaqError, Result};

const QUESTION_MARKER: &str = "Q:";
const ANSWER_MARKER: &str = "A:";

/// One curated question and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QAPair {
    pub id: u64,
    pub question: String,
    pub answer: String,
}

/// Question/answer text parsed from a source, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPair {
    pub question: String,
    pub answer: String,
}

/// Ordered, file-backed collection of [`QAPair`]s.
#[derive(Debug)]
pub struct KnowledgeStore {
    source: PathBuf,
    pairs: Vec<QAPair>,
    next_id: u64,
}

impl KnowledgeStore {
    /// An empty store that persists to `source`. Nothing is read or written.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            pairs: Vec::new(),
            next_id: 0,
        }
    }

    /// Open the store at `source`, loading it if the file exists.
    ///
    /// A missing file gives an empty store; any other read or parse failure
    /// is returned.
    pub fn open(source: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(source);
        if store.source.exists() {
            store.load()?;
        } else {
            info!(
                "Training data file {} not found, starting empty",
                store.source.display()
            );
        }
        Ok(store)
    }

    /// Re-read the source file and replace every pair.
    ///
    /// All-or-nothing: on failure the in-memory pairs are untouched.
    ///
    /// # Errors
    /// [`FaqError::MalformedTrainingData`] when the file cannot be read or a
    /// block is incomplete.
    pub fn load(&mut self) -> Result<usize> {
        let content = fs::read_to_string(&self.source).map_err(|e| {
            FaqError::malformed(None, format!("cannot read {}: {e}", self.source.display()))
        })?;
        let parsed = parse(&content)?;

        let mut next_id = self.next_id;
        self.pairs = parsed
            .into_iter()
            .map(|p| {
                let pair = QAPair {
                    id: next_id,
                    question: p.question,
                    answer: p.answer,
                };
                next_id += 1;
                pair
            })
            .collect();
        self.next_id = next_id;

        info!(
            "Loaded {} Q&A pairs from {}",
            self.pairs.len(),
            self.source.display()
        );
        Ok(self.pairs.len())
    }

    /// A fresh store parsed from the same source, leaving `self` untouched.
    ///
    /// Ids continue from this store's counter, so committing the result never
    /// reuses an id.
    pub fn reloaded(&self) -> Result<Self> {
        let mut next = Self {
            source: self.source.clone(),
            pairs: Vec::new(),
            next_id: self.next_id,
        };
        next.load()?;
        Ok(next)
    }

    /// Validate, persist and append a new pair.
    ///
    /// The block is appended to the source file first; memory only changes once
    /// the write succeeded.
    ///
    /// # Errors
    /// - [`FaqError::InvalidInput`] for blank text or text that would not
    ///   survive a reload (see [`validate_pair`]).
    /// - [`FaqError::Io`] if the source cannot be written.
    pub fn append(&mut self, question: &str, answer: &str) -> Result<QAPair> {
        let (question, answer) = validate_pair(question, answer)?;

        // Existing content must end in a blank line before the new block.
        let separator = match fs::read(&self.source) {
            Ok(bytes) if bytes.is_empty() => "",
            Ok(bytes) if bytes.ends_with(b"\n") => "\n",
            Ok(_) => "\n\n",
            Err(_) => "",
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.source)?;
        let block = format!("{separator}{}", render_block(&question, &answer));
        file.write_all(block.as_bytes())?;
        file.flush()?;

        let pair = QAPair {
            id: self.next_id,
            question,
            answer,
        };
        self.next_id += 1;
        self.pairs.push(pair.clone());
        debug!("Appended Q&A pair {}", pair.id);
        Ok(pair)
    }

    /// Rewrite the source file in canonical form.
    pub fn save(&self) -> Result<()> {
        fs::write(&self.source, self.render())?;
        Ok(())
    }

    /// The whole store in the on-disk format.
    pub fn render(&self) -> String {
        self.pairs
            .iter()
            .map(|p| render_block(&p.question, &p.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn all(&self) -> &[QAPair] {
        &self.pairs
    }

    pub fn get(&self, position: usize) -> Option<&QAPair> {
        self.pairs.get(position)
    }

    pub fn size(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

fn render_block(question: &str, answer: &str) -> String {
    format!("{QUESTION_MARKER} {question}\n{ANSWER_MARKER} {answer}\n")
}

/// Trim and check a pair before it is stored.
///
/// Questions must be a single non-blank line. Answers may span lines, but
/// not blank ones, and no line may start with a block marker, otherwise the
/// file would parse differently on the next load.
pub fn validate_pair(question: &str, answer: &str) -> Result<(String, String)> {
    let question = question.trim();
    let answer = answer.trim();

    if question.is_empty() {
        return Err(FaqError::InvalidInput("question must not be empty".into()));
    }
    if answer.is_empty() {
        return Err(FaqError::InvalidInput("answer must not be empty".into()));
    }
    if question.lines().count() > 1 {
        return Err(FaqError::InvalidInput(
            "question must be a single line".into(),
        ));
    }

    let mut lines = Vec::new();
    for line in answer.lines() {
        let line = line.trim();
        if line.is_empty() {
            return Err(FaqError::InvalidInput(
                "answer must not contain blank lines".into(),
            ));
        }
        if is_marker(line) {
            return Err(FaqError::InvalidInput(format!(
                "answer line {line:?} starts with a block marker"
            )));
        }
        lines.push(line);
    }

    Ok((question.to_string(), lines.join("\n")))
}

fn is_marker(line: &str) -> bool {
    line.starts_with(QUESTION_MARKER) || line.starts_with(ANSWER_MARKER)
}

enum Block {
    Idle,
    Question { line: usize, question: String },
    Answer { question: String, answer: Vec<String> },
}

fn open_question(rest: &str, lineno: usize) -> Result<Block> {
    let question = rest.trim();
    if question.is_empty() {
        return Err(FaqError::malformed(Some(lineno), "empty question"));
    }
    Ok(Block::Question {
        line: lineno,
        question: question.to_string(),
    })
}

/// Parse the Q/A text format into ordered pairs.
///
/// # Errors
/// [`FaqError::MalformedTrainingData`] with the offending line number when a
/// question has no answer, an answer has no question, or a marker carries no
/// text.
pub fn parse(content: &str) -> Result<Vec<ParsedPair>> {
    let mut pairs = Vec::new();
    let mut block = Block::Idle;

    for (idx, raw) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            block = match block {
                Block::Question { line, .. } => {
                    return Err(FaqError::malformed(
                        Some(line),
                        "question has no matching answer",
                    ));
                }
                Block::Answer { question, answer } => {
                    pairs.push(ParsedPair {
                        question,
                        answer: answer.join("\n"),
                    });
                    Block::Idle
                }
                Block::Idle => Block::Idle,
            };
            continue;
        }

        block = match block {
            Block::Idle => {
                if let Some(rest) = line.strip_prefix(QUESTION_MARKER) {
                    open_question(rest, lineno)?
                } else if line.starts_with(ANSWER_MARKER) {
                    return Err(FaqError::malformed(
                        Some(lineno),
                        "answer without a preceding question",
                    ));
                } else {
                    if !line.starts_with('#') {
                        debug!("Skipping text outside a Q&A block at line {}", lineno);
                    }
                    Block::Idle
                }
            }
            Block::Question { line: qline, question } => {
                if let Some(rest) = line.strip_prefix(ANSWER_MARKER) {
                    let answer = rest.trim();
                    if answer.is_empty() {
                        return Err(FaqError::malformed(Some(lineno), "empty answer"));
                    }
                    Block::Answer {
                        question,
                        answer: vec![answer.to_string()],
                    }
                } else {
                    return Err(FaqError::malformed(
                        Some(qline),
                        "question has no matching answer",
                    ));
                }
            }
            Block::Answer {
                question,
                mut answer,
            } => {
                if let Some(rest) = line.strip_prefix(QUESTION_MARKER) {
                    // next block starts without a separating blank line
                    pairs.push(ParsedPair {
                        question,
                        answer: answer.join("\n"),
                    });
                    open_question(rest, lineno)?
                } else if line.starts_with(ANSWER_MARKER) {
                    return Err(FaqError::malformed(
                        Some(lineno),
                        "second answer for the same question",
                    ));
                } else {
                    answer.push(line.to_string());
                    Block::Answer { question, answer }
                }
            }
        };
    }

    match block {
        Block::Question { line, .. } => Err(FaqError::malformed(
            Some(line),
            "question has no matching answer",
        )),
        Block::Answer { question, answer } => {
            pairs.push(ParsedPair {
                question,
                answer: answer.join("\n"),
            });
            Ok(pairs)
        }
        Block::Idle => Ok(pairs),
    }
}
