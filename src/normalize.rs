//! Text normalisation applied to both stored questions and incoming queries.
//!
//! Lowercases, applies configured phrase rewrites on word boundaries, strips
//! filler phrases and collapses whitespace. Because the same transform runs on
//! both sides, a query identical to a stored question always embeds to the
//! same vector.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{FaqConfig, QueryRewrite};
use crate::error::{FaqError, Result};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    rewrites: Vec<(Regex, String)>,
    fillers: Vec<Regex>,
}

impl QueryNormalizer {
    pub fn new(rewrites: &[QueryRewrite], fillers: &[String]) -> Result<Self> {
        let rewrites = rewrites
            .iter()
            .map(|rw| Ok((phrase_regex(&rw.phrase)?, rw.replacement.to_lowercase())))
            .collect::<Result<Vec<_>>>()?;
        let fillers = fillers
            .iter()
            .map(|f| phrase_regex(f))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rewrites, fillers })
    }

    pub fn from_config(config: &FaqConfig) -> Result<Self> {
        Self::new(&config.query_rewrites, &config.filler_phrases)
    }

    /// Normalise `text`. Falls back to the lowercased, whitespace-collapsed
    /// input when rewriting would leave nothing behind.
    pub fn apply(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let mut out = lowered.clone();

        for (pattern, replacement) in &self.rewrites {
            out = pattern.replace_all(&out, regex::NoExpand(replacement)).into_owned();
        }
        for filler in &self.fillers {
            out = filler.replace_all(&out, " ").into_owned();
        }

        let out = collapse(&out);
        if out.is_empty() {
            collapse(&lowered)
        } else {
            out
        }
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn phrase_regex(phrase: &str) -> Result<Regex> {
    let escaped = regex::escape(&phrase.trim().to_lowercase());
    Regex::new(&format!(r"\b{escaped}\b"))
        .map_err(|e| FaqError::Config(format!("bad phrase {phrase:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(phrase: &str, replacement: &str) -> QueryRewrite {
        QueryRewrite {
            phrase: phrase.into(),
            replacement: replacement.into(),
        }
    }

    #[test]
    fn test_default_lowercases_and_collapses() {
        let n = QueryNormalizer::default();
        assert_eq!(n.apply("  How   do I\tReset  "), "how do i reset");
    }

    #[test]
    fn test_rewrites_apply_in_order_on_word_boundaries() {
        let n = QueryNormalizer::new(
            &[rewrite("time zone", "timezone"), rewrite("vc", "voice channels")],
            &[],
        )
        .unwrap();
        assert_eq!(n.apply("What Time Zone is it?"), "what timezone is it?");
        assert_eq!(n.apply("join vc"), "join voice channels");
        assert_eq!(n.apply("vcs are fun"), "vcs are fun");
    }

    #[test]
    fn test_fillers_are_stripped() {
        let n = QueryNormalizer::new(&[], &["please".into(), "thank you".into()]).unwrap();
        assert_eq!(n.apply("Please reset my password, thank you"), "reset my password,");
    }

    #[test]
    fn test_empty_result_falls_back_to_input() {
        let n = QueryNormalizer::new(&[], &["thanks".into()]).unwrap();
        assert_eq!(n.apply("Thanks"), "thanks");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let n = QueryNormalizer::new(&[rewrite("a.b", "x")], &[]).unwrap();
        assert_eq!(n.apply("aXb"), "axb");
    }
}
