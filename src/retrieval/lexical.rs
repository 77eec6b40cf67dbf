//! Lexical boosts layered on top of semantic similarity

use crate::config::{AnchorRule, RetrievalConfig};
use ahash::AHashSet;

/// Shingles of three words must be longer than this many characters to count as key phrases
const MIN_TRIGRAM_CHARS: usize = 10;
/// Shingles of two words must be longer than this many characters to count as key phrases
const MIN_BIGRAM_CHARS: usize = 8;
/// Keyword terms must be longer than this many characters
const MIN_TERM_CHARS: usize = 2;

/// Boost components for one chunk against one query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LexicalBoost {
    pub exact_phrase: f32,
    pub key_phrase: f32,
    pub keyword: f32,
}

impl LexicalBoost {
    pub fn total(&self) -> f32 {
        self.exact_phrase + self.key_phrase + self.keyword
    }
}

/// Lower-cased query pre-split into the pieces the boosts look for
#[derive(Debug, Clone)]
pub struct QueryTerms {
    phrase: String,
    key_phrases: Vec<String>,
    keywords: Vec<String>,
    anchors: Vec<(String, f32)>,
}

impl QueryTerms {
    pub fn new(query: &str, config: &RetrievalConfig) -> Self {
        let phrase = query.trim().to_lowercase();
        let words: Vec<&str> = phrase.split_whitespace().collect();

        let stop_bigrams: AHashSet<String> = config
            .stop_bigrams
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();

        let mut seen = AHashSet::new();
        let mut key_phrases = Vec::new();

        for window in words.windows(3) {
            let shingle = window.join(" ");
            if shingle.chars().count() > MIN_TRIGRAM_CHARS && seen.insert(shingle.clone()) {
                key_phrases.push(shingle);
            }
        }
        for window in words.windows(2) {
            let shingle = window.join(" ");
            if shingle.chars().count() > MIN_BIGRAM_CHARS
                && !stop_bigrams.contains(&shingle)
                && seen.insert(shingle.clone())
            {
                key_phrases.push(shingle);
            }
        }

        let mut seen_terms = AHashSet::new();
        let keywords = words
            .iter()
            .filter(|w| w.chars().count() > MIN_TERM_CHARS)
            .filter(|w| seen_terms.insert(**w))
            .map(|w| w.to_string())
            .collect();

        let anchors = matched_anchor_rules(&phrase, &config.anchor_rules)
            .map(|rule| (rule.anchor.to_lowercase(), rule.bonus))
            .collect();

        Self {
            phrase,
            key_phrases,
            keywords,
            anchors,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.phrase.is_empty()
    }

    pub fn key_phrases(&self) -> &[String] {
        &self.key_phrases
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Score `chunk_text` against the query
    pub fn boost(&self, chunk_text: &str, config: &RetrievalConfig) -> LexicalBoost {
        let chunk = chunk_text.to_lowercase();

        let exact_phrase = if !self.phrase.is_empty() && chunk.contains(&self.phrase) {
            config.exact_phrase_boost
        } else {
            0.0
        };

        let mut key_phrase = self
            .key_phrases
            .iter()
            .filter(|p| chunk.contains(p.as_str()))
            .count() as f32
            * config.key_phrase_boost;

        for (anchor, bonus) in &self.anchors {
            if chunk.contains(anchor.as_str()) {
                key_phrase += bonus;
            }
        }

        let keyword = if self.keywords.is_empty() {
            0.0
        } else {
            let found = self
                .keywords
                .iter()
                .filter(|t| chunk.contains(t.as_str()))
                .count();
            found as f32 / self.keywords.len() as f32 * config.keyword_boost_weight
        };

        LexicalBoost {
            exact_phrase,
            key_phrase,
            keyword,
        }
    }
}

/// Anchor rules whose trigger phrase occurs in `query` (case-insensitive)
pub fn matched_anchor_rules<'a>(
    query: &str,
    rules: &'a [AnchorRule],
) -> impl Iterator<Item = &'a AnchorRule> {
    let query = query.to_lowercase();
    rules
        .iter()
        .filter(move |rule| query.contains(&rule.trigger.to_lowercase()))
}
