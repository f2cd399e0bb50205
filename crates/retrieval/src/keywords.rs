//! Keyword extraction
//!
//! Turns a query into a ranked, deduplicated keyword list:
//! - tokens are alphanumeric runs of 3+ characters over normalized text
//! - stop words are dropped unless they are intent words
//! - tokens are ranked by length, domain boost and in-query rarity
//! - synonyms of the kept tokens are appended

use crate::lexicon::Lexicon;
use crate::normalize::normalize;
use momochat_common::config::ScoringWeights;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Minimum token length
const MIN_TOKEN_LEN: usize = 3;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Scan already-normalized text for tokens, in order of appearance.
///
/// Word boundaries are Unicode-aware: a run of word characters is a token
/// only when every character is `[a-z0-9]`, so letters such as `œ` or `ß`
/// never split a word into fragments.
pub fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !is_word_char(c))
        .filter(|run| {
            run.len() >= MIN_TOKEN_LEN
                && run.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
        .map(str::to_string)
        .collect()
}

/// Keyword extractor bound to a lexicon and ranking weights
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    lexicon: Arc<Lexicon>,
    length_weight: f64,
    domain_boost: f64,
}

impl KeywordExtractor {
    /// Create an extractor
    pub fn new(lexicon: Arc<Lexicon>, weights: &ScoringWeights) -> Self {
        Self {
            lexicon,
            length_weight: weights.length,
            domain_boost: weights.domain_boost,
        }
    }

    /// Extract up to `top_n` ranked keywords from a raw query, followed by
    /// their synonym expansions. Empty when nothing survives filtering.
    pub fn extract(&self, query: &str, top_n: usize) -> Vec<String> {
        let normalized = normalize(query);
        let tokens: Vec<String> = tokenize(&normalized)
            .into_iter()
            .filter(|t| !self.lexicon.is_stop_word(t))
            .collect();

        if tokens.is_empty() {
            return Vec::new();
        }

        let total = tokens.len() as f64;
        let mut frequency: HashMap<&str, usize> = HashMap::new();
        let mut distinct: Vec<&str> = Vec::new();
        for token in &tokens {
            let count = frequency.entry(token.as_str()).or_insert(0);
            if *count == 0 {
                distinct.push(token.as_str());
            }
            *count += 1;
        }

        let mut ranked: Vec<(&str, f64)> = distinct
            .into_iter()
            .map(|t| (t, self.token_score(t, frequency[t] as f64 / total)))
            .collect();

        // Stable: equal scores keep first-seen order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_n);

        let mut keywords: Vec<String> = ranked.iter().map(|(t, _)| t.to_string()).collect();
        for (token, _) in &ranked {
            if let Some(synonyms) = self.lexicon.synonyms_for(token) {
                keywords.extend(synonyms.iter().map(|s| normalize(s)).filter(|s| !s.is_empty()));
            }
        }

        dedup_preserving_order(keywords)
    }

    /// Keyword set of a chunk: filtered tokens, no synonym expansion
    pub fn chunk_keywords(&self, normalized: &str) -> HashSet<String> {
        tokenize(normalized)
            .into_iter()
            .filter(|t| !self.lexicon.is_stop_word(t))
            .collect()
    }

    fn token_score(&self, token: &str, relative_frequency: f64) -> f64 {
        let boost = if self.lexicon.is_domain_term(token) {
            self.domain_boost
        } else {
            0.0
        };
        let rarity = 1.0 / (relative_frequency + 0.1);

        self.length_weight * token.chars().count() as f64 + boost + rarity
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
