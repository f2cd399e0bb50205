//! Chunk scoring and ranking
//!
//! Three signals, summed per chunk:
//! - exact: the keyword is an indexed token, every posting gets `exact`
//! - fuzzy: otherwise, chunks with a keyword containing the query keyword,
//!   or a keyword that is a prefix of it (or whose text contains a
//!   multi-word synonym), get `fuzzy`
//! - bigram: chunks that already scored get `bigram * jaccard(query, chunk)`

use crate::index::InvertedIndex;
use crate::knowledge::ChunkKey;
use crate::metadata::{ChunkMetadata, MetadataMap};
use crate::normalize::{bigram_jaccard, char_bigrams};
use momochat_common::config::ScoringWeights;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Sparse per-query scores; chunks with no hit are absent
pub type ScoreTable = HashMap<ChunkKey, f64>;

/// One entry of the ranking
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub key: ChunkKey,
    pub score: f64,
    pub char_len: usize,
}

/// Score every chunk against the query keywords
pub fn score(
    keywords: &[String],
    normalized_query: &str,
    index: &InvertedIndex,
    metadata: &MetadataMap,
    weights: &ScoringWeights,
) -> ScoreTable {
    let mut table = ScoreTable::new();

    for keyword in keywords {
        match index.postings(keyword) {
            Some(keys) => {
                for key in keys {
                    *table.entry(key.clone()).or_insert(0.0) += weights.exact;
                }
            }
            None => {
                for (key, chunk) in metadata {
                    if fuzzy_match(keyword, chunk, weights.min_fuzzy_prefix) {
                        *table.entry(key.clone()).or_insert(0.0) += weights.fuzzy;
                    }
                }
            }
        }
    }

    if table.is_empty() || weights.bigram == 0.0 {
        return table;
    }

    let query_bigrams = char_bigrams(normalized_query);
    for (key, value) in table.iter_mut() {
        if let Some(chunk) = metadata.get(key) {
            *value += weights.bigram * bigram_jaccard(&query_bigrams, &chunk.bigrams);
        }
    }

    table
}

/// Descending score, then shorter chunks first, then key
pub fn rank(table: ScoreTable, metadata: &MetadataMap) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = table
        .into_iter()
        .map(|(key, score)| {
            let char_len = metadata.get(&key).map(|m| m.char_len).unwrap_or(usize::MAX);
            RankedChunk { key, score, char_len }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.char_len.cmp(&b.char_len))
            .then_with(|| a.key.cmp(&b.key))
    });

    ranked
}

/// Fallback match for keywords absent from the index
fn fuzzy_match(keyword: &str, chunk: &ChunkMetadata, min_len: usize) -> bool {
    // Synonym phrases ("xtra cash", "se desabonner") are never single tokens
    if !keyword.chars().all(|c| c.is_ascii_alphanumeric()) {
        return contains_phrase(&chunk.normalized, keyword);
    }

    chunk
        .keywords
        .iter()
        .any(|token| related(token, keyword, min_len))
}

/// `cash` in `xtracash`, or `transfer` as the stem of `transferts`.
/// The shorter side needs at least `min_len` characters.
fn related(token: &str, keyword: &str, min_len: usize) -> bool {
    (keyword.len() >= min_len && token.contains(keyword))
        || (token.len() >= min_len && keyword.starts_with(token))
}

/// Phrase occurrence on word boundaries
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return false;
    }

    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        before.map_or(true, |c| c == ' ') && after.map_or(true, |c| c == ' ')
    })
}
