//! Per-chunk metadata computed once at startup

use crate::keywords::KeywordExtractor;
use crate::knowledge::{ChunkKey, KnowledgeBase};
use crate::normalize::{char_bigrams, normalize};
use crate::tokens::TokenCounter;
use std::collections::{BTreeMap, HashSet};

/// Derived, immutable view of one chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Normalized text
    pub normalized: String,

    /// Tokens in the raw text
    pub token_count: usize,

    /// Filtered tokens of the chunk, without synonyms
    pub keywords: HashSet<String>,

    /// Characters in the raw text; ranking tie-break
    pub char_len: usize,

    /// Character bigrams of the normalized text
    pub bigrams: HashSet<(char, char)>,
}

pub type MetadataMap = BTreeMap<ChunkKey, ChunkMetadata>;

/// Compute metadata for every chunk. Deterministic and side-effect free.
pub fn preprocess_chunks(
    knowledge: &KnowledgeBase,
    extractor: &KeywordExtractor,
    counter: &dyn TokenCounter,
) -> MetadataMap {
    knowledge
        .iter()
        .map(|(key, text)| {
            let normalized = normalize(text);
            let metadata = ChunkMetadata {
                token_count: counter.count(text),
                keywords: extractor.chunk_keywords(&normalized),
                char_len: text.chars().count(),
                bigrams: char_bigrams(&normalized),
                normalized,
            };
            (key.clone(), metadata)
        })
        .collect()
}
