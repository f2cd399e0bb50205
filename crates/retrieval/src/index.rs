//! Inverted index: normalized token to the chunks containing it
//!
//! Boolean containment only; no positions or frequencies.

use crate::keywords::tokenize;
use crate::knowledge::{ChunkKey, KnowledgeBase};
use crate::normalize::normalize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, Vec<ChunkKey>>,
}

impl InvertedIndex {
    /// Index every distinct token of every chunk
    pub fn build(knowledge: &KnowledgeBase) -> Self {
        let mut postings: HashMap<String, Vec<ChunkKey>> = HashMap::new();

        for (key, text) in knowledge.iter() {
            let tokens: BTreeSet<String> = tokenize(&normalize(text)).into_iter().collect();
            for token in tokens {
                postings.entry(token).or_default().push(key.clone());
            }
        }

        Self { postings }
    }

    /// Chunks containing `token`, in key order
    pub fn postings(&self, token: &str) -> Option<&[ChunkKey]> {
        self.postings.get(token).map(Vec::as_slice)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.postings.contains_key(token)
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let kb = KnowledgeBase::from_pairs([
            ("A", "Solde MoMo: composez *126#"),
            ("B", "Le solde du compte XtraCash"),
        ]);
        let index = InvertedIndex::build(&kb);

        let solde: Vec<&str> = index.postings("solde").unwrap().iter().map(ChunkKey::as_str).collect();
        assert_eq!(solde, vec!["A", "B"]);
        assert_eq!(index.postings("126").unwrap(), &[ChunkKey::from("A")]);
        assert!(index.contains("xtracash"));

        // Short tokens and raw casing are never indexed
        assert!(!index.contains("le"));
        assert!(!index.contains("Solde"));
        assert!(index.postings("absent").is_none());
    }

    #[test]
    fn test_repeated_token_posted_once() {
        let kb = KnowledgeBase::from_pairs([("A", "momo momo MOMO")]);
        let index = InvertedIndex::build(&kb);
        assert_eq!(index.postings("momo").unwrap().len(), 1);
        assert_eq!(index.len(), 1);
    }
}
