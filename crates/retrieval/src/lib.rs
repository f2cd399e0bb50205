//! MoMoChat retrieval engine
//!
//! Keyword retrieval over a small, static knowledge base:
//! - Text normalization (case, accents, punctuation)
//! - Keyword extraction with synonyms and domain boosts
//! - Inverted index and per-chunk metadata, built once
//! - Exact, fuzzy and bigram scoring
//! - Token-budgeted chunk selection
//! - LRU query cache

pub mod cache;
pub mod config;
pub mod engine;
pub mod index;
pub mod keywords;
pub mod knowledge;
pub mod lexicon;
pub mod metadata;
pub mod normalize;
pub mod scoring;
pub mod selector;
pub mod tokens;

pub use cache::{cache_key, QueryCache};
pub use config::{OverflowPolicy, RetrievalConfig, ScoringWeights};
pub use engine::{Retrieval, RetrievalEngine};
pub use index::InvertedIndex;
pub use keywords::KeywordExtractor;
pub use knowledge::{ChunkKey, KnowledgeBase};
pub use lexicon::Lexicon;
pub use metadata::{ChunkMetadata, MetadataMap};
pub use normalize::normalize;
pub use scoring::RankedChunk;
pub use selector::{SelectedChunk, SelectionLimits, SelectionResult};
pub use tokens::{build_counter, HeuristicCounter, TiktokenCounter, TokenCounter};
