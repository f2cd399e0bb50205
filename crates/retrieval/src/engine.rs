//! Retrieval engine
//!
//! Owns the knowledge base, the index and metadata built from it, and the
//! query cache. Everything except the cache is read-only after
//! construction, so one engine is shared by all request handlers.
//!
//! The engine never fails a query: empty input, no keywords and no matches
//! all produce an empty context.

use crate::cache::QueryCache;
use crate::config::load_lexicon;
use crate::index::InvertedIndex;
use crate::keywords::KeywordExtractor;
use crate::knowledge::{ChunkKey, KnowledgeBase};
use crate::lexicon::Lexicon;
use crate::metadata::{self, MetadataMap};
use crate::normalize::normalize;
use crate::scoring::{self, RankedChunk};
use crate::selector::{self, SelectionLimits, SelectionResult};
use crate::tokens::{build_counter, TokenCounter};
use momochat_common::config::RetrievalConfig;
use momochat_common::errors::Result;
use momochat_common::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Full outcome of one retrieval, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub normalized_query: String,
    pub keywords: Vec<String>,
    /// Every chunk that scored, best first
    pub scores: Vec<RankedChunk>,
    pub selection: SelectionResult,
}

impl Retrieval {
    fn empty(normalized_query: String, keywords: Vec<String>) -> Self {
        Self {
            normalized_query,
            keywords,
            scores: Vec::new(),
            selection: SelectionResult::default(),
        }
    }

    /// Context string handed to prompt assembly
    pub fn format(&self) -> String {
        self.selection.format()
    }
}

pub struct RetrievalEngine {
    knowledge: KnowledgeBase,
    config: RetrievalConfig,
    extractor: KeywordExtractor,
    counter: Arc<dyn TokenCounter>,
    index: InvertedIndex,
    metadata: MetadataMap,
    cache: QueryCache,
}

impl RetrievalEngine {
    /// Build the index and chunk metadata, once
    pub fn new(
        knowledge: KnowledgeBase,
        config: RetrievalConfig,
        lexicon: Lexicon,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let start = Instant::now();
        let extractor = KeywordExtractor::new(Arc::new(lexicon), &config.weights);
        let index = Self::build_index(&knowledge);
        let metadata = Self::preprocess_chunks(&knowledge, &extractor, counter.as_ref());
        let cache = QueryCache::new(config.cache_capacity);

        info!(
            chunks = knowledge.len(),
            indexed_tokens = index.len(),
            total_tokens = metadata.values().map(|m| m.token_count).sum::<usize>(),
            counter = counter.name(),
            policy = ?config.overflow_policy,
            cache_capacity = cache.capacity(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Retrieval engine built"
        );

        Self {
            knowledge,
            config,
            extractor,
            counter,
            index,
            metadata,
            cache,
        }
    }

    /// Build from configuration: lexicon file (if any) and token counter
    pub fn from_config(knowledge: KnowledgeBase, config: RetrievalConfig) -> Result<Self> {
        let lexicon = load_lexicon(&config)?;
        let counter = build_counter(&config.tokenizer)?;
        Ok(Self::new(knowledge, config, lexicon, counter))
    }

    pub fn build_index(knowledge: &KnowledgeBase) -> InvertedIndex {
        InvertedIndex::build(knowledge)
    }

    pub fn preprocess_chunks(
        knowledge: &KnowledgeBase,
        extractor: &KeywordExtractor,
        counter: &dyn TokenCounter,
    ) -> MetadataMap {
        metadata::preprocess_chunks(knowledge, extractor, counter)
    }

    /// Context for a chat request; empty when nothing relevant was found.
    ///
    /// The cache key is the query alone, so the cache is only consulted for
    /// the configured `max_chunks`/`max_tokens`. Calls with other limits
    /// always run the pipeline. Only non-empty contexts are cached.
    pub fn get_filtered_context(
        &self,
        query: &str,
        max_chunks: usize,
        max_tokens: usize,
        use_cache: bool,
    ) -> String {
        let start = Instant::now();

        if query.trim().is_empty() {
            metrics::record_retrieval(start.elapsed().as_secs_f64(), "empty", 0);
            return String::new();
        }

        let use_cache = use_cache && self.caches_limits(max_chunks, max_tokens);
        if use_cache {
            if let Some(context) = self.cache.get(query) {
                debug!("Serving context from cache");
                metrics::record_retrieval(start.elapsed().as_secs_f64(), "cached", self.counter.count(&context));
                return context;
            }
        }

        let retrieval = self.retrieve(query, max_chunks, max_tokens);
        let context = retrieval.format();

        if context.is_empty() {
            debug!(keywords = ?retrieval.keywords, "No knowledge base context for query");
            metrics::record_retrieval(start.elapsed().as_secs_f64(), "empty", 0);
            return context;
        }

        for chunk in &retrieval.selection.chunks {
            info!(key = %chunk.key, tokens = chunk.token_count, truncated = chunk.truncated, "KB chunk included");
        }
        info!(
            chunks = retrieval.selection.len(),
            tokens = retrieval.selection.tokens_used,
            "Total KB tokens included"
        );

        if use_cache {
            self.store_context(query, max_chunks, max_tokens, &context);
        }

        metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            "context",
            retrieval.selection.tokens_used,
        );
        context
    }

    /// Run the pipeline without touching the cache
    pub fn retrieve(&self, query: &str, max_chunks: usize, max_tokens: usize) -> Retrieval {
        let normalized_query = normalize(query);
        let keywords = self.extractor.extract(query, self.config.top_n_keywords);
        if keywords.is_empty() {
            return Retrieval::empty(normalized_query, keywords);
        }

        let table = scoring::score(
            &keywords,
            &normalized_query,
            &self.index,
            &self.metadata,
            &self.config.weights,
        );
        let scores = scoring::rank(table, &self.metadata);

        let limits = SelectionLimits::new(&self.config, max_chunks, max_tokens);
        let selection = selector::select(
            &scores,
            &self.knowledge,
            &self.metadata,
            &limits,
            self.counter.as_ref(),
        );

        debug!(
            keywords = ?keywords,
            matched = scores.len(),
            selected = selection.len(),
            "Retrieval complete"
        );

        Retrieval {
            normalized_query,
            keywords,
            scores,
            selection,
        }
    }

    /// True when contexts built with these limits may be cached
    pub fn caches_limits(&self, max_chunks: usize, max_tokens: usize) -> bool {
        max_chunks == self.config.max_chunks && max_tokens == self.config.max_tokens
    }

    /// Cache a context built by `retrieve`. Empty contexts and contexts
    /// built with non-default limits are not stored; returns whether the
    /// context was stored.
    pub fn store_context(&self, query: &str, max_chunks: usize, max_tokens: usize, context: &str) -> bool {
        if context.is_empty() || !self.caches_limits(max_chunks, max_tokens) {
            return false;
        }
        self.cache.set(query, context.to_string());
        true
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Query cache cleared");
    }

    pub fn is_cached(&self, query: &str) -> bool {
        self.cache.contains(query)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn chunk_keys(&self) -> Vec<&ChunkKey> {
        self.knowledge.keys().collect()
    }

    /// Raw text of one chunk
    pub fn chunk_text(&self, key: &str) -> Option<&str> {
        self.knowledge.get(&ChunkKey::from(key))
    }

    pub fn chunk_count(&self) -> usize {
        self.knowledge.len()
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_key;
    use crate::tokens::HeuristicCounter;
    use momochat_common::config::{OverflowPolicy, TokenizerBackend};

    fn corpus() -> KnowledgeBase {
        KnowledgeBase::from_pairs([
            (
                "MOMO_ADVANCE",
                "MoMo Advance est une avance de crédit pour les clients MTN MoMo.\n\n\
                 Eligibility: be active on MoMo for six months. To activate MoMo Advance, \
                 dial *126# and choose Advance.",
            ),
            (
                "XTRA_CASH",
                "XtraCash is a short-term loan. XtraCash amounts range from 500 to 100000 FCFA.\n\n\
                 Repay your xtracash loan within 30 days.",
            ),
            (
                "BASIC_SERVICES",
                "Consultez votre solde (balance) avec *126#. Buy airtime and recharge your MoMo account.",
            ),
            ("TRANSFERS", "Send money to any MTN number. Transfers to other networks are charged."),
            ("SUPPORT", "Call 111 or visit an MTN agency for help."),
        ])
    }

    fn engine_with(knowledge: KnowledgeBase, config: RetrievalConfig) -> RetrievalEngine {
        RetrievalEngine::new(knowledge, config, Lexicon::default(), Arc::new(HeuristicCounter))
    }

    fn engine() -> RetrievalEngine {
        engine_with(corpus(), RetrievalConfig::default())
    }

    #[test]
    fn test_activation_query_ranks_advance_first() {
        let engine = engine();

        let retrieval = engine.retrieve("comment activer momo advance", 2, 600);
        assert!(!retrieval.keywords.contains(&"comment".to_string()));
        assert_eq!(retrieval.scores[0].key.as_str(), "MOMO_ADVANCE");
        assert_eq!(retrieval.selection.chunks[0].key.as_str(), "MOMO_ADVANCE");

        let context = engine.get_filtered_context("comment activer momo advance", 2, 600, false);
        assert!(context.starts_with("[MOMO_ADVANCE]\nMoMo Advance"));
    }

    #[test]
    fn test_exact_product_term() {
        let engine = engine();

        let retrieval = engine.retrieve("xtracash", 2, 600);
        assert_eq!(retrieval.keywords, vec!["xtracash"]);
        assert_eq!(retrieval.scores.len(), 1);
        assert_eq!(retrieval.scores[0].key.as_str(), "XTRA_CASH");
        assert!(retrieval.scores[0].score >= 3.0);
        assert_eq!(retrieval.selection.len(), 1);
    }

    #[test]
    fn test_single_oversized_chunk_returned_whole() {
        let text = "xtracash ".repeat(222).trim_end().to_string();
        let knowledge = KnowledgeBase::from_pairs([("XTRA_CASH", text.clone()), ("SUPPORT", "Call 111".to_string())]);
        let engine = engine_with(knowledge, RetrievalConfig::default());

        let retrieval = engine.retrieve("xtracash", 1, 50);
        assert_eq!(retrieval.selection.len(), 1);
        assert!(!retrieval.selection.chunks[0].truncated);
        assert_eq!(retrieval.selection.tokens_used, 500);

        let context = engine.get_filtered_context("xtracash", 1, 50, false);
        assert_eq!(context, format!("[XTRA_CASH]\n{}", text));
    }

    #[test]
    fn test_equivalent_queries_share_cache_entry() {
        let engine = engine();
        assert_eq!(cache_key("Solde?"), cache_key("solde"));

        let first = engine.get_filtered_context("Solde?", 2, 600, true);
        assert!(first.contains("[BASIC_SERVICES]"));
        assert_eq!(engine.cache_len(), 1);
        assert!(engine.is_cached("solde"));

        let second = engine.get_filtered_context("solde", 2, 600, true);
        assert_eq!(first, second);
        assert_eq!(engine.cache_len(), 1);
    }

    #[test]
    fn test_unrecognizable_query_is_empty_and_not_cached() {
        let engine = engine();

        assert_eq!(engine.get_filtered_context("??? !!!", 2, 600, true), "");
        assert_eq!(engine.get_filtered_context("", 2, 600, true), "");
        assert_eq!(engine.get_filtered_context("   ", 2, 600, true), "");
        assert_eq!(engine.get_filtered_context("the and pour", 2, 600, true), "");
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_no_match_is_empty() {
        let engine = engine();
        assert_eq!(engine.get_filtered_context("zzzz qqqq", 2, 600, true), "");
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_cache_bypass_and_clear() {
        let engine = engine();

        engine.get_filtered_context("xtracash", 2, 600, false);
        assert_eq!(engine.cache_len(), 0);

        engine.get_filtered_context("xtracash", 2, 600, true);
        assert_eq!(engine.cache_len(), 1);

        engine.clear_cache();
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_index_covers_every_chunk_keyword() {
        let engine = engine();

        for (key, meta) in engine.metadata() {
            for keyword in &meta.keywords {
                let postings = engine.index().postings(keyword).unwrap();
                assert!(postings.contains(key), "{} missing from posting of {}", key, keyword);
            }
        }
    }

    #[test]
    fn test_budget_and_chunk_cap_hold() {
        let config = RetrievalConfig {
            overflow_policy: OverflowPolicy::Stop,
            ..RetrievalConfig::default()
        };
        let engine = engine_with(corpus(), config);

        let queries = ["momo", "mtn", "xtracash loan", "transfers momo mtn", "solde 126 momo"];
        let limits = [(1, 10), (2, 30), (3, 60), (5, 1000)];

        for query in queries {
            for (max_chunks, max_tokens) in limits {
                let selection = engine.retrieve(query, max_chunks, max_tokens).selection;
                assert!(selection.len() <= max_chunks);

                let whole: usize = selection.chunks.iter().map(|c| c.token_count).sum();
                assert_eq!(whole, selection.tokens_used);
                assert!(
                    whole <= max_tokens || selection.len() == 1,
                    "{} with ({}, {}) used {} tokens",
                    query,
                    max_chunks,
                    max_tokens,
                    whole
                );
            }
        }
    }

    #[test]
    fn test_synonym_expansion_reaches_english_chunk() {
        let engine = engine();

        // "pret" expands to "loan", "advance" and "avance"
        let retrieval = engine.retrieve("prêt", 2, 600);
        assert_eq!(retrieval.keywords, vec!["pret", "loan", "advance", "avance"]);

        let keys: Vec<&str> = retrieval.scores.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["MOMO_ADVANCE", "XTRA_CASH"]);
    }

    #[test]
    fn test_reduced_limits_do_not_populate_cache() {
        let engine = engine();

        let narrow = engine.get_filtered_context("momo", 1, 600, true);
        assert_eq!(narrow.matches("\n\n[").count(), 0);
        assert_eq!(engine.cache_len(), 0);
        assert!(!engine.store_context("momo", 1, 600, &narrow));
        assert!(!engine.store_context("momo", 2, 300, &narrow));

        let full = engine.get_filtered_context("momo", 2, 600, true);
        assert_eq!(full.matches("\n\n[").count(), 1);
        assert_eq!(engine.cache_len(), 1);

        // A cached default-limit context is never served to a narrower call
        assert_eq!(engine.get_filtered_context("momo", 1, 600, true), narrow);
    }

    #[test]
    fn test_non_ascii_letters_do_not_split_words() {
        let knowledge = KnowledgeBase::from_pairs([("A", "La manœuvre est simple."), ("B", "man page basics")]);
        let engine = engine_with(knowledge, RetrievalConfig::default());

        let retrieval = engine.retrieve("man", 2, 600);
        let keys: Vec<&str> = retrieval.scores.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["B"]);
    }

    #[test]
    fn test_shipped_knowledge_base() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../knowledge");
        let knowledge = KnowledgeBase::from_dir(dir).unwrap();
        let engine = engine_with(knowledge, RetrievalConfig::default());
        assert_eq!(engine.chunk_count(), 12);

        let retrieval = engine.retrieve("comment activer momo advance", 2, 600);
        assert_eq!(retrieval.keywords, vec!["advance", "momo", "activer"]);
        assert_eq!(retrieval.scores[0].key.as_str(), "MOMO_ADVANCE");
        assert_eq!(retrieval.selection.chunks[0].key.as_str(), "MOMO_ADVANCE");

        let retrieval = engine.retrieve("xtracash", 2, 600);
        assert_eq!(retrieval.scores[0].key.as_str(), "XTRA_CASH");
        assert_eq!(retrieval.selection.chunks[0].key.as_str(), "XTRA_CASH");
    }

    #[test]
    fn test_from_config() {
        let config = RetrievalConfig {
            tokenizer: momochat_common::config::TokenizerConfig {
                backend: TokenizerBackend::Heuristic,
                ..Default::default()
            },
            ..RetrievalConfig::default()
        };

        let engine = RetrievalEngine::from_config(corpus(), config).unwrap();
        assert_eq!(engine.chunk_count(), 5);
        assert_eq!(engine.counter().name(), "heuristic");
        assert_eq!(engine.chunk_keys()[0].as_str(), "BASIC_SERVICES");
    }

    #[test]
    fn test_shared_across_threads() {
        let engine = Arc::new(engine());
        let handles: Vec<_> = ["solde", "xtracash", "momo advance", "mtn"]
            .into_iter()
            .map(|query| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| engine.get_filtered_context(query, 2, 600, true))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            let contexts = handle.join().unwrap();
            assert!(contexts.windows(2).all(|w| w[0] == w[1]));
        }
        assert_eq!(engine.cache_len(), 4);
    }
}
