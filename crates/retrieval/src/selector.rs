//! Token-budgeted chunk selection
//!
//! Greedy over the ranking. A chunk that fits is taken whole. The first
//! chunk is always taken, even when it alone exceeds the budget. A later
//! chunk that overflows is handled by the configured [`OverflowPolicy`],
//! and selection ends there.

use crate::knowledge::{ChunkKey, KnowledgeBase};
use crate::metadata::MetadataMap;
use crate::scoring::RankedChunk;
use crate::tokens::TokenCounter;
use momochat_common::config::{OverflowPolicy, RetrievalConfig};
use regex_lite::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

/// Limits for one selection
#[derive(Debug, Clone, Copy)]
pub struct SelectionLimits {
    pub max_chunks: usize,
    pub max_tokens: usize,
    pub policy: OverflowPolicy,
    /// Truncated chunks below this many tokens are dropped
    pub min_token_keep: usize,
}

impl SelectionLimits {
    /// Policy and floor from configuration, caps from the caller
    pub fn new(config: &RetrievalConfig, max_chunks: usize, max_tokens: usize) -> Self {
        Self {
            max_chunks,
            max_tokens,
            policy: config.overflow_policy,
            min_token_keep: config.min_token_keep,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectedChunk {
    pub key: ChunkKey,
    pub text: String,
    pub token_count: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectionResult {
    pub chunks: Vec<SelectedChunk>,
    pub tokens_used: usize,
}

impl SelectionResult {
    /// `[KEY]\ntext` blocks separated by a blank line
    pub fn format(&self) -> String {
        self.chunks
            .iter()
            .map(|c| format!("[{}]\n{}", c.key, c.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Walk the ranking and fill the budget
pub fn select(
    ranked: &[RankedChunk],
    knowledge: &KnowledgeBase,
    metadata: &MetadataMap,
    limits: &SelectionLimits,
    counter: &dyn TokenCounter,
) -> SelectionResult {
    let mut result = SelectionResult::default();

    for candidate in ranked {
        if result.chunks.len() >= limits.max_chunks {
            break;
        }

        let (Some(text), Some(meta)) = (knowledge.get(&candidate.key), metadata.get(&candidate.key)) else {
            continue;
        };

        if result.tokens_used + meta.token_count <= limits.max_tokens {
            result.push(&candidate.key, text, meta.token_count, false);
            continue;
        }

        if result.is_empty() {
            debug!(
                key = %candidate.key,
                tokens = meta.token_count,
                budget = limits.max_tokens,
                "Oversized first chunk included whole"
            );
            result.push(&candidate.key, text, meta.token_count, false);
            break;
        }

        if limits.policy == OverflowPolicy::TruncateParagraphs {
            let remaining = limits.max_tokens - result.tokens_used;
            match truncate_to_paragraphs(text, remaining, counter) {
                Some((kept, tokens)) if tokens >= limits.min_token_keep => {
                    debug!(key = %candidate.key, tokens, remaining, "Chunk truncated to fit");
                    result.push(&candidate.key, &kept, tokens, true);
                }
                _ => {
                    debug!(key = %candidate.key, remaining, "Overflowing chunk dropped");
                }
            }
        }
        break;
    }

    result
}

impl SelectionResult {
    fn push(&mut self, key: &ChunkKey, text: &str, tokens: usize, truncated: bool) {
        self.chunks.push(SelectedChunk {
            key: key.clone(),
            text: text.to_string(),
            token_count: tokens,
            truncated,
        });
        self.tokens_used += tokens;
    }
}

fn paragraph_break() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("paragraph pattern is valid"))
}

/// Longest prefix of whole paragraphs fitting in `budget` tokens
fn truncate_to_paragraphs(text: &str, budget: usize, counter: &dyn TokenCounter) -> Option<(String, usize)> {
    let mut best = None;
    let mut kept: Vec<&str> = Vec::new();

    for paragraph in paragraph_break().split(text.trim()) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        kept.push(paragraph);
        let candidate = kept.join("\n\n");
        let tokens = counter.count(&candidate);
        if tokens > budget {
            break;
        }
        best = Some((candidate, tokens));
    }

    best
}
