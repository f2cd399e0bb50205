//! Token counting
//!
//! The selector's budget arithmetic depends on these counts, so the
//! counter is injected into the engine rather than chosen inside it.

use momochat_common::config::{TokenizerBackend, TokenizerConfig};
use momochat_common::errors::{AppError, Result};
use momochat_common::metrics;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base, CoreBPE};
use tracing::{info, warn};

/// Counts tokens in a piece of text
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize;

    /// Encoding or strategy name, for logs and diagnostics
    fn name(&self) -> &str;
}

/// Byte-pair encoding counter backed by tiktoken
pub struct TiktokenCounter {
    bpe: CoreBPE,
    name: String,
}

impl TiktokenCounter {
    /// Use the encoding of `model`, or `fallback_encoding` when the model is
    /// unknown to the tokenizer. The fallback is logged and counted.
    pub fn for_model(model: &str, fallback_encoding: &str) -> Result<Self> {
        let lower = model.to_ascii_lowercase();

        match get_bpe_from_model(&lower) {
            Ok(bpe) => Ok(Self { bpe, name: lower }),
            Err(e) => {
                warn!(
                    model = %model,
                    fallback = %fallback_encoding,
                    error = %e,
                    "Model encoding unavailable, using fallback encoding"
                );
                metrics::record_tokenizer_fallback(model, fallback_encoding);
                Self::for_encoding(fallback_encoding)
            }
        }
    }

    /// Load an encoding by name
    pub fn for_encoding(encoding: &str) -> Result<Self> {
        let lower = encoding.to_ascii_lowercase();
        let bpe = match lower.as_str() {
            "o200k_base" => o200k_base(),
            "cl100k_base" => cl100k_base(),
            "p50k_base" => p50k_base(),
            "r50k_base" => r50k_base(),
            _ => {
                return Err(AppError::Configuration {
                    message: format!("Unsupported encoding: {}", encoding),
                })
            }
        }
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to load encoding {}: {}", encoding, e),
        })?;

        Ok(Self { bpe, name: lower })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Roughly 4 characters per token; no tokenizer data needed
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Build the configured counter
pub fn build_counter(config: &TokenizerConfig) -> Result<Arc<dyn TokenCounter>> {
    let counter: Arc<dyn TokenCounter> = match config.backend {
        TokenizerBackend::Tiktoken => Arc::new(TiktokenCounter::for_model(
            &config.model,
            &config.fallback_encoding,
        )?),
        TokenizerBackend::Heuristic => Arc::new(HeuristicCounter),
    };

    info!(counter = counter.name(), "Token counter ready");
    Ok(counter)
}
