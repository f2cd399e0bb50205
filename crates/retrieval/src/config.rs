//! Retrieval configuration
//!
//! The settings live in `momochat-common` so the gateway can load them with
//! the rest of `AppConfig`; this module re-exports them next to the engine.

pub use momochat_common::config::{
    OverflowPolicy, RetrievalConfig, ScoringWeights, TokenizerBackend, TokenizerConfig,
};

use crate::lexicon::Lexicon;
use momochat_common::errors::Result;

/// Lexicon from `lexicon_path`, or the built-in lists
pub fn load_lexicon(config: &RetrievalConfig) -> Result<Lexicon> {
    match config.lexicon_path.as_deref() {
        Some(path) if !path.trim().is_empty() => Lexicon::from_file(path),
        _ => Ok(Lexicon::default()),
    }
}
