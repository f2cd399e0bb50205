//! Knowledge base: the static chunk corpus
//!
//! Loaded once before the engine is built and never mutated afterwards.

use momochat_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Stable chunk identifier, e.g. `XTRA_CASH`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkKey(String);

impl ChunkKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Chunk key to raw text, iterated in key order
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    chunks: BTreeMap<ChunkKey, String>,
}

impl KnowledgeBase {
    /// Build from in-memory pairs; later duplicates replace earlier ones
    pub fn from_pairs<K, T, I>(pairs: I) -> Self
    where
        K: Into<String>,
        T: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        let chunks = pairs
            .into_iter()
            .map(|(k, t)| (ChunkKey::new(k), t.into()))
            .collect();

        Self { chunks }
    }

    /// Load every `*.txt` file in `dir`.
    ///
    /// The upper-cased file stem is the key and the trimmed file body is the
    /// text. Blank files are skipped. Fails when the directory cannot be read
    /// or yields no chunks.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| AppError::KnowledgeBase {
            message: format!("Cannot read knowledge directory {}: {}", dir.display(), e),
        })?;

        let mut chunks = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping knowledge file with non UTF-8 name");
                continue;
            };

            let text = std::fs::read_to_string(&path)?;
            let text = text.trim();
            if text.is_empty() {
                warn!(path = %path.display(), "Skipping empty knowledge file");
                continue;
            }

            let key = ChunkKey::new(stem.to_uppercase());
            debug!(key = %key, chars = text.chars().count(), "Loaded knowledge chunk");
            chunks.insert(key, text.to_string());
        }

        if chunks.is_empty() {
            return Err(AppError::KnowledgeBase {
                message: format!("No knowledge chunks found in {}", dir.display()),
            });
        }

        info!(dir = %dir.display(), chunks = chunks.len(), "Knowledge base loaded");
        Ok(Self { chunks })
    }

    pub fn get(&self, key: &ChunkKey) -> Option<&str> {
        self.chunks.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChunkKey, &str)> {
        self.chunks.iter().map(|(k, t)| (k, t.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ChunkKey> {
        self.chunks.keys()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
