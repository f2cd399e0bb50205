//! Retrieval diagnostics

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use momochat_retrieval::{RankedChunk, SelectedChunk};
use momochat_common::errors::{AppError, Result};

/// Context request
#[derive(Debug, Deserialize, Validate)]
pub struct ContextRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Defaults to `retrieval.max_chunks`
    #[validate(range(min = 1, max = 20))]
    pub max_chunks: Option<usize>,

    /// Defaults to `retrieval.max_tokens`
    #[validate(range(min = 1, max = 8000))]
    pub max_tokens: Option<usize>,

    #[serde(default)]
    pub use_cache: bool,
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub query: String,
    pub normalized_query: String,
    pub keywords: Vec<String>,
    pub scores: Vec<RankedChunk>,
    pub chunks: Vec<SelectedChunk>,
    pub tokens_used: usize,
    pub context: String,
    /// The query had a cached context before this call
    pub cached: bool,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

/// Run retrieval for a query and show every stage
pub async fn context(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let engine = &state.engine;
    let max_chunks = request.max_chunks.unwrap_or(engine.config().max_chunks);
    let max_tokens = request.max_tokens.unwrap_or(engine.config().max_tokens);

    let cached = engine.is_cached(&request.query);
    let retrieval = engine.retrieve(&request.query, max_chunks, max_tokens);
    let context = retrieval.format();
    if request.use_cache {
        engine.store_context(&request.query, max_chunks, max_tokens, &context);
    }

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        keywords = ?retrieval.keywords,
        matched = retrieval.scores.len(),
        cached,
        latency_ms = processing_time_ms,
        "Context diagnostics"
    );

    Ok(Json(ContextResponse {
        query: request.query,
        normalized_query: retrieval.normalized_query,
        keywords: retrieval.keywords,
        scores: retrieval.scores,
        chunks: retrieval.selection.chunks,
        tokens_used: retrieval.selection.tokens_used,
        context,
        cached,
        processing_time_ms,
    }))
}

/// Drop every cached context
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let cleared = state.engine.cache_len();
    state.engine.clear_cache();
    Json(ClearCacheResponse { cleared })
}
