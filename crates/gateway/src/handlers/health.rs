//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: ReadyChecks,
}

#[derive(Serialize)]
pub struct ReadyChecks {
    pub knowledge_base: KnowledgeCheck,
    pub cache: CacheCheck,
    pub model: String,
}

#[derive(Serialize)]
pub struct KnowledgeCheck {
    pub chunks: usize,
    pub keys: Vec<String>,
    pub indexed_tokens: usize,
}

#[derive(Serialize)]
pub struct CacheCheck {
    pub entries: usize,
    pub capacity: usize,
}

/// Liveness check, ok whenever the server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Chatbot API is running!".to_string(),
    })
}

/// Readiness check, the engine is built and holds chunks
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let engine = &state.engine;
    let ready = engine.chunk_count() > 0;

    let response = ReadyResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadyChecks {
            knowledge_base: KnowledgeCheck {
                chunks: engine.chunk_count(),
                keys: engine.chunk_keys().into_iter().map(|k| k.to_string()).collect(),
                indexed_tokens: engine.index().len(),
            },
            cache: CacheCheck {
                entries: engine.cache_len(),
                capacity: engine.config().cache_capacity,
            },
            model: state.model.name().to_string(),
        },
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}
