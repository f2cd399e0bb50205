//! Chat handler
//!
//! Retrieval, prompt assembly, the model call and history for one message.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::history::{Exchange, GUEST_USER_ID, GUEST_USERNAME};
use crate::llm::ChatMessage;
use crate::prompt::{self, SUPPORT_CHUNK};
use crate::AppState;
use momochat_common::{
    errors::{AppError, Result},
    metrics,
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Answer one user message
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;
    if request.message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "`message` must be a non-empty string".to_string(),
            field: Some("message".to_string()),
        });
    }

    tracing::info!(user_id = GUEST_USER_ID, username = GUEST_USERNAME, "Chat request from public user");

    let retrieval = &state.config.retrieval;
    let context = state.engine.get_filtered_context(
        &request.message,
        retrieval.max_chunks,
        retrieval.max_tokens,
        retrieval.use_cache,
    );

    let system = prompt::system_prompt(
        GUEST_USERNAME,
        state.engine.chunk_text(SUPPORT_CHUNK),
        &context,
        &chrono::Local::now(),
    );

    let history = match state
        .history
        .recent(GUEST_USER_ID, state.config.history.max_turns)
        .await
    {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load history, continuing without it");
            Vec::new()
        }
    };

    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(ChatMessage::system(system));
    for exchange in &history {
        messages.push(ChatMessage::user(exchange.user_query.clone()));
        messages.push(ChatMessage::assistant(exchange.ai_response.clone()));
    }
    messages.push(ChatMessage::user(request.message.clone()));

    let reply = state.model.complete(&messages).await?;
    let response = prompt::post_process(&reply);

    let counter = state.engine.counter();
    let input_tokens: usize = messages.iter().map(|m| counter.count(&m.content)).sum();
    let output_tokens = counter.count(&response);
    metrics::record_llm_tokens(input_tokens, output_tokens);

    if let Err(e) = state
        .history
        .record(GUEST_USER_ID, Exchange::new(request.message, response.clone()))
        .await
    {
        tracing::warn!(error = %e, "Failed to record exchange");
    }

    tracing::info!(
        kb_included = !context.is_empty(),
        history_turns = history.len(),
        input_tokens,
        output_tokens,
        latency_ms = start.elapsed().as_millis() as u64,
        "Chat completed"
    );

    Ok(Json(ChatResponse { response }))
}
