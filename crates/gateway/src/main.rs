//! MoMoChat API Gateway
//!
//! The entry point for all chat traffic.
//! Handles:
//! - Knowledge base loading and retrieval engine construction
//! - Prompt assembly and language model calls
//! - Rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod history;
mod llm;
mod middleware;
mod prompt;

use anyhow::Context;
use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use momochat_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, RETRIEVAL_BUCKETS},
};
use momochat_retrieval::{KnowledgeBase, RetrievalEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::history::{HistoryStore, InMemoryHistory};
use crate::llm::ChatModel;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: Arc<RetrievalEngine>,
    pub model: Arc<dyn ChatModel>,
    pub history: Arc<dyn HistoryStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting MoMoChat API Gateway v{}", momochat_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    // Build the retrieval engine
    let knowledge = KnowledgeBase::from_dir(&config.knowledge.dir)
        .with_context(|| format!("Failed to load knowledge base from {}", config.knowledge.dir))?;
    let engine = RetrievalEngine::from_config(knowledge, config.retrieval.clone())
        .context("Failed to build retrieval engine")?;

    let model = llm::build_chat_model(&config.llm).context("Failed to create language model client")?;
    let history = InMemoryHistory::new(config.history.max_entries_per_user);

    let config = Arc::new(config);

    // Create app state
    let state = AppState {
        config: config.clone(),
        engine: Arc::new(engine),
        model,
        history: Arc::new(history),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Log filter from RUST_LOG, else the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Prometheus scrape endpoint on `metrics_port`; 0 disables it
fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)),
            RETRIEVAL_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/context", post(handlers::context::context))
        .route("/cache/clear", post(handlers::context::clear_cache));

    if config.rate_limit.enabled {
        let limit = RateLimit::new(config.rate_limit.requests_per_second, config.rate_limit.burst);
        api_routes = api_routes.route_layer(from_fn_with_state(limit, rate_limit_middleware));
    }

    // Compose the app
    Router::new()
        // Health endpoints (never rate limited)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(GlobalConcurrencyLimitLayer::new(config.server.max_concurrent_requests.max(1)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, MockChatModel, Role};
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use momochat_common::config::RetrievalConfig;
    use momochat_common::errors::Result;
    use momochat_retrieval::{HeuristicCounter, Lexicon};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Replies "ok" and keeps every conversation it was sent
    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok("**Voici**\n* composez *126#".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn test_engine() -> RetrievalEngine {
        let knowledge = KnowledgeBase::from_pairs([
            ("XTRA_CASH", "MoMo Xtra Cash is a loan for MoMo customers.\n\nRepay the loan before the due date."),
            ("BASIC_SERVICES", "Check your balance by dialing *105#. The solde is shown on screen."),
            ("SUPPORT", "Call 111 or write to support@momo.cg"),
        ]);
        RetrievalEngine::new(knowledge, RetrievalConfig::default(), Lexicon::default(), Arc::new(HeuristicCounter))
    }

    fn test_state(model: Arc<dyn ChatModel>, mut config: AppConfig) -> AppState {
        config.observability.metrics_port = 0;
        AppState {
            config: Arc::new(config),
            engine: Arc::new(test_engine()),
            model,
            history: Arc::new(InMemoryHistory::new(10)),
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state(Arc::new(MockChatModel), AppConfig::default()));
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "message": "Chatbot API is running!"}));
    }

    #[tokio::test]
    async fn test_ready_reports_knowledge_base() {
        let app = create_router(test_state(Arc::new(MockChatModel), AppConfig::default()));
        let (status, body) = send(&app, "GET", "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["knowledge_base"]["chunks"], 3);
        assert_eq!(body["checks"]["knowledge_base"]["keys"][0], "BASIC_SERVICES");
        assert_eq!(body["checks"]["model"], "mock");
    }

    #[tokio::test]
    async fn test_chat_with_mock_model() {
        let app = create_router(test_state(Arc::new(MockChatModel), AppConfig::default()));
        let (status, body) = send(&app, "POST", "/v1/chat", Some(json!({"message": "Xtra Cash loan?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["response"].as_str().unwrap().contains("Xtra Cash loan?"));
    }

    #[tokio::test]
    async fn test_chat_prompt_and_history() {
        let model = Arc::new(RecordingModel::default());
        let app = create_router(test_state(model.clone(), AppConfig::default()));

        let (status, body) = send(&app, "POST", "/v1/chat", Some(json!({"message": "xtracash loan"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Voici\n  • composez *126#");

        let (status, _) = send(&app, "POST", "/v1/chat", Some(json!({"message": "hello there"}))).await;
        assert_eq!(status, StatusCode::OK);

        let seen = model.seen.lock().unwrap();
        let first = &seen[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::System);
        assert!(first[0].content.contains("Knowledge Base Data:\n[XTRA_CASH]"));
        assert!(first[0].content.contains("Call 111"));

        // No match: no knowledge section, previous exchange replayed
        let second = &seen[1];
        assert!(!second[0].content.contains("Knowledge Base Data:"));
        assert_eq!(second.len(), 4);
        assert_eq!(second[1].content, "xtracash loan");
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[3].content, "hello there");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let app = create_router(test_state(Arc::new(MockChatModel), AppConfig::default()));

        let (status, body) = send(&app, "POST", "/v1/chat", Some(json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field"], "message");

        let (status, _) = send(&app, "POST", "/v1/chat", Some(json!({"message": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/v1/chat", Some(json!({"text": "hi"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_context_diagnostics_and_cache_clear() {
        let app = create_router(test_state(Arc::new(MockChatModel), AppConfig::default()));

        let request = json!({"query": "Solde MoMo?", "use_cache": true});
        let (status, body) = send(&app, "POST", "/v1/context", Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["normalized_query"], "solde momo");
        assert_eq!(body["chunks"][0]["key"], "BASIC_SERVICES");
        assert!(body["context"].as_str().unwrap().starts_with("[BASIC_SERVICES]\n"));
        assert_eq!(body["cached"], false);

        let (_, body) = send(&app, "POST", "/v1/context", Some(request.clone())).await;
        assert_eq!(body["cached"], true);

        let (status, body) = send(&app, "POST", "/v1/cache/clear", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], 1);

        let (_, body) = send(&app, "POST", "/v1/context", Some(json!({"query": "solde", "max_chunks": 0}))).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_narrow_diagnostics_do_not_shrink_chat_context() {
        let model = Arc::new(RecordingModel::default());
        let app = create_router(test_state(model.clone(), AppConfig::default()));

        let request = json!({"query": "Solde MoMo?", "max_chunks": 1, "use_cache": true});
        let (status, body) = send(&app, "POST", "/v1/context", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunks"].as_array().unwrap().len(), 1);
        assert_eq!(body["context"], format!("[BASIC_SERVICES]\n{}", "Check your balance by dialing *105#. The solde is shown on screen."));

        let (status, _) = send(&app, "POST", "/v1/chat", Some(json!({"message": "Solde MoMo?"}))).await;
        assert_eq!(status, StatusCode::OK);

        let seen = model.seen.lock().unwrap();
        let system = &seen[0][0].content;
        assert!(system.contains("Knowledge Base Data:\n[BASIC_SERVICES]"));
        assert!(system.contains("\n\n[XTRA_CASH]\n"));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = create_router(test_state(Arc::new(MockChatModel), config));

        let request = json!({"query": "solde"});
        let (first, _) = send(&app, "POST", "/v1/context", Some(request.clone())).await;
        let (second, body) = send(&app, "POST", "/v1/context", Some(request)).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");

        // Health checks bypass the limiter
        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
