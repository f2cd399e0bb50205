//! Configuration management for MoMoChat services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval engine configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Knowledge base source
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Conversation history
    #[serde(default)]
    pub history: HistoryConfig,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Azure OpenAI resource endpoint (falls back to AZURE_OPENAI_ENDPOINT)
    pub endpoint: Option<String>,

    /// API key (falls back to AZURE_OPENAI_API_KEY); mock replies when unset
    pub api_key: Option<String>,

    /// Deployment name
    #[serde(default = "default_deployment")]
    pub deployment: String,

    /// API version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum completion tokens
    #[serde(default = "default_completion_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum attempts per call
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// First backoff interval in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// What to do with a chunk that overflows the remaining token budget
/// once at least one chunk has been selected.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Budget is a hard cap: stop selecting
    Stop,
    /// Keep the whole paragraphs that fit, then stop
    #[default]
    TruncateParagraphs,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerBackend {
    /// Byte-pair encoding via tiktoken
    #[default]
    Tiktoken,
    /// ~4 characters per token
    Heuristic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub backend: TokenizerBackend,

    /// Model whose encoding is preferred
    #[serde(default = "default_token_model")]
    pub model: String,

    /// Generic encoding used when the model encoding is unavailable
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringWeights {
    /// Added to every chunk in an exact keyword's posting list
    #[serde(default = "default_exact_weight")]
    pub exact: f64,

    /// Added per fuzzy keyword-set hit
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy: f64,

    /// Scale of the bigram Jaccard boost
    #[serde(default = "default_bigram_weight")]
    pub bigram: f64,

    /// Per-character weight when ranking query keywords
    #[serde(default = "default_length_weight")]
    pub length: f64,

    /// Bonus for domain terms when ranking query keywords
    #[serde(default = "default_domain_boost")]
    pub domain_boost: f64,

    /// Shortest side allowed to take part in a fuzzy token match
    #[serde(default = "default_min_prefix")]
    pub min_fuzzy_prefix: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Maximum chunks per context
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,

    /// Token budget for the context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Query keywords kept before synonym expansion
    #[serde(default = "default_top_n")]
    pub top_n_keywords: usize,

    /// Query cache capacity (entries)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Use the query cache for chat requests
    #[serde(default = "default_enabled")]
    pub use_cache: bool,

    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Smallest truncated chunk worth including
    #[serde(default = "default_min_token_keep")]
    pub min_token_keep: usize,

    #[serde(default)]
    pub weights: ScoringWeights,

    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Optional TOML file replacing the built-in lexicon lists
    pub lexicon_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeConfig {
    /// Directory of `*.txt` knowledge chunks
    #[serde(default = "default_knowledge_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Previous exchanges replayed to the model
    #[serde(default = "default_history_turns")]
    pub max_turns: usize,

    /// Exchanges retained per user
    #[serde(default = "default_history_retained")]
    pub max_entries_per_user: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 60 }
fn default_max_concurrent() -> usize { 100 }
fn default_deployment() -> String { "gpt-4o-mini-deployment".to_string() }
fn default_api_version() -> String { "2025-01-01-preview".to_string() }
fn default_temperature() -> f32 { 0.5 }
fn default_completion_tokens() -> u32 { 512 }
fn default_llm_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_llm_retries() -> u32 { 5 }
fn default_initial_backoff() -> u64 { 1_000 }
fn default_max_backoff() -> u64 { 30_000 }
fn default_token_model() -> String { "gpt-4o-mini".to_string() }
fn default_fallback_encoding() -> String { "cl100k_base".to_string() }
fn default_exact_weight() -> f64 { 3.0 }
fn default_fuzzy_weight() -> f64 { 1.25 }
fn default_bigram_weight() -> f64 { 1.0 }
fn default_length_weight() -> f64 { 1.0 }
fn default_domain_boost() -> f64 { 10.0 }
fn default_min_prefix() -> usize { 4 }
fn default_max_chunks() -> usize { 2 }
fn default_max_tokens() -> usize { 600 }
fn default_top_n() -> usize { 12 }
fn default_cache_capacity() -> usize { 500 }
fn default_min_token_keep() -> usize { 100 }
fn default_knowledge_dir() -> String { "knowledge".to_string() }
fn default_history_turns() -> usize { 2 }
fn default_history_retained() -> usize { 20 }
fn default_origins() -> Vec<String> {
    [
        "http://localhost:5173",
        "http://localhost:8000",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8000",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__MAX_TOKENS=800
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl LlmConfig {
    /// Endpoint from config, else the provider's conventional env var
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| std::env::var("AZURE_OPENAI_ENDPOINT").ok())
            .filter(|e| !e.trim().is_empty())
    }

    /// API key from config, else the provider's conventional env var
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("AZURE_OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: default_deployment(),
            api_version: default_api_version(),
            temperature: default_temperature(),
            max_tokens: default_completion_tokens(),
            timeout_secs: default_llm_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_llm_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            backend: TokenizerBackend::default(),
            model: default_token_model(),
            fallback_encoding: default_fallback_encoding(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact: default_exact_weight(),
            fuzzy: default_fuzzy_weight(),
            bigram: default_bigram_weight(),
            length: default_length_weight(),
            domain_boost: default_domain_boost(),
            min_fuzzy_prefix: default_min_prefix(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            max_tokens: default_max_tokens(),
            top_n_keywords: default_top_n(),
            cache_capacity: default_cache_capacity(),
            use_cache: default_enabled(),
            overflow_policy: OverflowPolicy::default(),
            min_token_keep: default_min_token_keep(),
            weights: ScoringWeights::default(),
            tokenizer: TokenizerConfig::default(),
            lexicon_path: None,
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self { dir: default_knowledge_dir() }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_history_turns(),
            max_entries_per_user: default_history_retained(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: default_origins() }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
