//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all MoMoChat metrics
pub const METRICS_PREFIX: &str = "momochat";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for in-process retrieval (sub-millisecond to a few ms)
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.0001, // 100us
    0.0005, // 500us
    0.001,  // 1ms
    0.002,  // 2ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.050,  // 50ms
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval queries by outcome"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_context_tokens", METRICS_PREFIX),
        Unit::Count,
        "Tokens in the last assembled context"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    // Tokenizer metrics
    describe_counter!(
        format!("{}_tokenizer_fallback_total", METRICS_PREFIX),
        Unit::Count,
        "Times the generic encoding replaced the model encoding"
    );

    // Language model metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model calls by status"
    );

    describe_counter!(
        format!("{}_llm_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model retries"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model call latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_tokens_total", METRICS_PREFIX),
        Unit::Count,
        "Prompt and completion tokens sent to and received from the model"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record retrieval metrics
///
/// `outcome` is one of `context`, `empty`, `cached`.
pub fn record_retrieval(duration_secs: f64, outcome: &str, context_tokens: usize) {
    counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);

    gauge!(format!("{}_retrieval_context_tokens", METRICS_PREFIX)).set(context_tokens as f64);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

/// Helper to record a token-counting fallback
pub fn record_tokenizer_fallback(model: &str, encoding: &str) {
    counter!(
        format!("{}_tokenizer_fallback_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "encoding" => encoding.to_string()
    )
    .increment(1);
}

/// Helper to record language model metrics
pub fn record_llm(duration_secs: f64, deployment: &str, attempts: u32, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "deployment" => deployment.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if attempts > 1 {
        counter!(
            format!("{}_llm_retries_total", METRICS_PREFIX),
            "deployment" => deployment.to_string()
        )
        .increment(u64::from(attempts - 1));
    }

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "deployment" => deployment.to_string()
    )
    .record(duration_secs);
}

/// Helper to record prompt/completion token usage
pub fn record_llm_tokens(input_tokens: usize, output_tokens: usize) {
    counter!(
        format!("{}_llm_tokens_total", METRICS_PREFIX),
        "direction" => "input"
    )
    .increment(input_tokens as u64);

    counter!(
        format!("{}_llm_tokens_total", METRICS_PREFIX),
        "direction" => "output"
    )
    .increment(output_tokens as u64);
}
