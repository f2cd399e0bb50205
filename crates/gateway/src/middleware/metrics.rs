//! Request metrics middleware

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use momochat_common::metrics::RequestMetrics;

/// Count and time every request by route template
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let timer = RequestMetrics::start(&method, &endpoint);
    let response = next.run(request).await;
    timer.finish(response.status().as_u16());

    response
}
