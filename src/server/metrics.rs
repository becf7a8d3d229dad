//! Prometheus metrics exposed on the metrics port's `/metrics` endpoint.

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

const PREFIX: &str = "cadence";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("failed to create http_request_duration_seconds metric");

    pub static ref PUBLISH_STAGE_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_publish_stage_transitions_total"), "Publish job stage transitions"),
        &["from", "to"]
    ).expect("failed to create publish_stage_transitions_total metric");

    pub static ref LLM_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_llm_calls_total"), "LLM completion calls"),
        &["purpose", "status"]
    ).expect("failed to create llm_calls_total metric");

    pub static ref RESOLVER_CACHE_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_resolver_cache_total"), "Track resolver cache lookups"),
        &["outcome"]
    ).expect("failed to create resolver_cache_total metric");

    pub static ref HTTP_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_retries_total"), "Retried outbound HTTP calls"),
        &["client"]
    ).expect("failed to create http_retries_total metric");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(PUBLISH_STAGE_TRANSITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LLM_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RESOLVER_CACHE_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_RETRIES_TOTAL.clone()));
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: std::time::Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_stage_transition(from: &str, to: &str) {
    PUBLISH_STAGE_TRANSITIONS_TOTAL.with_label_values(&[from, to]).inc();
}

pub fn record_llm_call(purpose: &str, status: &str) {
    LLM_CALLS_TOTAL.with_label_values(&[purpose, status]).inc();
}

pub fn record_resolver_cache(outcome: &str) {
    RESOLVER_CACHE_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_http_retry(client: &str) {
    HTTP_RETRIES_TOTAL.with_label_values(&[client]).inc();
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_string());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).to_string())
}
