/// Metrics and telemetry
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Media uploads per backend
/// - Outbound emails
/// - Background job execution

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, route, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("metric can be registered");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("metric can be registered");

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .expect("metric can be registered");

    // ========== Media Metrics ==========

    /// Media uploads by backend, media type and outcome
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "media_uploads_total",
        "Total number of media uploads",
        &["backend", "media_type", "outcome"]
    )
    .expect("metric can be registered");

    // ========== Email Metrics ==========

    /// Emails by kind and outcome (sent, skipped, failed)
    pub static ref EMAILS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "emails_total",
        "Total number of transactional emails",
        &["kind", "outcome"]
    )
    .expect("metric can be registered");

    // ========== Background Jobs ==========

    /// Background job executions by job and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job runs",
        &["job", "status"]
    )
    .expect("metric can be registered");

    /// Process start, for uptime reporting
    pub static ref STARTED_AT: Instant = Instant::now();
}

/// Render all metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a media upload attempt
pub fn record_media_upload(backend: &str, media_type: &str, outcome: &str) {
    MEDIA_UPLOADS_TOTAL
        .with_label_values(&[backend, media_type, outcome])
        .inc();
}

/// Record an email dispatch
pub fn record_email(kind: &str, outcome: &str) {
    EMAILS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Record a background job execution
pub fn record_background_job(job: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL.with_label_values(&[job, status]).inc();
}

/// Seconds since the process started
pub fn uptime_seconds() -> f64 {
    STARTED_AT.elapsed().as_secs_f64()
}

/// Middleware counting requests per matched route
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    HTTP_REQUESTS_ACTIVE.inc();
    let start = Instant::now();
    let response = next.run(request).await;
    HTTP_REQUESTS_ACTIVE.dec();

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}
