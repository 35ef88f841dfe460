//! Metrics module
//!
//! Prometheus metrics for benchmark uploads, served at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "upload_bench_uploads_total",
        "Total number of benchmark uploads",
        &["target", "status"]
    ).expect("uploads_total can be registered");

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "upload_bench_upload_bytes_total",
        "Total bytes uploaded"
    ).expect("upload_bytes_total can be registered");

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "upload_bench_upload_duration_seconds",
        "Upload duration in seconds, from session initiation to completion",
        &["target"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).expect("upload_duration can be registered");

    pub static ref UPLOAD_PARTS: Histogram = register_histogram!(
        "upload_bench_upload_parts",
        "Number of parts per multipart upload",
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).expect("upload_parts can be registered");

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "upload_bench_errors_total",
        "Total errors",
        &["type"]
    ).expect("errors_total can be registered");

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "upload_bench_http_requests_total",
        "HTTP requests by route and status code",
        &["route", "status"]
    ).expect("http_requests_total can be registered");
}

/// Record a successful upload
pub fn record_upload_success(target: &str, bytes: u64, parts: u32, duration_secs: f64) {
    UPLOADS_TOTAL.with_label_values(&[target, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_PARTS.observe(parts as f64);
    UPLOAD_DURATION
        .with_label_values(&[target])
        .observe(duration_secs);
}

/// Record a failed upload
pub fn record_upload_failure(target: &str, error_type: &str) {
    UPLOADS_TOTAL.with_label_values(&[target, "failure"]).inc();
    record_error(error_type);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Record an HTTP request
pub fn record_request(route: &str, status: u16) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status.as_str()])
        .inc();
}

/// Encode every registered metric in the Prometheus text format
pub fn gather() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
