//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DeskFlow metrics
pub const METRICS_PREFIX: &str = "deskflow";

/// Histogram buckets for submission latency (in seconds).
/// Submissions include uploads and an email round trip.
pub const SUBMISSION_BUCKETS: &[f64] = &[
    0.100,
    0.250,
    0.500,
    1.000,
    2.500,
    5.000,
    10.00,
    30.00,
    60.00,
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

    // Submission pipeline
    describe_counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        Unit::Count,
        "Purchase-order submissions by outcome and last stage reached"
    );

    describe_histogram!(
        format!("{}_submission_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end submission latency in seconds"
    );

    // Storage
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Attachment uploads by status"
    );

    describe_counter!(
        format!("{}_upload_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Attachment bytes uploaded"
    );

    // Mail
    describe_counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        Unit::Count,
        "Notification emails by status and provider"
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

/// Record a finished submission attempt
pub fn record_submission(duration_secs: f64, outcome: &str, stage: &str) {
    counter!(
        format!("{}_submissions_total", METRICS_PREFIX),
        "outcome" => outcome.to_string(),
        "stage" => stage.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_submission_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);
}

/// Record one attachment upload
pub fn record_upload(bytes: u64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    if success {
        counter!(format!("{}_upload_bytes_total", METRICS_PREFIX)).increment(bytes);
    }
}

/// Record one email dispatch
pub fn record_email(provider: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_emails_sent_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in SUBMISSION_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        let metrics = RequestMetrics::start("POST", "/v1/purchase-orders");
        metrics.finish(201);
        record_submission(0.5, "success", "complete");
        record_upload(1024, true);
        record_email("smtp", false);
    }
}
