use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "attempts_started_total",
        "Total number of assessment attempts started"
    )
    .unwrap();

    pub static ref ATTEMPTS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_submitted_total",
        "Total number of attempts submitted",
        &["outcome"]
    )
    .unwrap();

    pub static ref ATTEMPTS_GRADED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_graded_total",
        "Total number of attempts graded",
        &["passed"]
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["question_type"]
    )
    .unwrap();

    pub static ref REVIEWS_COMPLETED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reviews_completed_total",
        "Total number of manual reviews completed",
        &["verdict"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Just verify that all metrics are properly registered
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = ATTEMPTS_GRADED_TOTAL.with_label_values(&["true"]).get();
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let result = render_metrics();
        assert!(result.is_ok());
        assert!(result.unwrap().contains("http_requests_total"));
    }
}
