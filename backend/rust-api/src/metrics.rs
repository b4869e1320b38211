use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
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

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Content write units
    pub static ref CONTENT_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "content_writes_total",
        "Content write units by entity kind, operation and outcome",
        &["kind", "operation", "status"]
    )
    .unwrap();

    pub static ref CASCADE_ENTITIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cascade_entities_total",
        "Entities removed or repointed by cascades",
        &["kind", "effect"]
    )
    .unwrap();

    pub static ref TRANSACTION_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "transaction_retries_total",
        "Transactions retried after a transient store failure",
        &["operation"]
    )
    .unwrap();

    pub static ref TRANSACTION_ROLLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "transaction_rollbacks_total",
        "Transactions aborted before commit",
        &["operation", "reason"]
    )
    .unwrap();

    pub static ref QUIZ_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_results_total",
        "Quiz results received from clients",
        &["outcome"]
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

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T, E>(operation: &str, collection: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_content_write(kind: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    CONTENT_WRITES_TOTAL
        .with_label_values(&[kind, operation, status])
        .inc();
}

pub fn record_cascade(kind: &str, effect: &str, count: u64) {
    if count > 0 {
        CASCADE_ENTITIES_TOTAL
            .with_label_values(&[kind, effect])
            .inc_by(count);
    }
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
    }

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        record_cascade("lecture", "deleted", 3);

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("cascade_entities_total"));
    }

    #[tokio::test]
    async fn tracked_operation_passes_result_through() {
        let ok: Result<u8, String> = track_db_operation("find", "years", async { Ok(4) }).await;
        assert_eq!(ok, Ok(4));

        let err: Result<u8, String> =
            track_db_operation("find", "years", async { Err("boom".to_string()) }).await;
        assert!(err.is_err());
    }
}
