use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
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

    // Redis Metrics
    pub static ref CACHE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_operations_total",
        "Total number of Redis operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref CACHE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "cache_operation_duration_seconds",
        "Redis operation duration in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]
    )
    .unwrap();

    // Video requirement tracking
    pub static ref PROGRESS_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "video_progress_writes_total",
        "Progress snapshots written",
        &["status"]
    )
    .unwrap();

    pub static ref SESSION_INCREMENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "video_session_increments_total",
        "Completed viewing sessions recorded",
        &["status"]
    )
    .unwrap();

    pub static ref REQUIREMENTS_MET_TOTAL: IntCounter = register_int_counter!(
        "video_requirements_met_total",
        "Exercises whose viewing requirement became satisfied"
    )
    .unwrap();

    // Spreadsheet ingestion
    pub static ref IMPORT_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "import_runs_total",
        "Spreadsheet imports by outcome",
        &["profile", "outcome"]
    )
    .unwrap();

    pub static ref IMPORT_ROWS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "import_rows_total",
        "Spreadsheet rows by outcome",
        &["profile", "outcome"]
    )
    .unwrap();

    pub static ref IMPORT_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "import_duration_seconds",
        "Time to parse and store one spreadsheet",
        &["profile"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limit_rejections_total",
        "Requests rejected by a rate limiter",
        &["scope"]
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
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
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

/// Helper: track Redis operation with metrics
pub async fn track_cache_operation<F, T>(operation: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    CACHE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    CACHE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

/// Row counters for one finished import.
pub fn record_import_rows(profile: &str, processed: usize, skipped: usize) {
    IMPORT_ROWS_TOTAL
        .with_label_values(&[profile, "processed"])
        .inc_by(processed as u64);
    IMPORT_ROWS_TOTAL
        .with_label_values(&[profile, "skipped"])
        .inc_by(skipped as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
    }

    #[test]
    fn import_rows_are_counted_by_outcome() {
        let before = IMPORT_ROWS_TOTAL
            .with_label_values(&["metrics-test", "skipped"])
            .get();
        record_import_rows("metrics-test", 9, 1);

        assert_eq!(
            IMPORT_ROWS_TOTAL
                .with_label_values(&["metrics-test", "skipped"])
                .get(),
            before + 1
        );
        assert!(
            IMPORT_ROWS_TOTAL
                .with_label_values(&["metrics-test", "processed"])
                .get()
                >= 9
        );
    }

    #[tokio::test]
    async fn failed_db_operations_are_labelled() {
        let result: anyhow::Result<()> = track_db_operation("find_one", "metrics_test", async {
            Err(anyhow::anyhow!("boom"))
        })
        .await;

        assert!(result.is_err());
        assert!(
            DB_OPERATIONS_TOTAL
                .with_label_values(&["find_one", "metrics_test", "error"])
                .get()
                >= 1
        );
    }
}
