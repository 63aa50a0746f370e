//! Prometheus metrics for cashbook-service.

use cashbook_core::error::AppError;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Histogram,
    HistogramVec, TextEncoder,
};

/// Ledger event counter (no high-cardinality labels).
pub static EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cashbook_events_total",
        "Total number of ledger events recorded",
        &["event_type", "status"] // income/expense/bill/bill_payment + delete/update, not user_id
    )
    .expect("Failed to register events_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cashbook_errors_total",
        "Total number of errors by type",
        &["error_type"] // validation_error, storage_error, etc.
    )
    .expect("Failed to register errors_total")
});

/// Months touched per cascade recomputation.
pub static CASCADE_MONTHS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "cashbook_cascade_months",
        "Number of months recomputed per cascade",
        vec![1.0, 2.0, 3.0, 6.0, 12.0, 24.0, 60.0, 120.0]
    )
    .expect("Failed to register cascade_months")
});

/// Budget overview counter by period.
pub static OVERVIEWS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "cashbook_budget_overviews_total",
        "Total number of budget overviews calculated",
        &["period"]
    )
    .expect("Failed to register budget_overviews_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "cashbook_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Count an error by kind before handing it back to the caller.
pub fn observe_error(err: AppError) -> AppError {
    ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
    err
}

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&EVENTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&CASCADE_MONTHS);
    Lazy::force(&OVERVIEWS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
