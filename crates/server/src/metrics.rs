//! Prometheus metrics for the airlock server.
//!
//! Exposes metrics for chunk ingestion, bundle processing and the worker
//! status channel.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping;
//! restrict it to scraper IPs at the infrastructure level before exposing
//! the server beyond localhost.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Chunk ingestion metrics
pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "airlock_chunks_received_total",
        "Total number of chunks received",
    )
    .expect("metric creation failed")
});

pub static BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "airlock_bytes_received_total",
        "Total chunk bytes received",
    )
    .expect("metric creation failed")
});

// Bundle processing metrics
pub static BUNDLES_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "airlock_bundles_processed_total",
        "Total number of bundles processed successfully",
    )
    .expect("metric creation failed")
});

pub static BUNDLES_ALREADY_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "airlock_bundles_already_processed_total",
        "Total number of processing triggers short-circuited as duplicates",
    )
    .expect("metric creation failed")
});

pub static IMAGES_RESOLVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "airlock_images_resolved_total",
        "Total number of image references resolved from extracted bundles",
    )
    .expect("metric creation failed")
});

pub static EXTRACT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "airlock_extract_duration_seconds",
            "Time taken to extract a bundle archive",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static PROCESS_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "airlock_process_duration_seconds",
            "End-to-end bundle processing time (assembly through worker)",
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
    )
    .expect("metric creation failed")
});

// Error metrics
pub static PROCESS_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "airlock_process_errors_total",
            "Total processing failures by error type",
        ),
        &["error_type"],
    )
    .expect("metric creation failed")
});

pub static STATUS_CHANNEL_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "airlock_status_channel_failures_total",
            "Status channel failures by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent - subsequent calls after the first are no-ops, which allows
/// safe use from integration tests embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CHUNKS_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUNDLES_PROCESSED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUNDLES_ALREADY_PROCESSED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(IMAGES_RESOLVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(EXTRACT_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROCESS_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROCESS_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STATUS_CHANNEL_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Helper to record processing errors by type.
pub fn record_process_error(error_type: &str) {
    PROCESS_ERRORS.with_label_values(&[error_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // This would panic if any metric creation failed
        register_metrics();
    }
}
