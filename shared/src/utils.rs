//! Shared utilities
//!
use std::time::Instant;

use log::info;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::BatchResult;

pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        // Setup from the environment (RUST_LOG)
        .with_env_filter(EnvFilter::from_default_env())
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        .init();
}

/// Emits the one-line JSON summary written at the end of every invocation.
pub fn log_service_summary(service: &str, input_count: usize, result: &BatchResult, start: Instant) {
    let time_ms = i64::try_from(start.elapsed().as_millis()).ok();
    let log = json!({
        "type": "service_log",
        "service": service,
        "time": time_ms,
        "input_records_count": input_count,
        "kept_transactions_count": result.kept_count(),
        "duplicate_transactions_count": result.duplicate_count(),
        "failed_records_count": result.failed_count(),
    });
    info!("{}", serde_json::to_string(&log).unwrap_or_default());
}
