//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Remote locator (object store lookups, presence cache hits)
//! - Scheduler (admissions, stream stalls)
//! - Local mirror (fetches, expiries) and uploads
//! - Pull list API requests and retries

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        // Registration only fails on duplicate descriptors, which would be a
        // programming error in all_metrics().
        let _ = registry.register(metric);
    }
    registry
});

// =============================================================================
// Locator Metrics
// =============================================================================

/// Object store prefix listings by result.
pub static REMOTE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pullsync_remote_lookups_total",
            "Total object store prefix listings",
        ),
        &["result"], // "found", "not_found", "error"
    )
    .unwrap()
});

/// Presence cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pullsync_cache_lookups_total", "Total presence cache lookups"),
        &["result"], // "hit", "miss", "dangling"
    )
    .unwrap()
});

/// Retry attempts by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pullsync_retry_attempts_total", "Total backoff retries"),
        &["operation"], // "list", "download", "upload"
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Items admitted by the scheduler.
pub static ITEMS_ADMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pullsync_items_admitted_total",
        "Total pulls admitted by the scheduler",
    )
    .unwrap()
});

/// Streams stalled because a prerequisite artifact was missing.
pub static STREAMS_STALLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("pullsync_streams_stalled_total", "Total streams stalled").unwrap()
});

// =============================================================================
// Mirror Metrics
// =============================================================================

/// Files handled by the sync runner, by result.
pub static FILES_FETCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pullsync_files_total", "Files handled during sync"),
        &["result"], // "fetched", "present", "failed"
    )
    .unwrap()
});

/// Local files removed during expiry reconciliation.
pub static FILES_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pullsync_files_expired_total",
        "Total local files expired",
    )
    .unwrap()
});

/// Upload attempts by result.
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pullsync_uploads_total", "Total upload attempts"),
        &["result"], // "uploaded", "already_present", "failed"
    )
    .unwrap()
});

// =============================================================================
// Pull list API Metrics
// =============================================================================

/// Pull list API requests by endpoint and result.
pub static PULL_API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pullsync_pull_api_requests_total", "Pull list API requests"),
        &["endpoint", "result"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REMOTE_LOOKUPS.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(ITEMS_ADMITTED.clone()),
        Box::new(STREAMS_STALLED.clone()),
        Box::new(FILES_FETCHED.clone()),
        Box::new(FILES_EXPIRED.clone()),
        Box::new(UPLOADS_TOTAL.clone()),
        Box::new(PULL_API_REQUESTS.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
