// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the fleetshard agent.
//!
//! All metrics carry the namespace prefix `acs_fleetshard_`.
//!
//! # Metrics Categories
//!
//! - **Fleet Manager Metrics** - Requests to and errors from Fleet Manager
//! - **Reconciliation Metrics** - Tenant reconciliations, failures by reason, duration
//! - **Tenant Gauges** - Total and ready tenants, reconciliations in flight
//! - **Resource Lifecycle Metrics** - Objects created, updated and deleted
//! - **Database Quota Metrics** - Cloud account quotas for managed databases
//!
//! # Example
//!
//! ```rust,no_run
//! use fleetshard_sync::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success(std::time::Duration::from_secs(1));
//! ```

use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all agent metrics
const METRICS_NAMESPACE: &str = "acs_fleetshard";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
/// On Linux the process collector (CPU, memory, file descriptors) is registered too.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let registry = Registry::new();
    #[cfg(target_os = "linux")]
    registry
        .register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))
        .unwrap();
    registry
});

// ============================================================================
// Fleet Manager Metrics
// ============================================================================

/// Total number of requests sent to Fleet Manager
///
/// Labels:
/// - `operation`: `list_centrals`, `update_statuses`, `get_central`
pub static FLEET_MANAGER_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_fleet_manager_requests_total"),
        "Total number of requests sent to Fleet Manager by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of failed requests to Fleet Manager
///
/// Labels:
/// - `operation`: see [`FLEET_MANAGER_REQUESTS_TOTAL`]
pub static FLEET_MANAGER_REQUEST_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_fleet_manager_request_errors_total"),
        "Total number of failed requests to Fleet Manager by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of tenant reconciliations started
pub static CENTRAL_RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        format!("{METRICS_NAMESPACE}_central_reconciliations_total"),
        "Total number of tenant reconciliations",
    )
    .unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of failed tenant reconciliations
///
/// Labels:
/// - `reason`: stable error label (`kubernetes`, `not_ready`, `invalid_state`, ...)
pub static CENTRAL_RECONCILIATION_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_central_reconciliation_errors_total"),
        "Total number of failed tenant reconciliations by reason",
    );
    let counter = CounterVec::new(opts, &["reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of tenant reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of tenant reconciliations in seconds",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Tenant Gauges
// ============================================================================

/// Number of tenant reconciliations currently in flight
pub static ACTIVE_CENTRAL_RECONCILIATIONS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_active_central_reconciliations"),
        "Number of tenant reconciliations currently in flight",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Number of tenants assigned to this cluster
pub static TOTAL_CENTRALS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_total_centrals"),
        "Number of tenants assigned to this cluster",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Number of tenants last reported ready
pub static READY_CENTRALS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_ready_centrals"),
        "Number of tenants last reported ready",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

/// Total number of resources created
///
/// Labels:
/// - `resource_type`: Kind of resource created
pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of resources created by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of resources updated
///
/// Labels:
/// - `resource_type`: Kind of resource updated
pub static RESOURCES_UPDATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_updated_total"),
        "Total number of resources updated by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of resources deleted
///
/// Labels:
/// - `resource_type`: Kind of resource deleted
pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of resources deleted by type",
    );
    let counter = CounterVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Database Quota Metrics
// ============================================================================

/// Maximum value of a cloud account quota
///
/// Labels:
/// - `quota`: quota name (e.g. `DBClusters`, `DBInstances`)
pub static DB_ACCOUNT_QUOTA_MAX: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_db_account_quota_max"),
        "Maximum value of a managed database account quota",
    );
    let gauge = GaugeVec::new(opts, &["quota"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Used value of a cloud account quota
///
/// Labels:
/// - `quota`: quota name
pub static DB_ACCOUNT_QUOTA_USED: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_db_account_quota_used"),
        "Used value of a managed database account quota",
    );
    let gauge = GaugeVec::new(opts, &["quota"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a request to Fleet Manager and whether it failed
pub fn record_fleet_manager_request(operation: &str, failed: bool) {
    FLEET_MANAGER_REQUESTS_TOTAL
        .with_label_values(&[operation])
        .inc();
    if failed {
        FLEET_MANAGER_REQUEST_ERRORS_TOTAL
            .with_label_values(&[operation])
            .inc();
    }
}

/// Record the start of a tenant reconciliation
pub fn record_reconciliation_started() {
    CENTRAL_RECONCILIATIONS_TOTAL.inc();
    ACTIVE_CENTRAL_RECONCILIATIONS.inc();
}

/// Record a successful reconciliation
///
/// # Arguments
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(duration: Duration) {
    ACTIVE_CENTRAL_RECONCILIATIONS.dec();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `reason` - Stable error label from `Error::metric_label`
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(reason: &str, duration: Duration) {
    ACTIVE_CENTRAL_RECONCILIATIONS.dec();
    CENTRAL_RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[reason])
        .inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Set total and ready tenant gauges
#[allow(clippy::cast_precision_loss)]
pub fn set_tenant_counts(total: usize, ready: usize) {
    TOTAL_CENTRALS.set(total as f64);
    READY_CENTRALS.set(ready as f64);
}

/// Record resource creation
pub fn record_resource_created(resource_type: &str) {
    RESOURCES_CREATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record resource update
pub fn record_resource_updated(resource_type: &str) {
    RESOURCES_UPDATED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Record resource deletion
pub fn record_resource_deleted(resource_type: &str) {
    RESOURCES_DELETED_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

/// Set one database account quota
pub fn set_db_account_quota(quota: &str, used: f64, max: f64) {
    DB_ACCOUNT_QUOTA_USED.with_label_values(&[quota]).set(used);
    DB_ACCOUNT_QUOTA_MAX.with_label_values(&[quota]).set(max);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router exposing `GET /metrics`
pub fn router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve the metrics endpoint until `shutdown` is cancelled.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails
pub async fn serve(address: SocketAddr, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %address, "Serving metrics");
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
